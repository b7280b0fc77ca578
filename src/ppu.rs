use crate::mmu::{INT_STAT, INT_VBLANK, Memory};

pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 144;

const CYCLES_PER_SCANLINE: i32 = 456;
const MODE_2_BOUND: i32 = 376;
const MODE_3_BOUND: i32 = 204;
const VBLANK_LINE: u8 = 144;
const LAST_LINE: u8 = 153;

/// Classic green-tinted DMG shades, darkest last.
pub const DMG_PALETTE_GREEN: [u32; 4] = [0x009BBC0F, 0x008BAC0F, 0x00306230, 0x000F380F];
/// Plain greyscale.
pub const DMG_PALETTE_GREY: [u32; 4] = [0x00FFFFFF, 0x00AAAAAA, 0x00555555, 0x00000000];
/// Game Boy Pocket-style tint.
pub const DMG_PALETTE_POCKET: [u32; 4] = [0x00E0F8D0, 0x0088C070, 0x00346856, 0x00081820];

/// 5-bit channel to 8-bit DAC output. The CGB LCD is not linear, so a
/// lookup table matches hardware much closer than shifting would.
#[rustfmt::skip]
const CGB_DAC: [u8; 32] = [
    0x00, 0x08, 0x10, 0x18, 0x20, 0x29, 0x31, 0x39,
    0x41, 0x4A, 0x52, 0x5A, 0x62, 0x6A, 0x73, 0x7B,
    0x83, 0x8B, 0x94, 0x9C, 0xA4, 0xAC, 0xB4, 0xBD,
    0xC5, 0xCD, 0xD5, 0xDE, 0xE6, 0xEE, 0xF6, 0xFF,
];

/// Expand a packed 15-bit CGB color to 0x00RRGGBB.
pub fn decode_cgb_color(raw: u16) -> u32 {
    let r = CGB_DAC[(raw & 0x1F) as usize] as u32;
    let g = CGB_DAC[((raw >> 5) & 0x1F) as usize] as u32;
    let b = CGB_DAC[((raw >> 10) & 0x1F) as usize] as u32;
    (r << 16) | (g << 8) | b
}

/// Scanline-based pixel processing unit.
///
/// A counter runs down from 456 cycles per scanline; the LCD mode is derived
/// from it (OAM scan, transfer, H-Blank) and the whole line is composited in
/// one pass when mode 3 begins. Output goes to a back buffer that swaps to
/// the front at the V-Blank wrap.
pub struct Ppu {
    scanline_counter: i32,
    tile_scanline: [u8; SCREEN_WIDTH],
    bg_priority: [bool; SCREEN_WIDTH],
    back: [u32; SCREEN_WIDTH * SCREEN_HEIGHT],
    front: [u32; SCREEN_WIDTH * SCREEN_HEIGHT],
    /// Set when a finished frame was swapped to the front buffer; the
    /// driver clears it.
    pub frame_ready: bool,
    /// Debug toggles for the two compositing passes.
    pub draw_tiles: bool,
    pub draw_sprites: bool,
    /// Active DMG shade palette (ignored in CGB mode).
    pub dmg_colors: [u32; 4],
}

impl Ppu {
    pub fn new() -> Self {
        Self {
            scanline_counter: CYCLES_PER_SCANLINE,
            tile_scanline: [0; SCREEN_WIDTH],
            bg_priority: [false; SCREEN_WIDTH],
            back: [0; SCREEN_WIDTH * SCREEN_HEIGHT],
            front: [0; SCREEN_WIDTH * SCREEN_HEIGHT],
            frame_ready: false,
            draw_tiles: true,
            draw_sprites: true,
            dmg_colors: DMG_PALETTE_GREEN,
        }
    }

    /// The completed frame, one 0x00RRGGBB pixel per cell, row-major.
    pub fn front(&self) -> &[u32] {
        &self.front
    }

    /// Advance the PPU by the cycles the CPU just spent.
    pub fn update(&mut self, cycles: u32, mem: &mut Memory) {
        self.update_lcd_status(mem);

        if mem.io_reg(0xFF40) & 0x80 == 0 {
            return;
        }

        let speed = if mem.double_speed() { 2 } else { 1 };
        self.scanline_counter -= cycles as i32;
        if self.scanline_counter <= 0 {
            self.scanline_counter = CYCLES_PER_SCANLINE * speed;
            let line = mem.io_reg(0xFF44).wrapping_add(1);
            if line > LAST_LINE {
                mem.set_io_reg(0xFF44, 0);
                self.swap_buffers();
            } else {
                mem.set_io_reg(0xFF44, line);
                if line == VBLANK_LINE {
                    mem.request_interrupt(INT_VBLANK);
                }
            }
        }
    }

    fn swap_buffers(&mut self) {
        std::mem::swap(&mut self.back, &mut self.front);
        self.frame_ready = true;
        #[cfg(feature = "ppu-trace")]
        eprintln!("[PPU] frame complete");
    }

    /// Derive the LCD mode from the counter and line, firing STAT/LYC
    /// interrupts on transitions and drawing at the start of mode 3.
    fn update_lcd_status(&mut self, mem: &mut Memory) {
        let mut stat = mem.io_reg(0xFF41);
        if mem.io_reg(0xFF40) & 0x80 == 0 {
            // LCD off: counter parked, LY pinned to 0, mode bits cleared.
            let speed = if mem.double_speed() { 2 } else { 1 };
            self.scanline_counter = CYCLES_PER_SCANLINE * speed;
            mem.set_io_reg(0xFF44, 0);
            mem.set_io_reg(0xFF41, stat & 0xFC);
            return;
        }

        let speed = if mem.double_speed() { 2 } else { 1 };
        let line = mem.io_reg(0xFF44);
        let current_mode = stat & 0x03;

        let mode;
        let mut irq = false;
        if line >= VBLANK_LINE {
            mode = 1;
            irq = stat & 0x10 != 0;
        } else if self.scanline_counter >= MODE_2_BOUND * speed {
            mode = 2;
            irq = stat & 0x20 != 0;
        } else if self.scanline_counter >= MODE_3_BOUND * speed {
            mode = 3;
            if current_mode != 3 {
                self.draw_scanline(mem);
            }
        } else {
            mode = 0;
            irq = stat & 0x08 != 0;
            if current_mode != 0 {
                mem.hdma_hblank_transfer();
            }
        }

        if irq && mode != current_mode {
            mem.request_interrupt(INT_STAT);
        }
        #[cfg(feature = "ppu-trace")]
        if mode != current_mode {
            eprintln!("[PPU] line={line} mode {current_mode}->{mode}");
        }

        // LYC coincidence is tracked on every update, whatever the mode.
        if line == mem.io_reg(0xFF45) {
            let newly = stat & 0x04 == 0;
            stat |= 0x04;
            if newly && stat & 0x40 != 0 {
                mem.request_interrupt(INT_STAT);
            }
        } else {
            stat &= !0x04;
        }

        mem.set_io_reg(0xFF41, (stat & 0xFC) | mode);
    }

    fn draw_scanline(&mut self, mem: &mut Memory) {
        let lcdc = mem.io_reg(0xFF40);
        self.tile_scanline = [0; SCREEN_WIDTH];
        self.bg_priority = [false; SCREEN_WIDTH];

        // On CGB, LCDC bit 0 switches priority rules instead of blanking
        // the background.
        if self.draw_tiles && (mem.cgb_mode() || lcdc & 0x01 != 0) {
            self.render_tiles(mem);
        }
        if self.draw_sprites && lcdc & 0x02 != 0 {
            self.render_sprites(mem);
        }
    }

    fn render_tiles(&mut self, mem: &mut Memory) {
        let cgb = mem.cgb_mode();
        let lcdc = mem.io_reg(0xFF40);
        let line = mem.io_reg(0xFF44);
        let scy = mem.io_reg(0xFF42);
        let scx = mem.io_reg(0xFF43);
        let wy = mem.io_reg(0xFF4A);
        let wx = mem.io_reg(0xFF4B).wrapping_sub(7);
        let bgp = mem.io_reg(0xFF47);

        let window = lcdc & 0x20 != 0 && wy <= line;
        // LCDC bit 4 clear selects the signed-index tile data block.
        let signed_tiles = lcdc & 0x10 == 0;

        for x in 0..SCREEN_WIDTH as u8 {
            let in_window = window && x >= wx;
            let (map_base, x_pos, y_pos) = if in_window {
                let base: u16 = if lcdc & 0x40 != 0 { 0x1C00 } else { 0x1800 };
                (base, x.wrapping_sub(wx), line.wrapping_sub(wy))
            } else {
                let base: u16 = if lcdc & 0x08 != 0 { 0x1C00 } else { 0x1800 };
                (base, x.wrapping_add(scx), line.wrapping_add(scy))
            };

            let map_index =
                map_base + (y_pos as u16 / 8) * 32 + (x_pos as u16 / 8);
            let tile_num = mem.vram[0][map_index as usize];
            let attrs = if cgb { mem.vram[1][map_index as usize] } else { 0 };

            let tile_addr = if signed_tiles {
                (0x0800 + ((tile_num as i8 as i16 + 128) as u16) * 16) as usize
            } else {
                tile_num as usize * 16
            };

            let mut tile_line = (y_pos % 8) as usize;
            if attrs & 0x40 != 0 {
                tile_line = 7 - tile_line;
            }
            let bank = if attrs & 0x08 != 0 { 1 } else { 0 };
            let data1 = mem.vram[bank][tile_addr + tile_line * 2];
            let data2 = mem.vram[bank][tile_addr + tile_line * 2 + 1];

            let bit = if attrs & 0x20 != 0 {
                x_pos % 8
            } else {
                7 - x_pos % 8
            };
            let color_idx = (((data2 >> bit) & 1) << 1) | ((data1 >> bit) & 1);

            self.tile_scanline[x as usize] = color_idx;
            if cgb && attrs & 0x80 != 0 {
                self.bg_priority[x as usize] = true;
            }

            let color = if cgb {
                let pal = (attrs & 0x07) as usize;
                let lo = mem.bg_palette.data[pal * 8 + color_idx as usize * 2];
                let hi = mem.bg_palette.data[pal * 8 + color_idx as usize * 2 + 1];
                decode_cgb_color(((hi as u16) << 8) | lo as u16)
            } else {
                let shade = (bgp >> (color_idx * 2)) & 0x03;
                self.dmg_colors[shade as usize]
            };
            self.back[line as usize * SCREEN_WIDTH + x as usize] = color;
        }
    }

    fn render_sprites(&mut self, mem: &mut Memory) {
        let cgb = mem.cgb_mode();
        let lcdc = mem.io_reg(0xFF40);
        let line = mem.io_reg(0xFF44) as i32;
        let height: i32 = if lcdc & 0x04 != 0 { 16 } else { 8 };
        // BG master priority only applies when LCDC bit 0 is set on CGB.
        let bg_wins = !cgb || lcdc & 0x01 != 0;

        // Occupancy per column: x position + 100 of the sprite that claimed
        // it. Lower values win; 0 means unclaimed.
        let mut claimed = [0i32; SCREEN_WIDTH];
        let mut on_line = 0;

        for sprite in 0..40 {
            let base = sprite * 4;
            let y = mem.oam[base] as i32 - 16;
            let x = mem.oam[base + 1] as i32 - 8;
            let mut tile = mem.oam[base + 2];
            let attrs = mem.oam[base + 3];

            if line < y || line >= y + height {
                continue;
            }
            // Hardware only shows the first ten sprites per scanline.
            on_line += 1;
            if on_line > 10 {
                break;
            }

            if height == 16 {
                tile &= 0xFE;
            }
            let mut tile_line = line - y;
            if attrs & 0x40 != 0 {
                tile_line = height - 1 - tile_line;
            }

            let bank = if cgb && attrs & 0x08 != 0 { 1 } else { 0 };
            let addr = tile as usize * 16 + tile_line as usize * 2;
            let data1 = mem.vram[bank][addr];
            let data2 = mem.vram[bank][addr + 1];

            for col in 0..8 {
                let px = x + col;
                if !(0..SCREEN_WIDTH as i32).contains(&px) {
                    continue;
                }
                let bit = if attrs & 0x20 != 0 { col } else { 7 - col };
                let color_idx = (((data2 >> bit) & 1) << 1) | ((data1 >> bit) & 1);
                if color_idx == 0 {
                    continue;
                }

                // Sprite-vs-sprite priority: OAM order on CGB, lowest x
                // (ties by OAM order) on DMG.
                if claimed[px as usize] != 0
                    && (cgb || claimed[px as usize] <= x + 100)
                {
                    continue;
                }
                // Behind-background flag, and CGB per-tile BG priority.
                let bg_pixel = self.tile_scanline[px as usize];
                if bg_wins && bg_pixel != 0 {
                    if attrs & 0x80 != 0 || self.bg_priority[px as usize] {
                        continue;
                    }
                }

                let color = if cgb {
                    let pal = (attrs & 0x07) as usize;
                    let lo = mem.obj_palette.data[pal * 8 + color_idx as usize * 2];
                    let hi = mem.obj_palette.data[pal * 8 + color_idx as usize * 2 + 1];
                    decode_cgb_color(((hi as u16) << 8) | lo as u16)
                } else {
                    let obp = if attrs & 0x10 != 0 {
                        mem.io_reg(0xFF49)
                    } else {
                        mem.io_reg(0xFF48)
                    };
                    let shade = (obp >> (color_idx * 2)) & 0x03;
                    self.dmg_colors[shade as usize]
                };
                self.back[line as usize * SCREEN_WIDTH + px as usize] = color;
                claimed[px as usize] = x + 100;
            }
        }
    }
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Ppu, Memory) {
        let mut mem = Memory::new();
        mem.set_io_reg(0xFF40, 0x93);
        mem.set_io_reg(0xFF41, 0x02);
        mem.set_io_reg(0xFF44, 0);
        mem.if_reg = 0;
        (Ppu::new(), mem)
    }

    // Step in 4-cycle increments so every mode transition is observed.
    fn run_line(ppu: &mut Ppu, mem: &mut Memory) {
        for _ in 0..114 {
            ppu.update(4, mem);
        }
    }

    #[test]
    fn mode_sequence_within_one_scanline() {
        let (mut ppu, mut mem) = setup();

        // OAM scan while the counter is in [376, 456).
        ppu.update(80, &mut mem);
        assert_eq!(mem.io_reg(0xFF41) & 0x03, 2);
        ppu.update(4, &mut mem); // counter 376, still mode 2
        assert_eq!(mem.io_reg(0xFF41) & 0x03, 2);

        // Pixel transfer in [204, 376).
        ppu.update(172, &mut mem);
        assert_eq!(mem.io_reg(0xFF41) & 0x03, 3);

        // H-Blank below 204.
        ppu.update(4, &mut mem);
        assert_eq!(mem.io_reg(0xFF41) & 0x03, 0);
    }

    #[test]
    fn line_advances_when_counter_expires() {
        let (mut ppu, mut mem) = setup();
        run_line(&mut ppu, &mut mem);
        assert_eq!(mem.io_reg(0xFF44), 1);
    }

    #[test]
    fn vblank_interrupt_fires_at_line_144() {
        let (mut ppu, mut mem) = setup();
        for _ in 0..143 {
            run_line(&mut ppu, &mut mem);
        }
        assert_eq!(mem.if_reg & (1 << INT_VBLANK), 0);
        run_line(&mut ppu, &mut mem);
        assert_eq!(mem.io_reg(0xFF44), 144);
        assert_ne!(mem.if_reg & (1 << INT_VBLANK), 0);
    }

    #[test]
    fn frame_wraps_after_line_153_and_swaps() {
        let (mut ppu, mut mem) = setup();
        for _ in 0..154 {
            run_line(&mut ppu, &mut mem);
        }
        assert_eq!(mem.io_reg(0xFF44), 0);
        assert!(ppu.frame_ready);
    }

    #[test]
    fn lyc_coincidence_sets_flag_and_interrupts_once() {
        let (mut ppu, mut mem) = setup();
        mem.set_io_reg(0xFF45, 1);
        mem.set_io_reg(0xFF41, 0x42); // LYC interrupt enable
        run_line(&mut ppu, &mut mem); // LY -> 1
        mem.if_reg = 0;
        ppu.update(4, &mut mem);
        assert_ne!(mem.io_reg(0xFF41) & 0x04, 0);
        assert_ne!(mem.if_reg & (1 << INT_STAT), 0);

        // Staying on the same line does not re-fire.
        mem.if_reg = 0;
        ppu.update(4, &mut mem);
        assert_eq!(mem.if_reg & (1 << INT_STAT), 0);
    }

    #[test]
    fn lcd_off_freezes_line_and_mode() {
        let (mut ppu, mut mem) = setup();
        run_line(&mut ppu, &mut mem);
        mem.set_io_reg(0xFF40, 0x11);
        ppu.update(4560, &mut mem);
        assert_eq!(mem.io_reg(0xFF44), 0);
        assert_eq!(mem.io_reg(0xFF41) & 0x03, 0);
    }

    #[test]
    fn hblank_mode_interrupt_fires_on_transition() {
        let (mut ppu, mut mem) = setup();
        mem.set_io_reg(0xFF41, 0x0A); // mode-0 interrupt enabled, mode 2
        ppu.update(84, &mut mem);
        ppu.update(172, &mut mem); // into mode 3
        mem.if_reg = 0;
        ppu.update(4, &mut mem); // crosses into H-Blank
        assert_eq!(mem.io_reg(0xFF41) & 0x03, 0);
        assert_ne!(mem.if_reg & (1 << INT_STAT), 0);
    }

    #[test]
    fn solid_background_tile_reaches_framebuffer() {
        let (mut ppu, mut mem) = setup();
        // Tile 0: all pixels color index 3.
        for i in 0..16 {
            mem.write(0x8000 + i, 0xFF);
        }
        mem.set_io_reg(0xFF47, 0xE4);
        for _ in 0..154 {
            run_line(&mut ppu, &mut mem);
        }
        assert_eq!(ppu.front()[0], ppu.dmg_colors[3]);
        assert_eq!(
            ppu.front()[(SCREEN_HEIGHT - 1) * SCREEN_WIDTH + SCREEN_WIDTH - 1],
            ppu.dmg_colors[3]
        );
    }

    #[test]
    fn sprite_draws_over_background_zero() {
        let (mut ppu, mut mem) = setup();
        // Background stays color 0; sprite tile 1 is solid color 3.
        for i in 0..16 {
            mem.write(0x8010 + i, 0xFF);
        }
        mem.set_io_reg(0xFF47, 0xE4);
        mem.set_io_reg(0xFF48, 0xE4);
        // Sprite at top-left corner.
        mem.oam[0] = 16;
        mem.oam[1] = 8;
        mem.oam[2] = 1;
        mem.oam[3] = 0;
        for _ in 0..154 {
            run_line(&mut ppu, &mut mem);
        }
        assert_eq!(ppu.front()[0], ppu.dmg_colors[3]);
        // Outside the sprite the background shows shade 0.
        assert_eq!(ppu.front()[10], ppu.dmg_colors[0]);
    }

    #[test]
    fn behind_background_sprite_hides_under_nonzero_bg() {
        let (mut ppu, mut mem) = setup();
        for i in 0..16 {
            mem.write(0x8000 + i, 0xFF); // BG color 3 everywhere
            mem.write(0x8010 + i, 0xFF);
        }
        mem.set_io_reg(0xFF47, 0xE4);
        mem.set_io_reg(0xFF48, 0x1B);
        mem.oam[0] = 16;
        mem.oam[1] = 8;
        mem.oam[2] = 1;
        mem.oam[3] = 0x80; // behind background
        for _ in 0..154 {
            run_line(&mut ppu, &mut mem);
        }
        assert_eq!(ppu.front()[0], ppu.dmg_colors[3]);
    }

    #[test]
    fn lower_x_sprite_wins_overlap() {
        let (mut ppu, mut mem) = setup();
        for i in 0..16 {
            mem.write(0x8010 + i, 0xFF); // tile 1: color 3
        }
        for i in 0..8u16 {
            mem.write(0x8020 + i * 2, 0xFF); // tile 2: color 1
            mem.write(0x8021 + i * 2, 0x00);
        }
        mem.set_io_reg(0xFF48, 0xE4);
        // Sprite 0 at x=12 (tile 1), sprite 1 at x=8 (tile 2); they overlap
        // in columns 12..16 where the lower x must win.
        mem.oam[0] = 16;
        mem.oam[1] = 20;
        mem.oam[2] = 1;
        mem.oam[3] = 0;
        mem.oam[4] = 16;
        mem.oam[5] = 16;
        mem.oam[6] = 2;
        mem.oam[7] = 0;
        for _ in 0..154 {
            run_line(&mut ppu, &mut mem);
        }
        assert_eq!(ppu.front()[12], ppu.dmg_colors[1]);
        assert_eq!(ppu.front()[17], ppu.dmg_colors[3]);
    }

    #[test]
    fn dac_expansion_matches_endpoints() {
        assert_eq!(decode_cgb_color(0x7FFF), 0x00FFFFFF);
        assert_eq!(decode_cgb_color(0x0000), 0x00000000);
        // Red only.
        assert_eq!(decode_cgb_color(0x001F), 0x00FF0000);
    }
}
