use log::warn;

use crate::{
    apu::{Apu, NullApu},
    cartridge::Cartridge,
    input::Joypad,
};

pub const INT_VBLANK: u8 = 0;
pub const INT_STAT: u8 = 1;
pub const INT_TIMER: u8 = 2;
pub const INT_SERIAL: u8 = 3;
pub const INT_JOYPAD: u8 = 4;

/// CGB color palette RAM: 64 bytes addressed through an index register with
/// optional auto-increment on data writes.
#[derive(Debug)]
pub struct PaletteRam {
    pub data: [u8; 0x40],
    index: u8,
    auto_increment: bool,
}

impl PaletteRam {
    fn new() -> Self {
        Self {
            data: [0xFF; 0x40],
            index: 0,
            auto_increment: false,
        }
    }

    fn read_index(&self) -> u8 {
        let auto = if self.auto_increment { 0x80 } else { 0 };
        0x40 | auto | self.index
    }

    fn write_index(&mut self, val: u8) {
        self.index = val & 0x3F;
        self.auto_increment = val & 0x80 != 0;
    }

    fn read_data(&self) -> u8 {
        self.data[self.index as usize]
    }

    fn write_data(&mut self, val: u8) {
        self.data[self.index as usize] = val;
        if self.auto_increment {
            self.index = (self.index + 1) & 0x3F;
        }
    }
}

#[derive(Debug)]
struct HdmaState {
    src: u16,
    dst: u16,
    blocks: u8,
    hblank: bool,
    active: bool,
}

/// The full 0x0000-0xFFFF address space: cartridge, video and work RAM
/// banks, OAM, the I/O register file and high RAM, plus the DMA engines
/// that move data between them.
pub struct Memory {
    pub cart: Option<Cartridge>,
    pub boot_rom: Option<Vec<u8>>,
    boot_mapped: bool,
    pub vram: [[u8; 0x2000]; 2],
    pub vram_bank: usize,
    wram: [[u8; 0x1000]; 8],
    wram_bank: usize,
    pub oam: [u8; 0xA0],
    high: [u8; 0x80],
    hram: [u8; 0x7F],
    pub if_reg: u8,
    pub ie_reg: u8,
    pub joypad: Joypad,
    pub apu: Box<dyn Apu>,
    /// CPU cycle count, forwarded to the APU as its register timeline index.
    pub cpu_time: u64,
    pub bg_palette: PaletteRam,
    pub obj_palette: PaletteRam,
    cgb_mode: bool,
    key1: u8,
    hdma: HdmaState,
    // DIV/TAC writes must reset counters owned by the CPU; the flags carry
    // the event to the next timer update.
    pub(crate) div_written: bool,
    pub(crate) tac_written: bool,
}

impl Memory {
    pub fn new() -> Self {
        Self::new_with_mode(false)
    }

    pub fn new_with_mode(cgb: bool) -> Self {
        let mut mem = Self {
            cart: None,
            boot_rom: None,
            boot_mapped: false,
            vram: [[0; 0x2000]; 2],
            vram_bank: 0,
            wram: [[0; 0x1000]; 8],
            wram_bank: 1,
            oam: [0; 0xA0],
            high: [0; 0x80],
            hram: [0; 0x7F],
            if_reg: 0xE1,
            ie_reg: 0,
            joypad: Joypad::new(),
            apu: Box::new(NullApu::new()),
            cpu_time: 0,
            bg_palette: PaletteRam::new(),
            obj_palette: PaletteRam::new(),
            cgb_mode: cgb,
            key1: 0,
            hdma: HdmaState {
                src: 0,
                dst: 0x8000,
                blocks: 0,
                hblank: false,
                active: false,
            },
            div_written: false,
            tac_written: false,
        };
        mem.post_boot_defaults();
        mem
    }

    /// I/O register values after the boot ROM has run.
    fn post_boot_defaults(&mut self) {
        for (addr, val) in [
            (0xFF10u16, 0x80u8),
            (0xFF11, 0xBF),
            (0xFF12, 0xF3),
            (0xFF14, 0xBF),
            (0xFF16, 0x3F),
            (0xFF19, 0xBF),
            (0xFF1A, 0x7F),
            (0xFF1B, 0xFF),
            (0xFF1C, 0x9F),
            (0xFF1E, 0xBF),
            (0xFF20, 0xFF),
            (0xFF23, 0xBF),
            (0xFF24, 0x77),
            (0xFF25, 0xF3),
            (0xFF26, 0xF1),
        ] {
            self.apu.write_register(0, addr, val);
        }
        self.high[0x40] = 0x91; // LCDC
        self.high[0x41] = 0x85; // STAT
        self.high[0x47] = 0xFC; // BGP
        self.high[0x48] = 0xFF;
        self.high[0x49] = 0xFF;
    }

    pub fn load_cart(&mut self, cart: Cartridge) {
        self.cart = Some(cart);
    }

    /// Map a boot ROM image at the bottom of the address space. It stays
    /// visible until the program writes to 0xFF50.
    pub fn load_boot_rom(&mut self, data: Vec<u8>) {
        self.boot_rom = Some(data);
        self.boot_mapped = true;
    }

    pub fn boot_mapped(&self) -> bool {
        self.boot_mapped
    }

    pub fn cgb_mode(&self) -> bool {
        self.cgb_mode
    }

    pub fn double_speed(&self) -> bool {
        self.key1 & 0x80 != 0
    }

    /// Flip the speed after STOP if a switch was requested via KEY1.
    /// Returns true if the speed changed.
    pub(crate) fn perform_speed_switch(&mut self) -> bool {
        if self.cgb_mode && self.key1 & 0x01 != 0 {
            self.key1 = (self.key1 ^ 0x80) & 0x80;
            true
        } else {
            false
        }
    }

    pub fn request_interrupt(&mut self, bit: u8) {
        self.if_reg |= 1 << bit;
    }

    /// Direct access to an I/O register's backing byte, bypassing bus side
    /// effects. Used by the CPU timer and the PPU for registers they own.
    pub(crate) fn io_reg(&self, addr: u16) -> u8 {
        self.high[(addr - 0xFF00) as usize]
    }

    pub(crate) fn set_io_reg(&mut self, addr: u16, val: u8) {
        self.high[(addr - 0xFF00) as usize] = val;
    }

    pub fn read(&mut self, addr: u16) -> u8 {
        match addr {
            // The boot overlay covers 0x0000-0x00FF; the CGB boot ROM also
            // maps 0x0200-0x08FF, leaving the cartridge header visible.
            0x0000..=0x00FF if self.boot_mapped => self
                .boot_rom
                .as_ref()
                .and_then(|b| b.get(addr as usize).copied())
                .unwrap_or(0xFF),
            0x0200..=0x08FF if self.boot_mapped && self.cgb_mode => self
                .boot_rom
                .as_ref()
                .and_then(|b| b.get(addr as usize).copied())
                .unwrap_or(0xFF),
            0x0000..=0x7FFF | 0xA000..=0xBFFF => {
                self.cart.as_ref().map(|c| c.read(addr)).unwrap_or(0xFF)
            }
            0x8000..=0x9FFF => self.vram[self.vram_bank][(addr - 0x8000) as usize],
            0xC000..=0xCFFF => self.wram[0][(addr - 0xC000) as usize],
            0xD000..=0xDFFF => self.wram[self.wram_bank][(addr - 0xD000) as usize],
            // Echo RAM mirrors work RAM.
            0xE000..=0xEFFF => self.wram[0][(addr - 0xE000) as usize],
            0xF000..=0xFDFF => self.wram[self.wram_bank][(addr - 0xF000) as usize],
            0xFE00..=0xFE9F => self.oam[(addr - 0xFE00) as usize],
            0xFEA0..=0xFEFF => 0xFF,
            0xFF00 => self.joypad.read(),
            0xFF0F => self.if_reg | 0xE0,
            0xFF41 => self.high[0x41] | 0x80,
            0xFF4D => {
                if self.cgb_mode {
                    (self.key1 & 0x81) | 0x7E
                } else {
                    0xFF
                }
            }
            0xFF4F => {
                if self.cgb_mode {
                    0xFE | self.vram_bank as u8
                } else {
                    0xFF
                }
            }
            0xFF51 => self.cgb_only(|m| (m.hdma.src >> 8) as u8),
            0xFF52 => self.cgb_only(|m| (m.hdma.src & 0x00F0) as u8),
            0xFF53 => self.cgb_only(|m| (m.hdma.dst >> 8) as u8 & 0x1F),
            0xFF54 => self.cgb_only(|m| (m.hdma.dst & 0x00F0) as u8),
            0xFF55 => self.cgb_only(|m| {
                if m.hdma.active {
                    (m.hdma.blocks - 1) & 0x7F
                } else if m.hdma.blocks > 0 {
                    // Aborted transfer: bit 7 set plus the remaining count.
                    0x80 | ((m.hdma.blocks - 1) & 0x7F)
                } else {
                    0xFF
                }
            }),
            0xFF68 => self.cgb_only(|m| m.bg_palette.read_index()),
            0xFF69 => self.cgb_only(|m| m.bg_palette.read_data()),
            0xFF6A => self.cgb_only(|m| m.obj_palette.read_index()),
            0xFF6B => self.cgb_only(|m| m.obj_palette.read_data()),
            0xFF70 => {
                if self.cgb_mode {
                    0xF8 | self.wram_bank as u8
                } else {
                    0xFF
                }
            }
            0xFF10..=0xFF3F => self.apu.read_register(self.cpu_time, addr),
            0xFF00..=0xFF7F => self.high[(addr - 0xFF00) as usize],
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize],
            0xFFFF => self.ie_reg,
        }
    }

    /// Read a 16-bit little-endian word.
    pub fn read_word(&mut self, addr: u16) -> u16 {
        let lo = self.read(addr) as u16;
        let hi = self.read(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            // Writes under the boot overlay are discarded while it is mapped.
            0x0000..=0x00FF if self.boot_mapped => {}
            0x0000..=0x7FFF => {
                if let Some(cart) = self.cart.as_mut() {
                    cart.write(addr, val);
                }
            }
            0x8000..=0x9FFF => self.vram[self.vram_bank][(addr - 0x8000) as usize] = val,
            0xA000..=0xBFFF => {
                if let Some(cart) = self.cart.as_mut() {
                    cart.write_ram(addr, val);
                }
            }
            0xC000..=0xCFFF => self.wram[0][(addr - 0xC000) as usize] = val,
            0xD000..=0xDFFF => self.wram[self.wram_bank][(addr - 0xD000) as usize] = val,
            0xE000..=0xEFFF => self.wram[0][(addr - 0xE000) as usize] = val,
            0xF000..=0xFDFF => self.wram[self.wram_bank][(addr - 0xF000) as usize] = val,
            0xFE00..=0xFE9F => self.oam[(addr - 0xFE00) as usize] = val,
            0xFEA0..=0xFEFF => {}
            0xFF00 => self.joypad.write(val),
            0xFF04 => {
                // Any write clears DIV and resets the CPU's divider counter.
                self.high[0x04] = 0;
                self.div_written = true;
            }
            0xFF07 => {
                if self.high[0x07] & 0x03 != val & 0x03 {
                    self.tac_written = true;
                }
                self.high[0x07] = val & 0x07;
            }
            0xFF0F => self.if_reg = val & 0x1F,
            0xFF10..=0xFF3F => self.apu.write_register(self.cpu_time, addr, val),
            0xFF41 => {
                // Mode and coincidence bits are read-only.
                self.high[0x41] = (val & 0x78) | (self.high[0x41] & 0x07);
            }
            0xFF44 => self.high[0x44] = 0,
            0xFF46 => self.oam_dma(val),
            0xFF4D => {
                if self.cgb_mode {
                    self.key1 = (self.key1 & 0x80) | (val & 0x01);
                }
            }
            0xFF4F => {
                if self.cgb_mode {
                    self.vram_bank = (val & 0x01) as usize;
                }
            }
            0xFF50 => self.boot_mapped = false,
            0xFF51 => {
                if self.cgb_mode && !self.hdma.active {
                    self.hdma.src = ((val as u16) << 8) | (self.hdma.src & 0x00FF);
                }
            }
            0xFF52 => {
                if self.cgb_mode && !self.hdma.active {
                    self.hdma.src = (self.hdma.src & 0xFF00) | (val & 0xF0) as u16;
                }
            }
            0xFF53 => {
                if self.cgb_mode && !self.hdma.active {
                    let raw = (((val & 0x1F) as u16) << 8) | (self.hdma.dst & 0x00F0);
                    self.hdma.dst = sanitize_vram_dma_dest(raw);
                }
            }
            0xFF54 => {
                if self.cgb_mode && !self.hdma.active {
                    let raw = (self.hdma.dst & 0x1F00) | (val as u16 & 0x00F0);
                    self.hdma.dst = sanitize_vram_dma_dest(raw);
                }
            }
            0xFF55 => self.start_vram_dma(val),
            0xFF68 => {
                if self.cgb_mode {
                    self.bg_palette.write_index(val);
                }
            }
            0xFF69 => {
                if self.cgb_mode {
                    self.bg_palette.write_data(val);
                }
            }
            0xFF6A => {
                if self.cgb_mode {
                    self.obj_palette.write_index(val);
                }
            }
            0xFF6B => {
                if self.cgb_mode {
                    self.obj_palette.write_data(val);
                }
            }
            0xFF70 => {
                if self.cgb_mode {
                    let bank = (val & 0x07) as usize;
                    self.wram_bank = if bank == 0 { 1 } else { bank };
                }
            }
            0xFF01..=0xFF03 | 0xFF05 | 0xFF06 | 0xFF40 | 0xFF42 | 0xFF43 | 0xFF45
            | 0xFF47..=0xFF4B => {
                self.high[(addr - 0xFF00) as usize] = val;
            }
            0xFF00..=0xFF7F => {
                warn!("write to unmodeled I/O register {addr:04X} = {val:02X}");
            }
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize] = val,
            0xFFFF => self.ie_reg = val,
        }
    }

    /// Write a 16-bit little-endian word.
    pub fn write_word(&mut self, addr: u16, val: u16) {
        self.write(addr, (val & 0xFF) as u8);
        self.write(addr.wrapping_add(1), (val >> 8) as u8);
    }

    fn cgb_only(&self, f: impl Fn(&Self) -> u8) -> u8 {
        if self.cgb_mode { f(self) } else { 0xFF }
    }

    /// OAM DMA: copy 0xA0 bytes from `source << 8` into OAM. The real
    /// transfer takes about 160 M-cycles with the bus blocked; this core
    /// performs it instantly, which the games that busy-wait in HRAM never
    /// notice.
    fn oam_dma(&mut self, source: u8) {
        self.high[0x46] = source;
        let base = (source as u16) << 8;
        for i in 0..0xA0 {
            let byte = self.read(base.wrapping_add(i));
            self.oam[i as usize] = byte;
        }
    }

    /// 0xFF55 write: start (or abort) a VRAM DMA transfer.
    fn start_vram_dma(&mut self, val: u8) {
        if !self.cgb_mode {
            return;
        }
        if self.hdma.active && val & 0x80 == 0 {
            // Aborting keeps the remaining block count visible in FF55.
            self.hdma.active = false;
            return;
        }
        let blocks = (val & 0x7F) + 1;
        if val & 0x80 == 0 {
            // General-purpose DMA: move everything now.
            self.hdma.blocks = blocks;
            self.hdma.hblank = false;
            self.hdma.active = true;
            while self.hdma.active {
                self.vram_dma_block();
            }
        } else {
            self.hdma.blocks = blocks;
            self.hdma.hblank = true;
            self.hdma.active = true;
            // With the LCD off there are no H-Blanks; service a block now so
            // the transfer still makes progress.
            let lcd_on = self.high[0x40] & 0x80 != 0;
            let mode = self.high[0x41] & 0x03;
            if !lcd_on || mode == 0 {
                self.vram_dma_block();
            }
        }
    }

    /// Deliver one H-Blank slot to an active HDMA transfer. The PPU calls
    /// this when it enters mode 0.
    pub fn hdma_hblank_transfer(&mut self) {
        if self.hdma.active && self.hdma.hblank {
            self.vram_dma_block();
        }
    }

    fn vram_dma_block(&mut self) {
        let mut src = self.hdma.src;
        let mut dst = sanitize_vram_dma_dest(self.hdma.dst);
        for _ in 0..0x10 {
            let byte = self.read(src);
            self.vram[self.vram_bank][(dst - 0x8000) as usize] = byte;
            src = src.wrapping_add(1);
            dst = 0x8000 | ((dst.wrapping_add(1)) & 0x1FFF);
        }
        self.hdma.src = src;
        self.hdma.dst = sanitize_vram_dma_dest(dst);
        self.hdma.blocks -= 1;
        if self.hdma.blocks == 0 {
            self.hdma.active = false;
        }
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

// VRAM DMA destinations are always inside VRAM, aligned to 0x10.
fn sanitize_vram_dma_dest(addr: u16) -> u16 {
    0x8000 | (addr & 0x1FF0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_ram_auto_increments_on_data_write() {
        let mut pal = PaletteRam::new();
        pal.write_index(0x80);
        pal.write_data(0x12);
        pal.write_data(0x34);
        assert_eq!(pal.data[0], 0x12);
        assert_eq!(pal.data[1], 0x34);
        assert_eq!(pal.read_index() & 0x3F, 2);
    }

    #[test]
    fn palette_ram_plain_write_keeps_index() {
        let mut pal = PaletteRam::new();
        pal.write_index(0x05);
        pal.write_data(0xAA);
        pal.write_data(0xBB);
        assert_eq!(pal.data[5], 0xBB);
    }

    #[test]
    fn palette_index_wraps_at_end() {
        let mut pal = PaletteRam::new();
        pal.write_index(0x80 | 0x3F);
        pal.write_data(0x77);
        assert_eq!(pal.read_index() & 0x3F, 0);
    }

    #[test]
    fn stat_write_preserves_mode_bits() {
        let mut mem = Memory::new();
        mem.set_io_reg(0xFF41, 0x02);
        mem.write(0xFF41, 0xFF);
        assert_eq!(mem.read(0xFF41), 0x80 | 0x78 | 0x02);
    }

    #[test]
    fn ly_write_resets_counter() {
        let mut mem = Memory::new();
        mem.set_io_reg(0xFF44, 0x90);
        mem.write(0xFF44, 0x42);
        assert_eq!(mem.read(0xFF44), 0);
    }

    #[test]
    fn div_write_clears_and_flags() {
        let mut mem = Memory::new();
        mem.set_io_reg(0xFF04, 0xAB);
        mem.write(0xFF04, 0x55);
        assert_eq!(mem.read(0xFF04), 0);
        assert!(mem.div_written);
    }
}
