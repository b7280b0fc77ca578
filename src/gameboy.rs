use std::io;
use std::path::Path;

use crate::cartridge::Cartridge;
use crate::cpu::Cpu;
use crate::input::Button;
use crate::mmu::{INT_JOYPAD, Memory};
use crate::ppu::Ppu;

/// Master clock in Hz (single-speed mode).
pub const CLOCK_SPEED: u32 = 4_194_304;
const FRAMES_PER_SECOND: u32 = 60;

/// A complete emulated unit: CPU, address space, and PPU wired together.
///
/// Instances are self-contained, so several can run side by side. A frontend
/// drives one by calling [`run_frame`](Self::run_frame) at ~60 Hz, feeding
/// input through [`press`](Self::press)/[`release`](Self::release) and
/// presenting [`framebuffer`](Self::framebuffer).
pub struct GameBoy {
    pub cpu: Cpu,
    pub mem: Memory,
    pub ppu: Ppu,
}

impl GameBoy {
    pub fn new() -> Self {
        Self::with_mode(false)
    }

    pub fn with_mode(cgb: bool) -> Self {
        Self {
            cpu: Cpu::new_with_mode(cgb),
            mem: Memory::new_with_mode(cgb),
            ppu: Ppu::new(),
        }
    }

    /// Insert a cartridge, resetting to the hardware mode its header asks
    /// for (a CGB-capable ROM gets CGB hardware).
    pub fn load_cart(&mut self, cart: Cartridge) {
        let cgb = cart.cgb;
        let boot = self.mem.boot_rom.take();
        self.cpu = Cpu::new_with_mode(cgb);
        self.mem = Memory::new_with_mode(cgb);
        self.reset_ppu();
        self.mem.load_cart(cart);
        if let Some(boot) = boot {
            self.mem.load_boot_rom(boot);
            self.cpu = Cpu::new_power_on();
        }
    }

    pub fn load_cart_file<P: AsRef<Path>>(&mut self, path: P) -> io::Result<()> {
        let cart = Cartridge::from_file(path)?;
        self.load_cart(cart);
        Ok(())
    }

    /// Supply a boot ROM image. Execution restarts from address 0 with the
    /// overlay mapped instead of the documented post-boot state.
    pub fn load_boot_rom(&mut self, data: Vec<u8>) {
        self.mem.load_boot_rom(data);
        self.cpu = Cpu::new_power_on();
    }

    /// Restart the machine, keeping the inserted cartridge and any boot ROM.
    pub fn reset(&mut self) {
        let cart = self.mem.cart.take();
        let boot = self.mem.boot_rom.take();
        let cgb = cart.as_ref().map_or(self.mem.cgb_mode(), |c| c.cgb);
        self.cpu = Cpu::new_with_mode(cgb);
        self.mem = Memory::new_with_mode(cgb);
        self.reset_ppu();
        self.mem.cart = cart;
        if let Some(boot) = boot {
            self.mem.load_boot_rom(boot);
            self.cpu = Cpu::new_power_on();
        }
    }

    // Fresh PPU state, but frontend-chosen settings survive a reset.
    fn reset_ppu(&mut self) {
        let mut ppu = Ppu::new();
        ppu.dmg_colors = self.ppu.dmg_colors;
        ppu.draw_tiles = self.ppu.draw_tiles;
        ppu.draw_sprites = self.ppu.draw_sprites;
        self.ppu = ppu;
    }

    /// Execute one instruction and bring every subsystem up to date.
    /// Returns the clock cycles consumed, including interrupt dispatch.
    pub fn step(&mut self) -> u32 {
        let mut cycles = self.cpu.step(&mut self.mem);
        self.tick_hardware(cycles);
        let dispatch = self.cpu.process_interrupts(&mut self.mem);
        if dispatch > 0 {
            self.tick_hardware(dispatch);
            cycles += dispatch;
        }
        cycles
    }

    fn tick_hardware(&mut self, cycles: u32) {
        self.mem.cpu_time += cycles as u64;
        if let Some(cart) = self.mem.cart.as_mut() {
            cart.step_rtc(cycles);
        }
        self.ppu.update(cycles, &mut self.mem);
        self.cpu.update_timer(&mut self.mem, cycles);
    }

    /// Run one video frame's worth of cycles (scaled in double-speed mode).
    pub fn run_frame(&mut self) {
        self.ppu.frame_ready = false;
        let speed = if self.mem.double_speed() { 2 } else { 1 };
        let budget = CLOCK_SPEED / FRAMES_PER_SECOND * speed;
        let mut spent = 0;
        while spent < budget {
            spent += self.step();
        }
    }

    /// The most recently completed frame, 160x144 0x00RRGGBB pixels.
    pub fn framebuffer(&self) -> &[u32] {
        self.ppu.front()
    }

    pub fn press(&mut self, button: Button) {
        if self.mem.joypad.press(button) {
            self.mem.request_interrupt(INT_JOYPAD);
        }
    }

    pub fn release(&mut self, button: Button) {
        self.mem.joypad.release(button);
    }

    /// Persist battery-backed cartridge RAM (and RTC state), if any.
    pub fn save_ram(&mut self) -> io::Result<()> {
        match self.mem.cart.as_mut() {
            Some(cart) => cart.save_ram(),
            None => Ok(()),
        }
    }
}

impl Default for GameBoy {
    fn default() -> Self {
        Self::new()
    }
}
