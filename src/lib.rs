//! Scanline-based Game Boy / Game Boy Color emulation core.
//!
//! This crate contains the platform-agnostic emulator logic: CPU, memory
//! map, cartridge mappers, and PPU. Frontends supply windowing, audio
//! synthesis, and input, and drive the core via the [`gameboy`] facade.

/// Audio register bus: the trait a frontend's APU implements, plus a
/// register-storage stub for running without sound.
pub mod apu;

/// Cartridge mappers (MBC) and ROM/RAM/RTC handling.
pub mod cartridge;

/// LR35902 CPU core, interrupts, and the DIV/TIMA timer.
pub mod cpu;

/// High-level facade that wires the CPU, MMU, and PPU into a single machine.
pub mod gameboy;

/// Joypad input register and edge-triggered interrupt behavior.
pub mod input;

/// Memory map and hardware plumbing.
pub mod mmu;

/// Pixel Processing Unit (PPU) emulation.
pub mod ppu;

pub use apu::{Apu, NullApu};
pub use cartridge::Cartridge;
pub use gameboy::{CLOCK_SPEED, GameBoy};
pub use input::Button;
pub use ppu::{SCREEN_HEIGHT, SCREEN_WIDTH};
