/// Register bus for a sound unit.
///
/// The core does not synthesize audio. Every access to the 0xFF10-0xFF3F
/// window is forwarded here together with the CPU cycle count at which it
/// happened, so an implementation can reconstruct the write timeline and mix
/// samples on its own schedule.
pub trait Apu {
    fn read_register(&mut self, time: u64, addr: u16) -> u8;
    fn write_register(&mut self, time: u64, addr: u16, value: u8);
}

/// Default sound unit: a plain byte store. Games that read registers back
/// see their own writes; nothing is audible.
pub struct NullApu {
    regs: [u8; 0x30],
}

impl NullApu {
    pub fn new() -> Self {
        Self { regs: [0; 0x30] }
    }
}

impl Default for NullApu {
    fn default() -> Self {
        Self::new()
    }
}

impl Apu for NullApu {
    fn read_register(&mut self, _time: u64, addr: u16) -> u8 {
        self.regs
            .get(addr.wrapping_sub(0xFF10) as usize)
            .copied()
            .unwrap_or(0xFF)
    }

    fn write_register(&mut self, _time: u64, addr: u16, value: u8) {
        if let Some(reg) = self.regs.get_mut(addr.wrapping_sub(0xFF10) as usize) {
            *reg = value;
        }
    }
}
