use std::{
    fs, io,
    path::{Path, PathBuf},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use log::{info, warn};

/// Mapper family, decoded from the cartridge-type byte at 0x0147.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcKind {
    None,
    Mbc1,
    Mbc3,
    Mbc5,
}

/// A loaded cartridge: ROM image, external RAM and the banking state of its
/// memory bank controller. All bus traffic for 0x0000-0x7FFF and
/// 0xA000-0xBFFF ends up here.
#[derive(Debug)]
pub struct Cartridge {
    pub rom: Vec<u8>,
    pub ram: Vec<u8>,
    pub mbc: MbcKind,
    pub cgb: bool,
    pub title: String,
    cart_type: u8,
    save_path: Option<PathBuf>,
    rtc_path: Option<PathBuf>,
    mapper: Mapper,
}

#[derive(Debug)]
enum Mapper {
    Rom,
    Mbc1 {
        rom_bank: u8,
        ram_bank: u8,
        mode: u8,
        ram_enabled: bool,
    },
    Mbc3 {
        rom_bank: u8,
        ram_bank: u8,
        ram_enabled: bool,
        rtc: Option<Rtc>,
    },
    Mbc5 {
        rom_bank: u16,
        ram_bank: u8,
        ram_enabled: bool,
    },
}

#[derive(Debug, Clone, Copy, Default)]
struct RtcTime {
    seconds: u8,
    minutes: u8,
    hours: u8,
    days: u16,
    halt: bool,
    carry: bool,
}

/// MBC3 real-time clock. Ticks with emulated cycles while the core runs and
/// is caught up against wall-clock time when the cartridge is reloaded.
/// While latched, register reads serve a frozen snapshot of the counters.
#[derive(Debug, Clone)]
struct Rtc {
    regs: RtcTime,
    snapshot: RtcTime,
    latched: bool,
    last_sync: SystemTime,
    sub_cycles: u32,
}

const CYCLES_PER_SECOND: u32 = 4_194_304;

const RTC_MAGIC: &[u8; 4] = b"RTC0";

impl RtcTime {
    fn control(&self) -> u8 {
        let mut out = ((self.days >> 8) as u8) & 0x01;
        if self.halt {
            out |= 0x40;
        }
        if self.carry {
            out |= 0x80;
        }
        out
    }
}

impl Rtc {
    fn new(now: SystemTime) -> Self {
        let regs = RtcTime::default();
        Self {
            regs,
            snapshot: regs,
            latched: false,
            last_sync: now,
            sub_cycles: 0,
        }
    }

    fn latch(&mut self) {
        self.snapshot = self.regs;
        self.latched = true;
    }

    fn unlatch(&mut self) {
        self.latched = false;
    }

    fn read(&self, reg: u8) -> u8 {
        let t = if self.latched { &self.snapshot } else { &self.regs };
        match reg {
            0x08 => t.seconds & 0x3F,
            0x09 => t.minutes & 0x3F,
            0x0A => t.hours & 0x1F,
            0x0B => (t.days & 0x00FF) as u8,
            0x0C => t.control(),
            _ => 0xFF,
        }
    }

    fn write(&mut self, reg: u8, val: u8) {
        match reg {
            0x08 => {
                self.regs.seconds = val & 0x3F;
                // Writing seconds also resets the sub-second phase.
                self.sub_cycles = 0;
            }
            0x09 => self.regs.minutes = val & 0x3F,
            0x0A => self.regs.hours = val & 0x1F,
            0x0B => self.regs.days = (self.regs.days & 0x0100) | val as u16,
            0x0C => {
                self.regs.days = (self.regs.days & 0x00FF) | (((val & 0x01) as u16) << 8);
                self.regs.halt = val & 0x40 != 0;
                self.regs.carry = val & 0x80 != 0;
            }
            _ => {}
        }
    }

    fn tick(&mut self, cycles: u64) {
        if self.regs.halt {
            return;
        }
        let mut seconds = cycles / CYCLES_PER_SECOND as u64;
        let mut sub = self.sub_cycles + (cycles % CYCLES_PER_SECOND as u64) as u32;
        if sub >= CYCLES_PER_SECOND {
            sub -= CYCLES_PER_SECOND;
            seconds += 1;
        }
        self.sub_cycles = sub;
        if seconds > 0 {
            self.advance_seconds(seconds);
        }
    }

    fn sync_wall(&mut self, now: SystemTime) {
        let elapsed = now.duration_since(self.last_sync).unwrap_or_default();
        self.last_sync = now;
        if self.regs.halt {
            return;
        }
        self.advance_seconds(elapsed.as_secs());
    }

    fn advance_seconds(&mut self, mut seconds: u64) {
        // The register can hold out-of-range values (up to 63); a tick from
        // such a value wraps to 0 without carrying into the minutes.
        while seconds > 0 {
            let until_minute = if self.regs.seconds <= 59 {
                60 - self.regs.seconds as u64
            } else {
                64 - self.regs.seconds as u64 + 60
            };
            if seconds < until_minute {
                self.regs.seconds = ((self.regs.seconds as u64 + seconds) & 0x3F) as u8;
                return;
            }
            seconds -= until_minute;
            self.regs.seconds = 0;
            self.minute_tick();
        }
    }

    fn minute_tick(&mut self) {
        let carry = self.regs.minutes == 59;
        self.regs.minutes = (self.regs.minutes + 1) & 0x3F;
        if carry {
            self.regs.minutes = 0;
            self.hour_tick();
        }
    }

    fn hour_tick(&mut self) {
        let carry = self.regs.hours == 23;
        self.regs.hours = (self.regs.hours + 1) & 0x1F;
        if carry {
            self.regs.hours = 0;
            if self.regs.days >= 0x01FF {
                self.regs.days = 0;
                self.regs.carry = true;
            } else {
                self.regs.days += 1;
            }
        }
    }

    fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(20);
        out.extend_from_slice(RTC_MAGIC);
        let unix = self
            .last_sync
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        out.extend_from_slice(&unix.to_le_bytes());
        out.push(self.regs.seconds & 0x3F);
        out.push(self.regs.minutes & 0x3F);
        out.push(self.regs.hours & 0x1F);
        out.extend_from_slice(&(self.regs.days & 0x01FF).to_le_bytes());
        let mut flags = 0u8;
        if self.regs.halt {
            flags |= 0x01;
        }
        if self.regs.carry {
            flags |= 0x02;
        }
        out.push(flags);
        out
    }

    fn deserialize(&mut self, data: &[u8]) -> bool {
        if data.len() < 18 || &data[..4] != RTC_MAGIC {
            return false;
        }
        let unix = u64::from_le_bytes(data[4..12].try_into().unwrap_or_default());
        self.last_sync = UNIX_EPOCH + Duration::from_secs(unix);
        self.sub_cycles = 0;
        self.regs.seconds = data[12] & 0x3F;
        self.regs.minutes = data[13] & 0x3F;
        self.regs.hours = data[14] & 0x1F;
        self.regs.days = u16::from_le_bytes([data[15], data[16]]) & 0x01FF;
        self.regs.halt = data[17] & 0x01 != 0;
        self.regs.carry = data[17] & 0x02 != 0;
        self.snapshot = self.regs;
        true
    }
}

impl Cartridge {
    /// Load a ROM image from disk, together with any battery-backed RAM
    /// (`.sav`) and RTC (`.rtc`) sidecar files next to it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let data = fs::read(&path)?;
        if data.len() < 0x150 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "ROM image is smaller than a cartridge header",
            ));
        }
        let mut cart = Self::load(data);

        if cart.has_battery() {
            let save = path.as_ref().with_extension("sav");
            cart.save_path = Some(save.clone());
            if let Ok(bytes) = fs::read(&save) {
                for (d, s) in cart.ram.iter_mut().zip(bytes.iter()) {
                    *d = *s;
                }
            }
        }

        if cart.has_rtc() {
            let rtc_path = path.as_ref().with_extension("rtc");
            cart.rtc_path = Some(rtc_path.clone());
            if let Some(rtc) = cart.rtc_mut() {
                if let Ok(bytes) = fs::read(&rtc_path)
                    && !rtc.deserialize(&bytes)
                {
                    warn!("ignoring malformed RTC data in {}", rtc_path.display());
                }
                rtc.sync_wall(SystemTime::now());
            }
        }

        info!(
            "loaded ROM: {} (mapper {:?}, CGB {})",
            cart.title,
            cart.mbc,
            if cart.cgb { "yes" } else { "no" }
        );
        Ok(cart)
    }

    /// Build a cartridge from an in-memory ROM image.
    pub fn load(data: Vec<u8>) -> Self {
        let cart_type = data.get(0x0147).copied().unwrap_or(0);
        let cgb = data.get(0x0143).copied().unwrap_or(0) & 0x80 != 0;
        let mbc = match cart_type {
            0x01..=0x03 => MbcKind::Mbc1,
            0x0F..=0x13 => MbcKind::Mbc3,
            0x19..=0x1E => MbcKind::Mbc5,
            _ => MbcKind::None,
        };
        let has_rtc = matches!(cart_type, 0x0F | 0x10);
        let ram_size = match data.get(0x0149).copied().unwrap_or(0) {
            0x01 => 0x800,
            0x02 => 0x2000,
            0x03 => 0x8000,
            0x04 => 0x20000,
            0x05 => 0x10000,
            _ => 0,
        };

        let mapper = match mbc {
            MbcKind::None => Mapper::Rom,
            MbcKind::Mbc1 => Mapper::Mbc1 {
                rom_bank: 1,
                ram_bank: 0,
                mode: 0,
                ram_enabled: false,
            },
            MbcKind::Mbc3 => Mapper::Mbc3 {
                rom_bank: 1,
                ram_bank: 0,
                ram_enabled: false,
                rtc: has_rtc.then(|| Rtc::new(SystemTime::now())),
            },
            MbcKind::Mbc5 => Mapper::Mbc5 {
                rom_bank: 1,
                ram_bank: 0,
                ram_enabled: false,
            },
        };

        Self {
            title: title_from_header(&data),
            rom: data,
            ram: vec![0; ram_size],
            mbc,
            cgb,
            cart_type,
            save_path: None,
            rtc_path: None,
            mapper,
        }
    }

    /// Build a cartridge from raw bytes with an explicit RAM size, ignoring
    /// the header's RAM-size byte.
    pub fn from_bytes_with_ram(data: Vec<u8>, ram_size: usize) -> Self {
        let mut cart = Self::load(data);
        cart.ram = vec![0; ram_size];
        cart
    }

    /// Advance the RTC by a number of CPU cycles.
    pub fn step_rtc(&mut self, cycles: u32) {
        if let Some(rtc) = self.rtc_mut() {
            rtc.tick(cycles as u64);
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        let rom_banks = (self.rom.len() / 0x4000).max(1);
        match (&self.mapper, addr) {
            (Mapper::Rom, 0x0000..=0x7FFF) => self.rom.get(addr as usize).copied().unwrap_or(0xFF),
            (Mapper::Mbc1 { .. }, 0x0000..=0x3FFF)
            | (Mapper::Mbc3 { .. }, 0x0000..=0x3FFF)
            | (Mapper::Mbc5 { .. }, 0x0000..=0x3FFF) => {
                self.rom.get(addr as usize).copied().unwrap_or(0xFF)
            }
            (Mapper::Mbc1 { rom_bank, .. }, 0x4000..=0x7FFF) => {
                let offset =
                    ((*rom_bank as usize) % rom_banks) * 0x4000 + (addr as usize - 0x4000);
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            (Mapper::Mbc3 { rom_bank, .. }, 0x4000..=0x7FFF) => {
                let bank = if *rom_bank == 0 { 1 } else { *rom_bank } as usize;
                let offset = (bank % rom_banks) * 0x4000 + (addr as usize - 0x4000);
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            (Mapper::Mbc5 { rom_bank, .. }, 0x4000..=0x7FFF) => {
                // MBC5 can genuinely select bank 0 here.
                let offset =
                    ((*rom_bank as usize) % rom_banks) * 0x4000 + (addr as usize - 0x4000);
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            (Mapper::Rom, 0xA000..=0xBFFF) => self
                .ram
                .get(addr as usize - 0xA000)
                .copied()
                .unwrap_or(0xFF),
            (Mapper::Mbc1 { ram_enabled, .. }, 0xA000..=0xBFFF)
            | (Mapper::Mbc5 { ram_enabled, .. }, 0xA000..=0xBFFF) => {
                if !*ram_enabled {
                    0xFF
                } else {
                    self.ram.get(self.ram_index(addr)).copied().unwrap_or(0xFF)
                }
            }
            (
                Mapper::Mbc3 {
                    ram_enabled,
                    ram_bank,
                    rtc,
                    ..
                },
                0xA000..=0xBFFF,
            ) => {
                if !*ram_enabled {
                    0xFF
                } else {
                    match *ram_bank {
                        0x00..=0x03 => {
                            let idx = (*ram_bank as usize) * 0x2000 + addr as usize - 0xA000;
                            self.ram.get(idx).copied().unwrap_or(0xFF)
                        }
                        0x08..=0x0C => rtc.as_ref().map(|r| r.read(*ram_bank)).unwrap_or(0xFF),
                        _ => 0xFF,
                    }
                }
            }
            _ => 0xFF,
        }
    }

    /// Handle a write to the ROM area (0x0000-0x7FFF): MBC control registers.
    pub fn write(&mut self, addr: u16, val: u8) {
        match (&mut self.mapper, addr) {
            (Mapper::Mbc1 { ram_enabled, .. }, 0x0000..=0x1FFF)
            | (Mapper::Mbc3 { ram_enabled, .. }, 0x0000..=0x1FFF)
            | (Mapper::Mbc5 { ram_enabled, .. }, 0x0000..=0x1FFF) => {
                *ram_enabled = val & 0x0F == 0x0A;
            }
            (Mapper::Mbc1 { rom_bank, .. }, 0x2000..=0x3FFF) => {
                // Banks 0x00/0x20/0x40/0x60 cannot be selected; the low five
                // bits snap to 1.
                let mut low = val & 0x1F;
                if low == 0 {
                    low = 1;
                }
                *rom_bank = (*rom_bank & 0x60) | low;
            }
            (
                Mapper::Mbc1 {
                    rom_bank,
                    ram_bank,
                    mode,
                    ..
                },
                0x4000..=0x5FFF,
            ) => {
                if *mode == 0 {
                    *rom_bank = (*rom_bank & 0x1F) | ((val & 0x03) << 5);
                } else {
                    *ram_bank = val & 0x03;
                }
            }
            (
                Mapper::Mbc1 {
                    rom_bank,
                    ram_bank,
                    mode,
                    ..
                },
                0x6000..=0x7FFF,
            ) => {
                *mode = val & 0x01;
                // The register half the new mode doesn't use is cleared.
                if *mode == 0 {
                    *ram_bank = 0;
                } else {
                    *rom_bank &= 0x1F;
                }
            }
            (Mapper::Mbc3 { rom_bank, .. }, 0x2000..=0x3FFF) => {
                *rom_bank = val & 0x7F;
                if *rom_bank == 0 {
                    *rom_bank = 1;
                }
            }
            (Mapper::Mbc3 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                *ram_bank = val;
            }
            (Mapper::Mbc3 { rtc, .. }, 0x6000..=0x7FFF) => {
                // 0x00 freezes a snapshot of the clock; 0x01 releases it.
                if let Some(rtc) = rtc {
                    match val {
                        0x00 => rtc.latch(),
                        0x01 => rtc.unlatch(),
                        _ => {}
                    }
                }
            }
            (Mapper::Mbc5 { rom_bank, .. }, 0x2000..=0x2FFF) => {
                *rom_bank = (*rom_bank & 0x100) | val as u16;
            }
            (Mapper::Mbc5 { rom_bank, .. }, 0x3000..=0x3FFF) => {
                *rom_bank = (*rom_bank & 0xFF) | (((val & 0x01) as u16) << 8);
            }
            (Mapper::Mbc5 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                *ram_bank = val & 0x0F;
            }
            _ => {}
        }
    }

    /// Handle a write to the external-RAM window (0xA000-0xBFFF).
    pub fn write_ram(&mut self, addr: u16, val: u8) {
        match (&mut self.mapper, addr) {
            (Mapper::Rom, 0xA000..=0xBFFF) => {
                if let Some(b) = self.ram.get_mut(addr as usize - 0xA000) {
                    *b = val;
                }
            }
            (Mapper::Mbc1 { ram_enabled, .. }, 0xA000..=0xBFFF)
            | (Mapper::Mbc5 { ram_enabled, .. }, 0xA000..=0xBFFF) => {
                if *ram_enabled {
                    let idx = self.ram_index(addr);
                    if let Some(b) = self.ram.get_mut(idx) {
                        *b = val;
                    }
                }
            }
            (
                Mapper::Mbc3 {
                    ram_enabled,
                    ram_bank,
                    rtc,
                    ..
                },
                0xA000..=0xBFFF,
            ) => {
                if *ram_enabled {
                    match *ram_bank {
                        0x00..=0x03 => {
                            let idx = (*ram_bank as usize) * 0x2000 + addr as usize - 0xA000;
                            if let Some(b) = self.ram.get_mut(idx) {
                                *b = val;
                            }
                        }
                        0x08..=0x0C => {
                            if let Some(rtc) = rtc.as_mut() {
                                rtc.write(*ram_bank, val);
                            }
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    fn ram_index(&self, addr: u16) -> usize {
        let ram_banks = if self.ram.is_empty() {
            0
        } else {
            (self.ram.len() + 0x1FFF) / 0x2000
        };
        match &self.mapper {
            Mapper::Mbc1 { ram_bank, .. } => {
                if ram_banks == 0 {
                    addr as usize - 0xA000
                } else {
                    ((*ram_bank as usize) % ram_banks) * 0x2000 + addr as usize - 0xA000
                }
            }
            Mapper::Mbc3 { ram_bank, .. } => {
                ((*ram_bank as usize) & 0x03) * 0x2000 + addr as usize - 0xA000
            }
            Mapper::Mbc5 { ram_bank, .. } => {
                (*ram_bank as usize) * 0x2000 + addr as usize - 0xA000
            }
            Mapper::Rom => addr as usize - 0xA000,
        }
    }

    fn has_battery(&self) -> bool {
        matches!(self.cart_type, 0x03 | 0x06 | 0x09 | 0x0F | 0x10 | 0x13 | 0x1B | 0x1E)
    }

    fn has_rtc(&self) -> bool {
        matches!(self.cart_type, 0x0F | 0x10)
    }

    fn rtc_mut(&mut self) -> Option<&mut Rtc> {
        match &mut self.mapper {
            Mapper::Mbc3 { rtc: Some(rtc), .. } => Some(rtc),
            _ => None,
        }
    }

    /// Persist battery-backed RAM and RTC state to their sidecar files, if
    /// this cartridge has them.
    pub fn save_ram(&mut self) -> io::Result<()> {
        if let (true, Some(path)) = (self.has_battery(), &self.save_path)
            && !self.ram.is_empty()
        {
            fs::write(path, &self.ram)?;
        }
        let rtc_path = self.rtc_path.clone();
        if let (Some(path), Some(rtc)) = (rtc_path, self.rtc_mut()) {
            rtc.last_sync = SystemTime::now();
            fs::write(path, rtc.serialize())?;
        }
        Ok(())
    }
}

fn title_from_header(data: &[u8]) -> String {
    let end = 0x0143.min(data.len());
    let mut slice = &data[0x0134.min(data.len())..end];
    if let Some(pos) = slice.iter().position(|&b| b == 0) {
        slice = &slice[..pos];
    }
    String::from_utf8_lossy(slice).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mbc1_rom(banks: usize) -> Vec<u8> {
        let mut rom = vec![0u8; banks * 0x4000];
        rom[0x0147] = 0x01;
        for bank in 0..banks {
            rom[bank * 0x4000] = bank as u8;
        }
        rom
    }

    #[test]
    fn mbc1_zero_bank_write_selects_one() {
        let mut cart = Cartridge::load(mbc1_rom(4));
        cart.write(0x2000, 0x00);
        assert_eq!(cart.read(0x4000), 1);
    }

    #[test]
    fn mbc1_high_bits_extend_bank_number() {
        let mut cart = Cartridge::load(mbc1_rom(64));
        cart.write(0x2000, 0x02);
        cart.write(0x4000, 0x01); // high bits -> bank 0x22
        assert_eq!(cart.read(0x4000), 0x22);

        // Replacing the low bits keeps the high half.
        cart.write(0x2000, 0x00);
        assert_eq!(cart.read(0x4000), 0x21);
    }

    #[test]
    fn mbc1_mode_switch_clears_unused_bank_half() {
        let mut cart = Cartridge::load(mbc1_rom(64));
        cart.write(0x2000, 0x02);
        cart.write(0x4000, 0x01);
        assert_eq!(cart.read(0x4000), 0x22);

        // Switching to RAM-banking mode drops the high ROM bits.
        cart.write(0x6000, 0x01);
        assert_eq!(cart.read(0x4000), 0x02);

        // The fixed region always maps bank 0.
        assert_eq!(cart.read(0x0000), 0);
    }

    #[test]
    fn mbc5_allows_bank_zero_in_switchable_region() {
        let mut rom = vec![0u8; 4 * 0x4000];
        rom[0x0147] = 0x19;
        rom[0x0000] = 0xAA;
        rom[0x4000] = 0xBB;
        let mut cart = Cartridge::load(rom);
        assert_eq!(cart.read(0x4000), 0xBB);
        cart.write(0x2000, 0x00);
        assert_eq!(cart.read(0x4000), 0xAA);
    }

    #[test]
    fn mbc5_nine_bit_bank_select() {
        let mut rom = vec![0u8; 0x200 * 0x4000];
        rom[0x0147] = 0x19;
        rom[0x0148] = 0x08;
        rom[0x1FF * 0x4000] = 0xCD;
        let mut cart = Cartridge::load(rom);
        cart.write(0x2000, 0xFF);
        cart.write(0x3000, 0x01);
        assert_eq!(cart.read(0x4000), 0xCD);
    }

    #[test]
    fn ram_disabled_reads_open_bus() {
        let mut rom = vec![0u8; 0x8000];
        rom[0x0147] = 0x03;
        rom[0x0149] = 0x02;
        let mut cart = Cartridge::load(rom);
        cart.write_ram(0xA000, 0x12);
        assert_eq!(cart.read(0xA000), 0xFF);
        cart.write(0x0000, 0x0A);
        cart.write_ram(0xA000, 0x12);
        assert_eq!(cart.read(0xA000), 0x12);
        cart.write(0x0000, 0x00);
        assert_eq!(cart.read(0xA000), 0xFF);
    }

    #[test]
    fn rtc_ticks_through_invalid_seconds() {
        let mut rtc = Rtc::new(SystemTime::UNIX_EPOCH);
        rtc.regs.seconds = 63;
        rtc.regs.minutes = 5;
        rtc.advance_seconds(1);
        assert_eq!(rtc.regs.seconds, 0);
        assert_eq!(rtc.regs.minutes, 5);
    }

    #[test]
    fn rtc_day_overflow_sets_carry() {
        let mut rtc = Rtc::new(SystemTime::UNIX_EPOCH);
        rtc.regs.seconds = 59;
        rtc.regs.minutes = 59;
        rtc.regs.hours = 23;
        rtc.regs.days = 0x01FF;
        rtc.advance_seconds(1);
        assert_eq!(rtc.regs.days, 0);
        assert!(rtc.regs.carry);
    }

    #[test]
    fn rtc_halt_stops_cycle_ticks() {
        let mut rtc = Rtc::new(SystemTime::UNIX_EPOCH);
        rtc.write(0x0C, 0x40);
        rtc.tick(CYCLES_PER_SECOND as u64 * 3);
        assert_eq!(rtc.regs.seconds, 0);
        rtc.write(0x0C, 0x00);
        rtc.tick(CYCLES_PER_SECOND as u64);
        assert_eq!(rtc.regs.seconds, 1);
    }

    #[test]
    fn rtc_latch_freezes_reads_until_released() {
        let mut rtc = Rtc::new(SystemTime::UNIX_EPOCH);
        rtc.regs.seconds = 10;
        rtc.latch();
        rtc.regs.seconds = 20;
        assert_eq!(rtc.read(0x08), 10);
        rtc.unlatch();
        assert_eq!(rtc.read(0x08), 20);
    }
}
