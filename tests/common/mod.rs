use once_cell::sync::Lazy;

/// Build a blank ROM image with the given header bytes. Every bank after
/// the first is tagged with its index in the first two bytes so banking
/// tests can tell which bank a read hit.
pub fn rom_image(cart_type: u8, rom_banks: usize, ram_size_code: u8) -> Vec<u8> {
    let mut data = vec![0u8; rom_banks.max(2) * 0x4000];
    for bank in 1..rom_banks {
        data[bank * 0x4000] = bank as u8;
        data[bank * 0x4000 + 1] = (bank >> 8) as u8;
    }
    let title = b"TEST ROM";
    data[0x134..0x134 + title.len()].copy_from_slice(title);
    data[0x147] = cart_type;
    data[0x149] = ram_size_code;
    data
}

/// 8 MiB MBC5 image (512 banks), shared across tests because building it is
/// the slow part.
#[allow(dead_code)]
pub static MBC5_ROM: Lazy<Vec<u8>> = Lazy::new(|| rom_image(0x19, 512, 0x03));

/// Place a program at the 0x0100 entry point of a 32 KiB no-MBC ROM.
#[allow(dead_code)]
pub fn program_rom(program: &[u8]) -> Vec<u8> {
    let mut data = rom_image(0x00, 2, 0x00);
    data[0x100..0x100 + program.len()].copy_from_slice(program);
    data
}
