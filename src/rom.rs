use std::path::Path;

use log::debug;
use nom::{number::complete::le_u16, sequence::pair, IResult};
use num_enum::TryFromPrimitive;

use crate::{
    addr::Addr,
    error::{err, AddressError, Result, RomError},
    sink::OutputSink,
};

// -------------------------------------------------------------------------------------------------

/// The cartridge's mapping from the 65816 address space to ROM offsets.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Mapping {
    LoRom,
    HiRom,
    ExHiRom,
}

/// The map-mode byte of the internal ROM header.
#[derive(Copy, Clone, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum MapMode {
    SlowLoRom   = 0x20,
    SlowHiRom   = 0x21,
    SlowExHiRom = 0x25,
    FastLoRom   = 0x30,
    FastHiRom   = 0x31,
    FastExHiRom = 0x35,
}

impl MapMode {
    pub fn mapping(self) -> Mapping {
        match self {
            MapMode::SlowLoRom | MapMode::FastLoRom => Mapping::LoRom,
            MapMode::SlowHiRom | MapMode::FastHiRom => Mapping::HiRom,
            MapMode::SlowExHiRom | MapMode::FastExHiRom => Mapping::ExHiRom,
        }
    }
}

/// Converts an address in the 65816 address space to an offset into
/// cartridge ROM, or explains why it doesn't map there.
pub fn snes_to_rom_offset(
    address: Addr,
    mapping: Mapping,
) -> std::result::Result<usize, AddressError> {
    let raw = address.raw();
    if raw > 0xFF_FFFF {
        return Err(AddressError::OutOfRange(address));
    }
    let bank = address.bank();
    let bank_addr = address.bank_addr() as usize;
    if bank == 0x7E || bank == 0x7F {
        return Err(AddressError::WramBank(address));
    }
    if bank_addr < 0x8000 && ((bank < 0x40) || (0x80..0xC0).contains(&bank)) {
        // The low half of these banks belongs to the system, not the cart.
        return Err(AddressError::NotRomAddress(address));
    }
    match mapping {
        Mapping::LoRom => {
            if bank_addr < 0x8000 {
                return Err(AddressError::BelowLoRomWindow(address));
            }
            // Banks $80-$bf mirror $00-$3f.
            Ok((bank_addr & 0x7FFF) | ((bank as usize & 0x7F) << 15))
        }
        Mapping::HiRom => Ok(raw as usize & 0x3F_FFFF),
        Mapping::ExHiRom => {
            let mut offset = raw as usize & 0x3F_FFFF;
            // Address bit 23 is inverted and becomes bit 22 of the cart
            // offset.
            if raw & 0x80_0000 == 0 {
                offset |= 0x40_0000;
            }
            Ok(offset)
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// A ROM image, fully materialized in memory, with its copier header (if
/// any) kept aside.
pub struct Rom {
    mapping: Mapping,
    path:    String,
    header:  Vec<u8>,
    data:    Vec<u8>,
}

impl Rom {
    pub fn new(mapping: Mapping, path: impl Into<String>, data: Vec<u8>) -> Self {
        Self { mapping, path: path.into(), header: Vec::new(), data }
    }

    pub fn mapping(&self) -> Mapping {
        self.mapping
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Loads a ROM image from disk. SNES images come in 0x1000-byte pages,
    /// optionally preceded by a 0x200-byte copier header; anything else is
    /// corrupt. The memory mapping is sniffed from the internal header.
    pub fn from_file(path: impl AsRef<Path>) -> std::result::Result<Rom, RomError> {
        let path = path.as_ref();
        let mut data = std::fs::read(path)?;
        if data.is_empty() {
            return Err(RomError::Empty);
        }
        let header = match data.len() % 0x1000 {
            0 => Vec::new(),
            0x200 => {
                let rest = data.split_off(0x200);
                std::mem::replace(&mut data, rest)
            }
            _ => return Err(RomError::BadSize(data.len())),
        };
        if data.len() < 0x1_0000 {
            return Err(RomError::BadSize(data.len()));
        }

        let maybe_lorom = checksum_plausible(&data, 0x7FDC);
        let maybe_hirom = checksum_plausible(&data, 0xFFDC);
        let mapping = match (maybe_lorom, maybe_hirom) {
            (true, false) => Mapping::LoRom,
            (false, true) => {
                if data.len() < 0x40_0000 {
                    Mapping::HiRom
                } else {
                    Mapping::ExHiRom
                }
            }
            _ => return Err(RomError::UnknownMapping),
        };
        let header_base = if mapping == Mapping::LoRom { 0x7FB0 } else { 0xFFB0 };
        if let Ok(mode) = MapMode::try_from(data[header_base + 0x25] & 0x3F) {
            debug!("{}: internal header reports {mode:?}", path.display());
        }

        Ok(Rom {
            mapping,
            path: path.display().to_string(),
            header,
            data,
        })
    }

    pub fn header(&self) -> &[u8] {
        &self.header
    }

    /// Reads `length` bytes of program data starting at `address`,
    /// advancing the way the program counter does (wrapping within the
    /// bank).
    pub fn read(&self, address: Addr, length: u32) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(length as usize);
        for i in 0..length as i32 {
            let offset = snes_to_rom_offset(address.add_wrapped(i), self.mapping)?;
            let byte = self.data.get(offset).ok_or_else(|| {
                crate::error::Error::from(AddressError::PastEndOfRom(address.add_wrapped(i)))
            })?;
            bytes.push(*byte);
        }
        Ok(bytes)
    }

    /// Reads as many of `length` bytes as the mapping allows; at least one
    /// byte must be readable.
    pub fn read_up_to(&self, address: Addr, length: u32) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(length as usize);
        for i in 0..length as i32 {
            let target = address.add_wrapped(i);
            let Ok(offset) = snes_to_rom_offset(target, self.mapping) else { break };
            let Some(byte) = self.data.get(offset) else { break };
            bytes.push(*byte);
        }
        if bytes.is_empty() {
            return Err(err!("Cannot read program data at {address}"));
        }
        Ok(bytes)
    }

    pub fn read_byte(&self, address: Addr) -> Result<u8> {
        Ok(self.read(address, 1)?[0])
    }

    pub fn read_word(&self, address: Addr) -> Result<u16> {
        let bytes = self.read(address, 2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_long(&self, address: Addr) -> Result<u32> {
        let bytes = self.read(address, 3)?;
        Ok(bytes[0] as u32 | (bytes[1] as u32) << 8 | (bytes[2] as u32) << 16)
    }
}

/// True if the checksum/complement pair at `offset` looks like an internal
/// SNES header.
fn checksum_plausible(data: &[u8], offset: usize) -> bool {
    let Some(slice) = data.get(offset..offset + 4) else { return false };
    let parsed: IResult<&[u8], (u16, u16)> = pair(le_u16, le_u16)(slice);
    match parsed {
        Ok((_, (complement, checksum))) => complement ^ checksum == 0xFFFF,
        Err(_) => false,
    }
}

// -------------------------------------------------------------------------------------------------

/// An output sink that verifies assembly output against an existing ROM:
/// any write whose bytes differ from what the ROM already holds is an
/// error. Used to validate that a disassembly round-trips.
pub struct RomIdentitySink<'a> {
    rom: &'a Rom,
}

impl<'a> RomIdentitySink<'a> {
    pub fn new(rom: &'a Rom) -> Self {
        Self { rom }
    }
}

impl OutputSink for RomIdentitySink<'_> {
    fn write(&mut self, address: Addr, data: &[u8]) -> Result<()> {
        let existing = self.rom.read(address, data.len() as u32)?;
        for (i, (new, old)) in data.iter().zip(existing.iter()).enumerate() {
            if new != old {
                let target = address.add_wrapped(i as i32);
                return Err(err!(
                    "Write of ${new:02x} at {target} does not match existing byte ${old:02x}"
                ));
            }
        }
        Ok(())
    }
}

/// An output sink that patches a copy of a ROM image in memory.
pub struct RomOverwriter<'a> {
    rom:  &'a Rom,
    data: Vec<u8>,
}

impl<'a> RomOverwriter<'a> {
    pub fn new(rom: &'a Rom) -> Self {
        Self { rom, data: rom.data().to_vec() }
    }

    /// The patched image, copier header re-attached.
    pub fn into_bytes(self) -> Vec<u8> {
        let mut out = self.rom.header().to_vec();
        out.extend_from_slice(&self.data);
        out
    }
}

impl OutputSink for RomOverwriter<'_> {
    fn write(&mut self, address: Addr, data: &[u8]) -> Result<()> {
        for (i, byte) in data.iter().enumerate() {
            let target = address.add_wrapped(i as i32);
            let offset = snes_to_rom_offset(target, self.rom.mapping())?;
            let slot = self
                .data
                .get_mut(offset)
                .ok_or(AddressError::PastEndOfRom(target))?;
            *slot = *byte;
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lorom_translation() {
        assert_eq!(snes_to_rom_offset(Addr::new(0x008000), Mapping::LoRom), Ok(0));
        assert_eq!(snes_to_rom_offset(Addr::new(0x00FFFF), Mapping::LoRom), Ok(0x7FFF));
        assert_eq!(snes_to_rom_offset(Addr::new(0x018000), Mapping::LoRom), Ok(0x8000));
        assert_eq!(
            snes_to_rom_offset(Addr::new(0x001000), Mapping::LoRom),
            Err(AddressError::NotRomAddress(Addr::new(0x001000)))
        );
        assert_eq!(
            snes_to_rom_offset(Addr::new(0x7E0000), Mapping::LoRom),
            Err(AddressError::WramBank(Addr::new(0x7E0000)))
        );
        // Banks $40-$7d expose the low half too.
        assert_eq!(
            snes_to_rom_offset(Addr::new(0x401000), Mapping::LoRom),
            Err(AddressError::BelowLoRomWindow(Addr::new(0x401000)))
        );
    }

    #[test]
    fn hirom_translation() {
        assert_eq!(snes_to_rom_offset(Addr::new(0xC00000), Mapping::HiRom), Ok(0));
        assert_eq!(
            snes_to_rom_offset(Addr::new(0xC12345), Mapping::HiRom),
            Ok(0x012345)
        );
        assert_eq!(snes_to_rom_offset(Addr::new(0x008000), Mapping::HiRom), Ok(0x8000));
    }

    #[test]
    fn exhirom_inverts_bit_23() {
        assert_eq!(
            snes_to_rom_offset(Addr::new(0xC00000), Mapping::ExHiRom),
            Ok(0)
        );
        assert_eq!(
            snes_to_rom_offset(Addr::new(0x408000), Mapping::ExHiRom),
            Ok(0x408000)
        );
    }

    #[test]
    fn reads_wrap_within_the_bank() {
        let mut data = vec![0u8; 0x10000];
        data[0x7FFF] = 0xAA; // $00ffff
        data[0x0000] = 0xBB; // $008000
        let rom = Rom::new(Mapping::LoRom, "test.sfc", data);
        assert_eq!(rom.read(Addr::new(0x00FFFF), 2).unwrap(), vec![0xAA, 0xBB]);
        assert_eq!(rom.read_word(Addr::new(0x00FFFF)).unwrap(), 0xBBAA);
    }

    #[test]
    fn read_up_to_truncates_at_the_end() {
        let rom = Rom::new(Mapping::LoRom, "test.sfc", vec![0x60; 0x10]);
        // $008000 maps to offset 0; only 0x10 bytes exist.
        assert_eq!(rom.read_up_to(Addr::new(0x00800F), 4).unwrap(), vec![0x60]);
        assert!(rom.read_up_to(Addr::new(0x018000), 4).is_err());
    }

    #[test]
    fn identity_sink_rejects_differences() {
        let rom = Rom::new(Mapping::LoRom, "test.sfc", vec![0x60, 0xEA]);
        let mut sink = RomIdentitySink::new(&rom);
        assert!(sink.write(Addr::new(0x008000), &[0x60, 0xEA]).is_ok());
        let error = sink.write(Addr::new(0x008000), &[0x61]).unwrap_err();
        assert!(error.message().contains("does not match"), "{error}");
    }

    #[test]
    fn overwriter_patches_a_copy() {
        let rom = Rom::new(Mapping::LoRom, "test.sfc", vec![0x00, 0x00]);
        let mut overwriter = RomOverwriter::new(&rom);
        overwriter.write(Addr::new(0x008001), &[0x42]).unwrap();
        assert_eq!(overwriter.into_bytes(), vec![0x00, 0x42]);
        assert_eq!(rom.data(), &[0x00, 0x00]);
    }
}
