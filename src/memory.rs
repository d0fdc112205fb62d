//! Z80 address space
//!
//! The Z80 sees a single dense 64 KiB memory. The low end of it is a
//! read-only ROM partition (default 8 KiB); everything above is RAM.
//! There are no unmapped holes: every address reads and, outside the ROM
//! partition, writes.
//!
//! Word accesses are little-endian and wrap at the top of the address
//! space: the word at 0xFFFF spans 0xFFFF and 0x0000.

use thiserror::Error;

/// Total addressable memory (16-bit address space)
pub const MEMORY_SIZE: usize = 0x10000;

/// Default ROM partition size (8 KiB)
pub const DEFAULT_ROM_SIZE: usize = 0x2000;

/// Address space errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// Store targeted the read-only ROM partition
    #[error("write to ROM address {addr:#06x}")]
    RomWrite { addr: u16 },
    /// ROM image does not fit the ROM partition
    #[error("ROM image of {len} bytes exceeds the {rom_size}-byte ROM partition")]
    RomTooLarge { len: usize, rom_size: usize },
    /// Bulk RAM load would touch the ROM partition or run past 0xFFFF
    #[error("RAM load at {addr:#06x}+{len} leaves the writable range")]
    RamLoadOutOfRange { addr: u16, len: usize },
}

/// Flat 64 KiB memory with a read-only ROM partition at the bottom.
pub struct AddressSpace {
    /// Backing store, always exactly `MEMORY_SIZE` bytes
    data: Vec<u8>,
    /// Addresses below this are read-only
    rom_size: usize,
}

impl AddressSpace {
    /// Create a zeroed address space with the given ROM partition.
    /// A `rom_size` of 0 makes the whole space writable (useful for tests
    /// and hosts that patch code at runtime).
    pub fn new(rom_size: usize) -> Self {
        Self {
            data: vec![0x00; MEMORY_SIZE],
            rom_size: rom_size.min(MEMORY_SIZE),
        }
    }

    /// Size of the read-only partition
    pub fn rom_size(&self) -> usize {
        self.rom_size
    }

    /// Read a byte. Never fails; the space is dense.
    #[inline]
    pub fn read_byte(&self, addr: u16) -> u8 {
        self.data[addr as usize]
    }

    /// Read a 16-bit word (little-endian, wrapping at 0xFFFF)
    #[inline]
    pub fn read_word(&self, addr: u16) -> u16 {
        let lo = self.read_byte(addr) as u16;
        let hi = self.read_byte(addr.wrapping_add(1)) as u16;
        lo | (hi << 8)
    }

    /// Write a byte. Stores below the ROM boundary are rejected and leave
    /// memory untouched.
    #[inline]
    pub fn write_byte(&mut self, addr: u16, value: u8) -> Result<(), MemoryError> {
        if (addr as usize) < self.rom_size {
            return Err(MemoryError::RomWrite { addr });
        }
        self.data[addr as usize] = value;
        Ok(())
    }

    /// Write a 16-bit word (little-endian, wrapping at 0xFFFF).
    /// Each byte is checked independently, so a word straddling the ROM
    /// boundary stores only its writable half.
    #[inline]
    pub fn write_word(&mut self, addr: u16, value: u16) -> Result<(), MemoryError> {
        let lo = self.write_byte(addr, value as u8);
        let hi = self.write_byte(addr.wrapping_add(1), (value >> 8) as u8);
        lo.and(hi)
    }

    /// Copy a ROM image into the ROM partition, starting at address 0.
    pub fn load_rom(&mut self, image: &[u8]) -> Result<(), MemoryError> {
        if image.len() > self.rom_size {
            return Err(MemoryError::RomTooLarge {
                len: image.len(),
                rom_size: self.rom_size,
            });
        }
        self.data[..image.len()].copy_from_slice(image);
        Ok(())
    }

    /// Copy bytes into RAM at the given address. The whole range must lie
    /// inside the writable region.
    pub fn load_ram(&mut self, addr: u16, bytes: &[u8]) -> Result<(), MemoryError> {
        let start = addr as usize;
        let end = start
            .checked_add(bytes.len())
            .filter(|&end| end <= MEMORY_SIZE)
            .ok_or(MemoryError::RamLoadOutOfRange {
                addr,
                len: bytes.len(),
            })?;
        if start < self.rom_size {
            return Err(MemoryError::RamLoadOutOfRange {
                addr,
                len: bytes.len(),
            });
        }
        self.data[start..end].copy_from_slice(bytes);
        Ok(())
    }

    /// Raw memory contents for save states
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Replace the full memory contents from a save state
    pub fn load_data(&mut self, data: &[u8]) {
        let len = data.len().min(MEMORY_SIZE);
        self.data[..len].copy_from_slice(&data[..len]);
    }

    /// Clear RAM to zero, keeping the ROM partition intact.
    pub fn reset(&mut self) {
        self.data[self.rom_size..].fill(0x00);
    }
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new(DEFAULT_ROM_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_space_is_zeroed() {
        let mem = AddressSpace::new(DEFAULT_ROM_SIZE);
        assert_eq!(mem.read_byte(0), 0x00);
        assert_eq!(mem.read_byte(0x8000), 0x00);
        assert_eq!(mem.read_byte(0xFFFF), 0x00);
    }

    #[test]
    fn test_read_write_byte() {
        let mut mem = AddressSpace::new(DEFAULT_ROM_SIZE);
        mem.write_byte(0x4000, 0xAB).unwrap();
        assert_eq!(mem.read_byte(0x4000), 0xAB);
    }

    #[test]
    fn test_read_write_word_little_endian() {
        let mut mem = AddressSpace::new(DEFAULT_ROM_SIZE);
        mem.write_word(0x4000, 0xBEEF).unwrap();
        assert_eq!(mem.read_word(0x4000), 0xBEEF);
        assert_eq!(mem.read_byte(0x4000), 0xEF);
        assert_eq!(mem.read_byte(0x4001), 0xBE);
    }

    #[test]
    fn test_word_wraps_at_top_of_memory() {
        let mut mem = AddressSpace::new(0);
        mem.write_word(0xFFFF, 0x1234).unwrap();
        assert_eq!(mem.read_byte(0xFFFF), 0x34);
        assert_eq!(mem.read_byte(0x0000), 0x12);
        assert_eq!(mem.read_word(0xFFFF), 0x1234);
    }

    #[test]
    fn test_word_write_straddling_rom_boundary_stores_half() {
        let mut mem = AddressSpace::new(DEFAULT_ROM_SIZE);
        let boundary = DEFAULT_ROM_SIZE as u16;
        assert!(mem.write_word(boundary - 1, 0xAABB).is_err());
        // Low byte landed in ROM and was dropped; high byte is in RAM
        assert_eq!(mem.read_byte(boundary - 1), 0x00);
        assert_eq!(mem.read_byte(boundary), 0xAA);
    }

    #[test]
    fn test_rom_write_rejected() {
        let mut mem = AddressSpace::new(DEFAULT_ROM_SIZE);
        let err = mem.write_byte(0x0100, 0x55).unwrap_err();
        assert_eq!(err, MemoryError::RomWrite { addr: 0x0100 });
        assert_eq!(mem.read_byte(0x0100), 0x00);
    }

    #[test]
    fn test_rom_boundary() {
        let mut mem = AddressSpace::new(DEFAULT_ROM_SIZE);
        let boundary = DEFAULT_ROM_SIZE as u16;
        assert!(mem.write_byte(boundary - 1, 0x11).is_err());
        assert!(mem.write_byte(boundary, 0x22).is_ok());
        assert_eq!(mem.read_byte(boundary), 0x22);
    }

    #[test]
    fn test_zero_rom_size_all_writable() {
        let mut mem = AddressSpace::new(0);
        mem.write_byte(0x0000, 0x99).unwrap();
        assert_eq!(mem.read_byte(0x0000), 0x99);
    }

    #[test]
    fn test_load_rom() {
        let mut mem = AddressSpace::new(DEFAULT_ROM_SIZE);
        mem.load_rom(&[0x3E, 0x05, 0x76]).unwrap();
        assert_eq!(mem.read_byte(0), 0x3E);
        assert_eq!(mem.read_byte(1), 0x05);
        assert_eq!(mem.read_byte(2), 0x76);
    }

    #[test]
    fn test_load_rom_too_large() {
        let mut mem = AddressSpace::new(DEFAULT_ROM_SIZE);
        let image = vec![0u8; DEFAULT_ROM_SIZE + 1];
        assert!(matches!(
            mem.load_rom(&image),
            Err(MemoryError::RomTooLarge { .. })
        ));
    }

    #[test]
    fn test_load_ram() {
        let mut mem = AddressSpace::new(DEFAULT_ROM_SIZE);
        mem.load_ram(0x2000, &[0xDE, 0xAD]).unwrap();
        assert_eq!(mem.read_byte(0x2000), 0xDE);
        assert_eq!(mem.read_byte(0x2001), 0xAD);
    }

    #[test]
    fn test_load_ram_into_rom_rejected() {
        let mut mem = AddressSpace::new(DEFAULT_ROM_SIZE);
        assert!(mem.load_ram(0x1000, &[0xFF]).is_err());
    }

    #[test]
    fn test_load_ram_past_end_rejected() {
        let mut mem = AddressSpace::new(DEFAULT_ROM_SIZE);
        assert!(mem.load_ram(0xFFFF, &[0x01, 0x02]).is_err());
    }

    #[test]
    fn test_reset_keeps_rom() {
        let mut mem = AddressSpace::new(DEFAULT_ROM_SIZE);
        mem.load_rom(&[0xC3, 0x00, 0x00]).unwrap();
        mem.write_byte(0x9000, 0x77).unwrap();
        mem.reset();
        assert_eq!(mem.read_byte(0), 0xC3);
        assert_eq!(mem.read_byte(0x9000), 0x00);
    }
}
