//! System bus
//!
//! The bus is everything the CPU touches outside its own registers: the
//! 64 KiB address space, the I/O port gateway, and the fault channel.
//! All memory and port traffic generated by instruction execution goes
//! through the methods here.
//!
//! Faults never abort an instruction. A store into ROM is dropped, the
//! instruction keeps its cycle count, and a `Fault::RomWrite` is queued
//! for the host to drain with `take_fault`. The host decides whether a
//! fault is worth stopping emulation for.

use crate::memory::{AddressSpace, MemoryError, DEFAULT_ROM_SIZE};
use crate::ports::{InHandler, OutHandler, PortGateway};
use log::warn;
use std::collections::VecDeque;
use thiserror::Error;

/// Most faults the queue retains before dropping new ones
const MAX_FAULTS: usize = 128;

/// Non-fatal events recorded during execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Fault {
    /// A store targeted the read-only ROM partition and was dropped
    #[error("dropped write of {value:#04x} to ROM address {addr:#06x}")]
    RomWrite { addr: u16, value: u8 },
    /// The decoder reached a nominally unreachable table entry
    #[error("architectural anomaly: opcode {opcode:#04x} at {pc:#06x}")]
    Anomaly { pc: u16, opcode: u8 },
}

/// Memory, ports, and the fault queue behind one CPU-facing surface.
pub struct Bus {
    /// 64 KiB ROM/RAM address space
    pub mem: AddressSpace,
    /// IN/OUT callback tables
    pub ports: PortGateway,
    /// Pending faults, oldest first
    faults: VecDeque<Fault>,
}

impl Bus {
    /// Create a bus with the given ROM partition size
    pub fn new(rom_size: usize) -> Self {
        Self {
            mem: AddressSpace::new(rom_size),
            ports: PortGateway::new(),
            faults: VecDeque::new(),
        }
    }

    // ========== CPU-facing memory access ==========

    /// Read a byte of memory
    #[inline]
    pub fn read_byte(&self, addr: u16) -> u8 {
        self.mem.read_byte(addr)
    }

    /// Read a little-endian word of memory
    #[inline]
    pub fn read_word(&self, addr: u16) -> u16 {
        self.mem.read_word(addr)
    }

    /// Write a byte of memory. A ROM violation drops the store and queues
    /// a fault; execution continues.
    #[inline]
    pub fn write_byte(&mut self, addr: u16, value: u8) {
        if let Err(MemoryError::RomWrite { addr }) = self.mem.write_byte(addr, value) {
            self.record_rom_write(addr, value);
        }
    }

    /// Write a little-endian word of memory, each byte checked against the
    /// ROM partition independently.
    #[inline]
    pub fn write_word(&mut self, addr: u16, value: u16) {
        self.write_byte(addr, value as u8);
        self.write_byte(addr.wrapping_add(1), (value >> 8) as u8);
    }

    // ========== CPU-facing port access ==========

    /// Read from an I/O port (full 16-bit port address)
    #[inline]
    pub fn port_read(&mut self, addr: u16) -> u8 {
        self.ports.read(addr)
    }

    /// Write to an I/O port (full 16-bit port address)
    #[inline]
    pub fn port_write(&mut self, addr: u16, value: u8) {
        self.ports.write(addr, value);
    }

    // ========== Fault channel ==========

    fn push_fault(&mut self, fault: Fault) {
        if self.faults.len() < MAX_FAULTS {
            self.faults.push_back(fault);
        }
    }

    fn record_rom_write(&mut self, addr: u16, value: u8) {
        warn!("dropped write of {value:#04x} to ROM address {addr:#06x}");
        self.push_fault(Fault::RomWrite { addr, value });
    }

    /// Record a decode of a nominally unreachable table entry
    pub fn record_anomaly(&mut self, pc: u16, opcode: u8) {
        warn!("architectural anomaly: opcode {opcode:#04x} at {pc:#06x}");
        self.push_fault(Fault::Anomaly { pc, opcode });
    }

    /// Remove and return the oldest pending fault
    pub fn take_fault(&mut self) -> Option<Fault> {
        self.faults.pop_front()
    }

    /// Number of pending faults
    pub fn fault_count(&self) -> usize {
        self.faults.len()
    }

    // ========== Host-facing setup ==========

    /// Load a ROM image at address 0
    pub fn load_rom(&mut self, image: &[u8]) -> Result<(), MemoryError> {
        self.mem.load_rom(image)
    }

    /// Load bytes into RAM at the given address
    pub fn load_ram(&mut self, addr: u16, bytes: &[u8]) -> Result<(), MemoryError> {
        self.mem.load_ram(addr, bytes)
    }

    /// Register an input handler for a port
    pub fn register_in_port(&mut self, port: u8, handler: InHandler) {
        self.ports.register_in(port, handler);
    }

    /// Register an output handler for a port
    pub fn register_out_port(&mut self, port: u8, handler: OutHandler) {
        self.ports.register_out(port, handler);
    }

    /// Clear RAM and pending faults; ROM contents and port handlers stay.
    pub fn reset(&mut self) {
        self.mem.reset();
        self.faults.clear();
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(DEFAULT_ROM_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ram_write_read() {
        let mut bus = Bus::default();
        bus.write_byte(0x8000, 0x42);
        assert_eq!(bus.read_byte(0x8000), 0x42);
        assert_eq!(bus.fault_count(), 0);
    }

    #[test]
    fn test_rom_write_queues_fault() {
        let mut bus = Bus::default();
        bus.write_byte(0x0010, 0x42);
        assert_eq!(bus.read_byte(0x0010), 0x00);
        assert_eq!(
            bus.take_fault(),
            Some(Fault::RomWrite {
                addr: 0x0010,
                value: 0x42
            })
        );
        assert_eq!(bus.take_fault(), None);
    }

    #[test]
    fn test_fault_queue_is_bounded() {
        let mut bus = Bus::default();
        for _ in 0..(MAX_FAULTS + 10) {
            bus.write_byte(0x0000, 0xFF);
        }
        assert_eq!(bus.fault_count(), MAX_FAULTS);
    }

    #[test]
    fn test_anomaly_recorded() {
        let mut bus = Bus::default();
        bus.record_anomaly(0x1234, 0xED);
        assert_eq!(
            bus.take_fault(),
            Some(Fault::Anomaly {
                pc: 0x1234,
                opcode: 0xED
            })
        );
    }

    #[test]
    fn test_reset_clears_faults_keeps_rom() {
        let mut bus = Bus::default();
        bus.load_rom(&[0xAA]).unwrap();
        bus.write_byte(0x0000, 0x00);
        assert_eq!(bus.fault_count(), 1);
        bus.reset();
        assert_eq!(bus.fault_count(), 0);
        assert_eq!(bus.read_byte(0x0000), 0xAA);
    }

    #[test]
    fn test_port_roundtrip_through_bus() {
        let mut bus = Bus::default();
        bus.register_in_port(0x07, Box::new(|_| 0x3C));
        assert_eq!(bus.port_read(0x0007), 0x3C);
        assert_eq!(bus.port_read(0x0008), 0xFF);
    }
}
