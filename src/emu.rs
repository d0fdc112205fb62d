//! Emulator orchestrator
//!
//! Coordinates the CPU and the bus into one owned value the host embeds.
//! The host drives execution one instruction at a time with `step` (or in
//! batches with `run_cycles`), loads ROM/RAM images, registers I/O port
//! handlers, raises interrupts between steps, inspects registers and
//! memory, and drains the fault channel.

use crate::bus::{Bus, Fault};
use crate::cpu::{Cpu, RegisterKind, SnapshotError};
use crate::memory::{MemoryError, DEFAULT_ROM_SIZE, MEMORY_SIZE};
use crate::ports::{InHandler, OutHandler};

/// Reason `run_cycles` stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The cycle budget was used up
    CyclesComplete,
    /// The CPU executed HALT
    Halted,
}

/// Full machine snapshot size: CPU state followed by all of memory
pub const SNAPSHOT_SIZE: usize = Cpu::SNAPSHOT_SIZE + MEMORY_SIZE;

/// Main emulator state
pub struct Emu {
    /// Z80 CPU
    cpu: Cpu,
    /// System bus (memory, I/O ports, fault queue)
    bus: Bus,

    /// Last stop reason
    last_stop: StopReason,

    /// Total cycles executed since reset
    total_cycles: u64,
}

impl Emu {
    /// Create an emulator with the given ROM partition size
    pub fn new(rom_size: usize) -> Self {
        Self {
            cpu: Cpu::new(),
            bus: Bus::new(rom_size),
            last_stop: StopReason::CyclesComplete,
            total_cycles: 0,
        }
    }

    /// Load a ROM image at address 0 and reset the machine
    pub fn load_rom(&mut self, image: &[u8]) -> Result<(), MemoryError> {
        self.bus.load_rom(image)?;
        self.reset();
        Ok(())
    }

    /// Load bytes into RAM at the given address
    pub fn load_ram(&mut self, addr: u16, bytes: &[u8]) -> Result<(), MemoryError> {
        self.bus.load_ram(addr, bytes)
    }

    /// Reset CPU and RAM to power-on state; ROM contents and registered
    /// port handlers survive.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.bus.reset();
        self.last_stop = StopReason::CyclesComplete;
        self.total_cycles = 0;
    }

    /// Execute one instruction, returns T-states consumed
    pub fn step(&mut self) -> u32 {
        let cycles = self.cpu.step(&mut self.bus);
        self.total_cycles += cycles as u64;
        cycles
    }

    /// Run whole instructions until the cycle budget is spent or the CPU
    /// halts; returns cycles actually executed. The final instruction may
    /// overshoot the budget - steps are never split.
    pub fn run_cycles(&mut self, cycles: u32) -> u32 {
        let mut executed = 0u32;

        while executed < cycles {
            executed += self.step();

            if self.cpu.halted {
                self.last_stop = StopReason::Halted;
                return executed;
            }
        }

        self.last_stop = StopReason::CyclesComplete;
        executed
    }

    // ========== Interrupts ==========

    /// Raise a maskable interrupt. Edge-triggered: the request stays
    /// pending until accepted (IFF1 permitting) and is then cleared.
    pub fn raise_interrupt(&mut self) {
        self.cpu.irq_pending = true;
    }

    /// Raise a non-maskable interrupt
    pub fn raise_nmi(&mut self) {
        self.cpu.nmi_pending = true;
    }

    // ========== I/O Ports ==========

    /// Register an input handler for a port
    pub fn register_in_port(&mut self, port: u8, handler: InHandler) {
        self.bus.register_in_port(port, handler);
    }

    /// Register an output handler for a port
    pub fn register_out_port(&mut self, port: u8, handler: OutHandler) {
        self.bus.register_out_port(port, handler);
    }

    // ========== Introspection ==========

    /// Read a register or pair (debugger view)
    pub fn read_reg(&self, kind: RegisterKind) -> u16 {
        self.cpu.read_reg(kind)
    }

    /// Write a register or pair (debugger view)
    pub fn write_reg(&mut self, kind: RegisterKind, value: u16) {
        self.cpu.write_reg(kind, value);
    }

    /// Peek at a memory byte without affecting emulation state
    pub fn peek_byte(&self, addr: u16) -> u8 {
        self.bus.read_byte(addr)
    }

    /// Current program counter
    pub fn pc(&self) -> u16 {
        self.cpu.pc
    }

    /// Whether the CPU is in the halted state
    pub fn halted(&self) -> bool {
        self.cpu.halted
    }

    /// Total cycles executed since reset
    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    /// Why the last `run_cycles` returned
    pub fn last_stop_reason(&self) -> StopReason {
        self.last_stop
    }

    /// Remove and return the oldest pending fault
    pub fn poll_error(&mut self) -> Option<Fault> {
        self.bus.take_fault()
    }

    /// Number of pending faults
    pub fn error_count(&self) -> usize {
        self.bus.fault_count()
    }

    // ========== State Persistence ==========

    /// Save the full machine state: the CPU snapshot followed by all
    /// 64 KiB of memory.
    pub fn save_state(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(SNAPSHOT_SIZE);
        buf.extend_from_slice(&self.cpu.to_bytes());
        buf.extend_from_slice(self.bus.mem.data());
        buf
    }

    /// Restore a full machine state saved by `save_state`. A length
    /// mismatch or an out-of-range field fails the restore and leaves the
    /// machine untouched.
    pub fn load_state(&mut self, data: &[u8]) -> Result<(), SnapshotError> {
        if data.len() != SNAPSHOT_SIZE {
            return Err(SnapshotError::Length {
                len: data.len(),
                expected: SNAPSHOT_SIZE,
            });
        }

        self.cpu.from_bytes(&data[..Cpu::SNAPSHOT_SIZE])?;
        self.bus.mem.load_data(&data[Cpu::SNAPSHOT_SIZE..]);
        Ok(())
    }
}

impl Default for Emu {
    fn default() -> Self {
        Self::new(DEFAULT_ROM_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_emu() {
        let emu = Emu::default();
        assert_eq!(emu.pc(), 0);
        assert!(!emu.halted());
        assert_eq!(emu.total_cycles(), 0);
    }

    #[test]
    fn test_load_rom_and_run_to_halt() {
        let mut emu = Emu::default();
        emu.load_rom(&[0x00, 0x00, 0x00, 0x76]).unwrap(); // NOP x3, HALT
        let executed = emu.run_cycles(1000);

        assert_eq!(executed, 16); // 4 + 4 + 4 + 4
        assert_eq!(emu.last_stop_reason(), StopReason::Halted);
        assert!(emu.halted());
        assert_eq!(emu.pc(), 0x0004);
    }

    #[test]
    fn test_rom_too_large() {
        let mut emu = Emu::new(0x100);
        let image = vec![0u8; 0x101];
        assert!(matches!(
            emu.load_rom(&image),
            Err(MemoryError::RomTooLarge { .. })
        ));
    }

    #[test]
    fn test_run_from_ram() {
        let mut emu = Emu::default();
        emu.load_ram(0x8000, &[0x3E, 0x42, 0x76]).unwrap(); // LD A,0x42; HALT
        emu.write_reg(RegisterKind::PC, 0x8000);
        emu.run_cycles(100);

        assert_eq!(emu.read_reg(RegisterKind::A), 0x42);
        assert!(emu.halted());
    }

    #[test]
    fn test_reset() {
        let mut emu = Emu::default();
        emu.load_rom(&[0x00, 0x76]).unwrap();
        emu.run_cycles(100);
        assert!(emu.halted());

        emu.reset();
        assert_eq!(emu.pc(), 0);
        assert!(!emu.halted());
        assert_eq!(emu.total_cycles(), 0);
        // ROM survives reset
        assert_eq!(emu.peek_byte(1), 0x76);
    }

    #[test]
    fn test_register_introspection() {
        let mut emu = Emu::default();
        emu.write_reg(RegisterKind::BC, 0x1234);
        assert_eq!(emu.read_reg(RegisterKind::B), 0x12);
        assert_eq!(emu.read_reg(RegisterKind::C), 0x34);

        emu.write_reg(RegisterKind::AF, 0xAB95);
        assert_eq!(emu.read_reg(RegisterKind::A), 0xAB);
        assert_eq!(emu.read_reg(RegisterKind::F), 0x95);
        // AF round-trips with every flag bit
        assert_eq!(emu.read_reg(RegisterKind::AF), 0xAB95);
    }

    #[test]
    fn test_rom_write_surfaces_as_fault() {
        let mut emu = Emu::default();
        // LD A,0x55; LD (0x0010),A; HALT - the store lands in ROM
        emu.load_rom(&[0x3E, 0x55, 0x32, 0x10, 0x00, 0x76]).unwrap();
        emu.run_cycles(100);

        assert_eq!(emu.peek_byte(0x0010), 0x00);
        assert!(matches!(
            emu.poll_error(),
            Some(Fault::RomWrite {
                addr: 0x0010,
                value: 0x55
            })
        ));
        assert_eq!(emu.poll_error(), None);
    }

    #[test]
    fn test_save_restore_state() {
        let mut emu = Emu::default();
        emu.load_ram(0x8000, &[0x3E, 0x42, 0x76]).unwrap();
        emu.write_reg(RegisterKind::PC, 0x8000);
        emu.step(); // LD A,0x42

        let snapshot = emu.save_state();
        assert_eq!(snapshot.len(), SNAPSHOT_SIZE);

        // Diverge, then restore
        emu.run_cycles(100);
        emu.write_reg(RegisterKind::A, 0x00);
        emu.load_state(&snapshot).unwrap();

        assert_eq!(emu.read_reg(RegisterKind::A), 0x42);
        assert_eq!(emu.pc(), 0x8002);
        assert!(!emu.halted());
        assert_eq!(emu.peek_byte(0x8002), 0x76);
    }

    #[test]
    fn test_restore_rejects_bad_length() {
        let mut emu = Emu::default();
        assert!(matches!(
            emu.load_state(&[0u8; 100]),
            Err(SnapshotError::Length { .. })
        ));
    }

    #[test]
    fn test_restore_rejects_bad_interrupt_mode() {
        let mut emu = Emu::default();
        let mut snapshot = emu.save_state();
        snapshot[27] = 7; // interrupt_mode out of range
        assert!(matches!(
            emu.load_state(&snapshot),
            Err(SnapshotError::InvalidField {
                field: "interrupt_mode",
                ..
            })
        ));
    }
}
