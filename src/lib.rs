//! Zilog Z80 Emulator Core
//!
//! This crate provides a cycle-counted, instruction-stepped Z80 CPU core
//! for embedding in larger system emulators. No OS APIs are used - all
//! I/O goes through byte buffers and registered port callbacks.
//!
//! # Architecture
//!
//! The core is organized into several modules:
//! - `memory`: 64 KiB address space with a read-only ROM partition
//! - `ports`: 256-entry I/O port callback gateway
//! - `bus`: Memory and port access routing plus the fault channel
//! - `cpu`: Z80 CPU implementation
//! - `emu`: Main emulator orchestrator
//!
//! # Memory Map (16-bit address space)
//!
//! | Address Range   | Region                        |
//! |-----------------|-------------------------------|
//! | 0x0000 - ROM_end| ROM (read-only, default 8 KiB)|
//! | ROM_end - 0xFFFF| RAM                           |
//!
//! I/O ports are a separate 256-entry space addressed by the IN/OUT
//! instruction families; they are not part of the 64 KiB.
//!
//! # Usage
//!
//! The host owns scheduling: call [`Emu::step`] in a loop (throttled to
//! the target clock, or single-stepped from a debugger) and accumulate
//! the returned T-states. Peripherals interact between steps - load
//! memory, raise interrupts, drain faults - never during one.
//!
//! ```
//! use z80_core::{Emu, RegisterKind};
//!
//! let mut emu = Emu::default();
//! emu.load_rom(&[0x3E, 0x05, 0xC6, 0x03, 0x76]).unwrap(); // LD A,5; ADD A,3; HALT
//! while !emu.halted() {
//!     emu.step();
//! }
//! assert_eq!(emu.read_reg(RegisterKind::A), 0x08);
//! ```

pub mod bus;
pub mod cpu;
pub mod memory;
pub mod ports;

mod emu;

pub use bus::{Bus, Fault};
pub use cpu::{Cpu, InterruptMode, RegisterKind, SnapshotError};
pub use emu::{Emu, StopReason, SNAPSHOT_SIZE};
pub use memory::{MemoryError, DEFAULT_ROM_SIZE, MEMORY_SIZE};
pub use ports::{InHandler, OutHandler, PortGateway};
