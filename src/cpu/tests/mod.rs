//! Z80 CPU tests
//!
//! Test suite for the Z80 CPU implementation, organized into:
//! - instructions.rs: Tests for individual instructions and instruction
//!   families, flag algebra, cycle counts, and R/PC bookkeeping
//! - programs.rs: Whole programs run to HALT, covering the end-to-end
//!   behavior of the fetch-decode-execute loop and the interrupt and
//!   block-instruction state machines
//!
//! # References
//! - Z80 CPU User Manual (Zilog UM0080)

use super::*;
use crate::bus::Bus;


// ========== Test Helpers ==========

/// Bus with no ROM partition so test programs may write anywhere
fn ram_bus() -> Bus {
    Bus::new(0)
}

/// Load a program at address 0 into an all-RAM bus with a fresh CPU
fn setup(program: &[u8]) -> (Cpu, Bus) {
    let mut bus = ram_bus();
    bus.load_ram(0, program).unwrap();
    (Cpu::new(), bus)
}

/// Step until the CPU halts, returning total cycles (including the HALT)
fn run_to_halt(cpu: &mut Cpu, bus: &mut Bus) -> u32 {
    let mut cycles = 0;
    for _ in 0..100_000 {
        cycles += cpu.step(bus);
        if cpu.halted {
            return cycles;
        }
    }
    panic!("program did not reach HALT");
}

/// Assert the full flag byte with a readable per-bit breakdown
fn assert_flags(cpu: &Cpu, expected: u8, context: &str) {
    assert_eq!(
        cpu.f, expected,
        "{}: flags mismatch. Expected {:08b}, got {:08b} (S={} Z={} Y={} H={} X={} PV={} N={} C={})",
        context,
        expected,
        cpu.f,
        u8::from(cpu.flag_s()),
        u8::from(cpu.flag_z()),
        u8::from(cpu.f & flags::Y != 0),
        u8::from(cpu.flag_h()),
        u8::from(cpu.f & flags::X != 0),
        u8::from(cpu.flag_pv()),
        u8::from(cpu.flag_n()),
        u8::from(cpu.flag_c()),
    );
}
