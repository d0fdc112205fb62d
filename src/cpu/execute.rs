//! Z80 CPU instruction execution
//!
//! This module contains all instruction execution functions for the Z80
//! CPU including:
//! - execute_x0: Base instruction decoding (x=0 category)
//! - execute_alu: ALU operations (ADD, ADC, SUB, SBC, AND, XOR, OR, CP)
//! - execute_x3: Control flow and I/O instructions (x=3 category)
//! - execute_cb: CB prefix instructions (rotate, shift, bit operations)
//! - execute_rot: Rotate/shift operation implementation
//! - execute_ed: ED prefix instructions (extended operations)
//! - execute_bli: Block instructions (LDI/LDIR, CPI/CPIR, INI/INIR,
//!   OUTI/OTIR and the decrementing variants)
//! - execute_index: DD/FD prefix instructions (IX/IY indexed operations)
//! - execute_index_cb: DDCB/FDCB bit operations on indexed memory
//!
//! Every function returns the T-state count of the executed instruction;
//! conditional instructions return the taken or not-taken count for the
//! path actually executed. Repeating block instructions execute a single
//! iteration and rewind PC by two so the next `step` re-enters them.
//!
//! # References
//! - Z80 CPU User Manual (Zilog UM0080)

use super::flags;
use super::Cpu;
use super::InterruptMode;
use crate::bus::Bus;

impl Cpu {
    /// Execute x=0 opcodes
    pub(super) fn execute_x0(&mut self, bus: &mut Bus, y: u8, z: u8, p: u8, q: u8) -> u32 {
        match z {
            0 => {
                match y {
                    0 => 4, // NOP
                    1 => {
                        // EX AF,AF'
                        self.ex_af();
                        4
                    }
                    2 => {
                        // DJNZ d
                        let d = self.fetch_byte(bus) as i8;
                        self.set_b(self.b().wrapping_sub(1));
                        if self.b() != 0 {
                            self.pc = self.pc.wrapping_add(d as u16);
                            13
                        } else {
                            8
                        }
                    }
                    3 => {
                        // JR d (unconditional)
                        let d = self.fetch_byte(bus) as i8;
                        self.pc = self.pc.wrapping_add(d as u16);
                        12
                    }
                    4..=7 => {
                        // JR cc,d
                        let d = self.fetch_byte(bus) as i8;
                        if self.check_cc(y - 4) {
                            self.pc = self.pc.wrapping_add(d as u16);
                            12
                        } else {
                            7
                        }
                    }
                    _ => 4,
                }
            }
            1 => {
                if q == 0 {
                    // LD rp,nn
                    let nn = self.fetch_word(bus);
                    self.set_rp(p, nn);
                    10
                } else {
                    // ADD HL,rp
                    let rp = self.get_rp(p);
                    self.hl = self.alu_add16(self.hl, rp);
                    11
                }
            }
            2 => {
                match (p, q) {
                    (0, 0) => {
                        // LD (BC),A
                        bus.write_byte(self.bc, self.a);
                        7
                    }
                    (1, 0) => {
                        // LD (DE),A
                        bus.write_byte(self.de, self.a);
                        7
                    }
                    (2, 0) => {
                        // LD (nn),HL
                        let nn = self.fetch_word(bus);
                        bus.write_word(nn, self.hl);
                        16
                    }
                    (3, 0) => {
                        // LD (nn),A
                        let nn = self.fetch_word(bus);
                        bus.write_byte(nn, self.a);
                        13
                    }
                    (0, 1) => {
                        // LD A,(BC)
                        self.a = bus.read_byte(self.bc);
                        7
                    }
                    (1, 1) => {
                        // LD A,(DE)
                        self.a = bus.read_byte(self.de);
                        7
                    }
                    (2, 1) => {
                        // LD HL,(nn)
                        let nn = self.fetch_word(bus);
                        self.hl = bus.read_word(nn);
                        16
                    }
                    (3, 1) => {
                        // LD A,(nn)
                        let nn = self.fetch_word(bus);
                        self.a = bus.read_byte(nn);
                        13
                    }
                    _ => {
                        // p and q span all eight combinations above
                        bus.record_anomaly(self.pc.wrapping_sub(1), 0x02 | (p << 4) | (q << 3));
                        4
                    }
                }
            }
            3 => {
                if q == 0 {
                    // INC rp
                    let rp = self.get_rp(p).wrapping_add(1);
                    self.set_rp(p, rp);
                    6
                } else {
                    // DEC rp
                    let rp = self.get_rp(p).wrapping_sub(1);
                    self.set_rp(p, rp);
                    6
                }
            }
            4 => {
                // INC r
                let val = self.get_reg8(y, bus);
                let result = self.alu_inc(val);
                self.set_reg8(y, result, bus);
                if y == 6 {
                    11
                } else {
                    4
                }
            }
            5 => {
                // DEC r
                let val = self.get_reg8(y, bus);
                let result = self.alu_dec(val);
                self.set_reg8(y, result, bus);
                if y == 6 {
                    11
                } else {
                    4
                }
            }
            6 => {
                // LD r,n
                let n = self.fetch_byte(bus);
                self.set_reg8(y, n, bus);
                if y == 6 {
                    10
                } else {
                    7
                }
            }
            7 => {
                match y {
                    0 => {
                        // RLCA
                        let c = (self.a >> 7) & 1;
                        self.a = (self.a << 1) | c;
                        self.set_flag_c(c != 0);
                        self.set_flag_h(false);
                        self.set_flag_n(false);
                        self.copy_xy_from(self.a);
                        4
                    }
                    1 => {
                        // RRCA
                        let c = self.a & 1;
                        self.a = (self.a >> 1) | (c << 7);
                        self.set_flag_c(c != 0);
                        self.set_flag_h(false);
                        self.set_flag_n(false);
                        self.copy_xy_from(self.a);
                        4
                    }
                    2 => {
                        // RLA
                        let old_c = u8::from(self.flag_c());
                        let new_c = (self.a >> 7) & 1;
                        self.a = (self.a << 1) | old_c;
                        self.set_flag_c(new_c != 0);
                        self.set_flag_h(false);
                        self.set_flag_n(false);
                        self.copy_xy_from(self.a);
                        4
                    }
                    3 => {
                        // RRA
                        let old_c = if self.flag_c() { 0x80 } else { 0 };
                        let new_c = self.a & 1;
                        self.a = (self.a >> 1) | old_c;
                        self.set_flag_c(new_c != 0);
                        self.set_flag_h(false);
                        self.set_flag_n(false);
                        self.copy_xy_from(self.a);
                        4
                    }
                    4 => {
                        // DAA - Decimal Adjust Accumulator
                        let mut correction: u8 = 0;
                        let mut set_carry = false;
                        let old_a = self.a;
                        let old_h = self.flag_h();

                        if old_h || (!self.flag_n() && (old_a & 0x0F) > 9) {
                            correction |= 0x06;
                        }

                        if self.flag_c() || (!self.flag_n() && old_a > 0x99) {
                            correction |= 0x60;
                            set_carry = true;
                        }

                        if self.flag_n() {
                            self.a = self.a.wrapping_sub(correction);
                            // After SUB: H set if the correction half-borrowed
                            self.set_flag_h(old_h && (old_a & 0x0F) < 6);
                        } else {
                            self.a = self.a.wrapping_add(correction);
                            // After ADD: H set if the lower nibble carried
                            self.set_flag_h((old_a & 0x0F) + (correction & 0x0F) > 0x0F);
                        }

                        self.set_szxy_flags(self.a);
                        self.set_flag_pv(Self::parity(self.a));
                        if set_carry {
                            self.set_flag_c(true);
                        }
                        4
                    }
                    5 => {
                        // CPL
                        self.a = !self.a;
                        self.set_flag_h(true);
                        self.set_flag_n(true);
                        self.copy_xy_from(self.a);
                        4
                    }
                    6 => {
                        // SCF
                        self.set_flag_c(true);
                        self.set_flag_h(false);
                        self.set_flag_n(false);
                        4
                    }
                    7 => {
                        // CCF - old carry moves into H
                        let old_c = self.flag_c();
                        self.set_flag_h(old_c);
                        self.set_flag_c(!old_c);
                        self.set_flag_n(false);
                        4
                    }
                    _ => 4,
                }
            }
            _ => 4,
        }
    }

    /// Copy bits 3 and 5 of a result into the undocumented X/Y flags
    #[inline]
    fn copy_xy_from(&mut self, result: u8) {
        self.f = (self.f & !(flags::Y | flags::X)) | (result & (flags::Y | flags::X));
    }

    /// Execute ALU operation (x=2)
    pub(super) fn execute_alu(&mut self, y: u8, val: u8) {
        match y {
            0 => self.a = self.alu_add(val, false), // ADD
            1 => self.a = self.alu_add(val, true),  // ADC
            2 => self.a = self.alu_sub(val, false), // SUB
            3 => self.a = self.alu_sub(val, true),  // SBC
            4 => self.alu_and(val),                 // AND
            5 => self.alu_xor(val),                 // XOR
            6 => self.alu_or(val),                  // OR
            7 => {
                // CP - flags only, A unchanged
                self.alu_sub(val, false);
            }
            _ => {}
        }
    }

    /// Execute x=3 opcodes
    pub(super) fn execute_x3(&mut self, bus: &mut Bus, y: u8, z: u8, p: u8, q: u8) -> u32 {
        match z {
            0 => {
                // RET cc
                if self.check_cc(y) {
                    self.pc = self.pop_word(bus);
                    11
                } else {
                    5
                }
            }
            1 => {
                if q == 0 {
                    // POP rp2
                    let val = self.pop_word(bus);
                    self.set_rp2(p, val);
                    10
                } else {
                    match p {
                        0 => {
                            // RET
                            self.pc = self.pop_word(bus);
                            10
                        }
                        1 => {
                            // EXX
                            self.exx();
                            4
                        }
                        2 => {
                            // JP (HL)
                            self.pc = self.hl;
                            4
                        }
                        3 => {
                            // LD SP,HL
                            self.sp = self.hl;
                            6
                        }
                        _ => 4,
                    }
                }
            }
            2 => {
                // JP cc,nn - the immediate is always consumed
                let nn = self.fetch_word(bus);
                if self.check_cc(y) {
                    self.pc = nn;
                }
                10
            }
            3 => {
                match y {
                    0 => {
                        // JP nn
                        self.pc = self.fetch_word(bus);
                        10
                    }
                    1 => {
                        // CB prefix (bit operations)
                        self.execute_cb(bus)
                    }
                    2 => {
                        // OUT (n),A - A drives the high address lines
                        let n = self.fetch_byte(bus);
                        let port = ((self.a as u16) << 8) | n as u16;
                        bus.port_write(port, self.a);
                        11
                    }
                    3 => {
                        // IN A,(n) - A drives the high address lines
                        let n = self.fetch_byte(bus);
                        let port = ((self.a as u16) << 8) | n as u16;
                        self.a = bus.port_read(port);
                        11
                    }
                    4 => {
                        // EX (SP),HL
                        let val = bus.read_word(self.sp);
                        bus.write_word(self.sp, self.hl);
                        self.hl = val;
                        19
                    }
                    5 => {
                        // EX DE,HL
                        self.ex_de_hl();
                        4
                    }
                    6 => {
                        // DI - both flip-flops clear immediately, and a
                        // still-pending EI delay is cancelled
                        self.iff1 = false;
                        self.iff2 = false;
                        self.ei_delay = 0;
                        4
                    }
                    7 => {
                        // EI - enable interrupts after the NEXT instruction.
                        // Set delay counter to 2:
                        // - This step: EI executes, ei_delay = 2
                        // - Next step: ei_delay decrements to 1, IFF1 still
                        //   clear, the instruction after EI runs in full
                        // - Following step: ei_delay reaches 0, IFF1 set,
                        //   interrupt check may fire before the fetch
                        self.ei_delay = 2;
                        4
                    }
                    _ => 4,
                }
            }
            4 => {
                // CALL cc,nn - the immediate is always consumed
                let nn = self.fetch_word(bus);
                if self.check_cc(y) {
                    self.push_word(bus, self.pc);
                    self.pc = nn;
                    17
                } else {
                    10
                }
            }
            5 => {
                if q == 0 {
                    // PUSH rp2
                    let val = self.get_rp2(p);
                    self.push_word(bus, val);
                    11
                } else {
                    match p {
                        0 => {
                            // CALL nn
                            let nn = self.fetch_word(bus);
                            self.push_word(bus, self.pc);
                            self.pc = nn;
                            17
                        }
                        1 => {
                            // DD prefix (IX instructions)
                            self.execute_index(bus, true)
                        }
                        2 => {
                            // ED prefix (extended instructions)
                            self.execute_ed(bus)
                        }
                        3 => {
                            // FD prefix (IY instructions)
                            self.execute_index(bus, false)
                        }
                        _ => 4,
                    }
                }
            }
            6 => {
                // ALU A,n
                let n = self.fetch_byte(bus);
                self.execute_alu(y, n);
                7
            }
            7 => {
                // RST y*8
                self.push_word(bus, self.pc);
                self.pc = (y as u16) * 8;
                11
            }
            _ => 4,
        }
    }

    // ========== CB Prefix (Bit Operations) ==========

    /// Execute CB-prefixed instruction (bit operations)
    pub(super) fn execute_cb(&mut self, bus: &mut Bus) -> u32 {
        let opcode = self.fetch_opcode(bus);
        let x = (opcode >> 6) & 0x03;
        let y = (opcode >> 3) & 0x07;
        let z = opcode & 0x07;

        let val = self.get_reg8(z, bus);

        match x {
            0 => {
                // Rotate/shift operations
                let result = self.execute_rot(y, val);
                self.set_reg8(z, result, bus);
                if z == 6 {
                    15
                } else {
                    8
                }
            }
            1 => {
                // BIT y, r[z] - test bit. Carry and the X/Y bits are left
                // as they were.
                let result = val & (1 << y);

                self.f &= flags::C | flags::Y | flags::X;
                self.set_flag_z(result == 0);
                self.set_flag_h(true);
                self.set_flag_n(false);
                self.set_flag_pv(result == 0); // PV mirrors Z for BIT
                if y == 7 && result != 0 {
                    self.f |= flags::S;
                }
                if z == 6 {
                    12
                } else {
                    8
                }
            }
            2 => {
                // RES y, r[z] - reset bit
                let result = val & !(1 << y);
                self.set_reg8(z, result, bus);
                if z == 6 {
                    15
                } else {
                    8
                }
            }
            3 => {
                // SET y, r[z] - set bit
                let result = val | (1 << y);
                self.set_reg8(z, result, bus);
                if z == 6 {
                    15
                } else {
                    8
                }
            }
            _ => 8,
        }
    }

    /// Execute rotate/shift operation (CB prefix, x=0).
    /// Unlike RLCA and friends, these recompute S, Z and parity.
    pub(super) fn execute_rot(&mut self, y: u8, val: u8) -> u8 {
        let result = match y {
            0 => {
                // RLC - rotate left circular
                let c = (val >> 7) & 1;
                self.set_flag_c(c != 0);
                (val << 1) | c
            }
            1 => {
                // RRC - rotate right circular
                let c = val & 1;
                self.set_flag_c(c != 0);
                (val >> 1) | (c << 7)
            }
            2 => {
                // RL - rotate left through carry
                let old_c = u8::from(self.flag_c());
                self.set_flag_c((val >> 7) & 1 != 0);
                (val << 1) | old_c
            }
            3 => {
                // RR - rotate right through carry
                let old_c = if self.flag_c() { 0x80 } else { 0 };
                self.set_flag_c(val & 1 != 0);
                (val >> 1) | old_c
            }
            4 => {
                // SLA - shift left arithmetic
                self.set_flag_c((val >> 7) & 1 != 0);
                val << 1
            }
            5 => {
                // SRA - shift right arithmetic (preserve sign)
                self.set_flag_c(val & 1 != 0);
                (val >> 1) | (val & 0x80)
            }
            6 => {
                // SLL - shift left logical (undocumented, sets bit 0)
                self.set_flag_c((val >> 7) & 1 != 0);
                (val << 1) | 1
            }
            7 => {
                // SRL - shift right logical
                self.set_flag_c(val & 1 != 0);
                val >> 1
            }
            _ => val,
        };

        self.set_flag_h(false);
        self.set_flag_n(false);
        self.set_szxy_flags(result);
        self.set_flag_pv(Self::parity(result));

        result
    }

    // ========== ED Prefix (Extended Instructions) ==========

    /// Execute ED-prefixed instruction
    pub(super) fn execute_ed(&mut self, bus: &mut Bus) -> u32 {
        let opcode = self.fetch_opcode(bus);
        let x = (opcode >> 6) & 0x03;
        let y = (opcode >> 3) & 0x07;
        let z = opcode & 0x07;
        let p = (y >> 1) & 0x03;
        let q = y & 0x01;

        match x {
            0 => {
                // ED 00-3F: NONI rows, except the TST extension
                if z == 4 {
                    // TST A,r - test register against A without storing
                    let val = self.get_reg8(y, bus);
                    let result = self.a & val;
                    self.f = 0;
                    self.set_szxy_flags(result);
                    self.set_flag_h(true);
                    self.set_flag_pv(Self::parity(result));
                    8
                } else {
                    8
                }
            }
            1 => self.execute_ed_x1(bus, y, z, p, q),
            2 => {
                // Block instructions occupy y >= 4, z <= 3
                if y >= 4 && z <= 3 {
                    self.execute_bli(bus, y, z)
                } else {
                    8 // NONI
                }
            }
            _ => 8, // x=3 is NONI (no operation, no interrupt)
        }
    }

    /// Execute ED prefix x=1 opcodes
    pub(super) fn execute_ed_x1(&mut self, bus: &mut Bus, y: u8, z: u8, p: u8, q: u8) -> u32 {
        match z {
            0 => {
                // IN r,(C) - read from I/O port BC; y=6 is IN (C),
                // which only sets the flags
                let port = self.bc;
                let val = bus.port_read(port);
                if y != 6 {
                    self.set_reg8(y, val, bus);
                }
                self.set_szxy_flags(val);
                self.set_flag_h(false);
                self.set_flag_n(false);
                self.set_flag_pv(Self::parity(val));
                12
            }
            1 => {
                // OUT (C),r - write to I/O port BC; y=6 is the
                // undocumented OUT (C),0
                let port = self.bc;
                let val = if y == 6 { 0 } else { self.get_reg8(y, bus) };
                bus.port_write(port, val);
                12
            }
            2 => {
                if q == 0 {
                    // SBC HL,rp
                    let hl = self.hl;
                    let rp = self.get_rp(p);
                    let c = u32::from(self.flag_c());
                    let result = (hl as u32).wrapping_sub(rp as u32).wrapping_sub(c);

                    let half = (hl & 0x0FFF) < (rp & 0x0FFF) + c as u16;
                    let overflow =
                        ((hl ^ rp) & 0x8000 != 0) && ((hl ^ result as u16) & 0x8000 != 0);

                    self.hl = result as u16;

                    self.f = 0;
                    self.set_flag_s(self.hl & 0x8000 != 0);
                    self.set_flag_z(self.hl == 0);
                    self.set_flag_h(half);
                    self.set_flag_pv(overflow);
                    self.set_flag_n(true);
                    self.set_flag_c((hl as u32) < rp as u32 + c);
                    self.copy_xy_from((self.hl >> 8) as u8);
                    15
                } else {
                    // ADC HL,rp
                    let hl = self.hl;
                    let rp = self.get_rp(p);
                    let c = u32::from(self.flag_c());
                    let result = hl as u32 + rp as u32 + c;

                    let half = (hl & 0x0FFF) + (rp & 0x0FFF) + c as u16 > 0x0FFF;
                    let overflow =
                        ((hl ^ rp) & 0x8000 == 0) && ((hl ^ result as u16) & 0x8000 != 0);

                    self.hl = result as u16;

                    self.f = 0;
                    self.set_flag_s(self.hl & 0x8000 != 0);
                    self.set_flag_z(self.hl == 0);
                    self.set_flag_h(half);
                    self.set_flag_pv(overflow);
                    self.set_flag_c(result > 0xFFFF);
                    self.copy_xy_from((self.hl >> 8) as u8);
                    15
                }
            }
            3 => {
                // LD (nn),rp / LD rp,(nn)
                let nn = self.fetch_word(bus);
                if q == 0 {
                    bus.write_word(nn, self.get_rp(p));
                } else {
                    let val = bus.read_word(nn);
                    self.set_rp(p, val);
                }
                20
            }
            4 => {
                if q == 0 {
                    match p {
                        0 => {
                            // NEG
                            let old_a = self.a;
                            self.a = 0u8.wrapping_sub(old_a);

                            self.f = 0;
                            self.set_szxy_flags(self.a);
                            self.set_flag_h(old_a & 0x0F != 0);
                            self.set_flag_pv(old_a == 0x80);
                            self.set_flag_n(true);
                            self.set_flag_c(old_a != 0);
                            8
                        }
                        2 => {
                            // TST A,n
                            let n = self.fetch_byte(bus);
                            let result = self.a & n;
                            self.f = 0;
                            self.set_szxy_flags(result);
                            self.set_flag_h(true);
                            self.set_flag_pv(Self::parity(result));
                            8
                        }
                        3 => {
                            // TSTIO n - test port (C) against immediate
                            let n = self.fetch_byte(bus);
                            let port_val = bus.port_read(self.c() as u16);
                            let result = port_val & n;
                            self.f = 0;
                            self.set_szxy_flags(result);
                            self.set_flag_h(true);
                            self.set_flag_pv(Self::parity(result));
                            12
                        }
                        _ => 8,
                    }
                } else {
                    // MLT rp - multiply the pair's high byte by its low byte
                    let rp = self.get_rp(p);
                    let result = (rp >> 8) * (rp & 0xFF);
                    self.set_rp(p, result);
                    8
                }
            }
            5 => {
                // RETN (y=0 and the undocumented aliases) / RETI (y=1).
                // Both restore IFF1 from IFF2; RETI additionally signals
                // the acknowledging device on real hardware, which has no
                // observable effect inside the core.
                self.iff1 = self.iff2;
                self.pc = self.pop_word(bus);
                14
            }
            6 => {
                // IM - documented rows 46/56/5E plus their aliases
                self.im = match y & 0x03 {
                    2 => InterruptMode::Mode1,
                    3 => InterruptMode::Mode2,
                    _ => InterruptMode::Mode0,
                };
                8
            }
            7 => {
                match y {
                    0 => {
                        // LD I,A
                        self.i = self.a;
                        9
                    }
                    1 => {
                        // LD R,A
                        self.r = self.a;
                        9
                    }
                    2 => {
                        // LD A,I - P/V reflects IFF2, carry untouched
                        self.a = self.i;
                        self.set_szxy_flags(self.a);
                        self.set_flag_h(false);
                        self.set_flag_n(false);
                        self.set_flag_pv(self.iff2);
                        9
                    }
                    3 => {
                        // LD A,R - P/V reflects IFF2, carry untouched
                        self.a = self.r;
                        self.set_szxy_flags(self.a);
                        self.set_flag_h(false);
                        self.set_flag_n(false);
                        self.set_flag_pv(self.iff2);
                        9
                    }
                    4 => {
                        // RRD - rotate BCD digits right through A and (HL)
                        let mem = bus.read_byte(self.hl);
                        let new_mem = (self.a << 4) | (mem >> 4);
                        self.a = (self.a & 0xF0) | (mem & 0x0F);
                        bus.write_byte(self.hl, new_mem);

                        self.set_szxy_flags(self.a);
                        self.set_flag_h(false);
                        self.set_flag_n(false);
                        self.set_flag_pv(Self::parity(self.a));
                        18
                    }
                    5 => {
                        // RLD - rotate BCD digits left through A and (HL)
                        let mem = bus.read_byte(self.hl);
                        let new_mem = (mem << 4) | (self.a & 0x0F);
                        self.a = (self.a & 0xF0) | (mem >> 4);
                        bus.write_byte(self.hl, new_mem);

                        self.set_szxy_flags(self.a);
                        self.set_flag_h(false);
                        self.set_flag_n(false);
                        self.set_flag_pv(Self::parity(self.a));
                        18
                    }
                    _ => 8, // NONI for 6,7
                }
            }
            _ => 8,
        }
    }

    // ========== Block Instructions (ED prefix, x=2) ==========

    /// Execute block instructions. z selects the family (0 = load,
    /// 1 = compare, 2 = port input, 3 = port output); y selects the
    /// direction (4/6 increment, 5/7 decrement) and whether the
    /// instruction repeats (6/7).
    ///
    /// Repeating forms execute one iteration per `step` and rewind PC by
    /// two while their repeat condition holds, so interrupts are serviced
    /// between iterations exactly as on hardware.
    pub(super) fn execute_bli(&mut self, bus: &mut Bus, y: u8, z: u8) -> u32 {
        let delta: u16 = if y & 1 == 0 { 1 } else { 0xFFFF };
        let repeat = y >= 6;

        match z {
            0 => self.block_load(bus, delta, repeat),
            1 => self.block_compare(bus, delta, repeat),
            2 => self.block_input(bus, delta, repeat),
            3 => self.block_output(bus, delta, repeat),
            _ => 8,
        }
    }

    /// LDI/LDD/LDIR/LDDR - copy (HL) to (DE), step both, count down BC
    fn block_load(&mut self, bus: &mut Bus, delta: u16, repeat: bool) -> u32 {
        let val = bus.read_byte(self.hl);
        bus.write_byte(self.de, val);
        self.hl = self.hl.wrapping_add(delta);
        self.de = self.de.wrapping_add(delta);
        self.bc = self.bc.wrapping_sub(1);

        self.set_flag_h(false);
        self.set_flag_n(false);
        self.set_flag_pv(self.bc != 0);
        // X/Y come from A + the transferred byte (bits 3 and 1)
        let n = self.a.wrapping_add(val);
        self.f = (self.f & !(flags::Y | flags::X)) | ((n & 0x02) << 4) | (n & 0x08);

        if repeat && self.bc != 0 {
            self.pc = self.pc.wrapping_sub(2);
            21
        } else {
            16
        }
    }

    /// CPI/CPD/CPIR/CPDR - compare A with (HL), step HL, count down BC.
    /// Repeating forms stop on a match (Z set) as well as on BC = 0.
    fn block_compare(&mut self, bus: &mut Bus, delta: u16, repeat: bool) -> u32 {
        let val = bus.read_byte(self.hl);
        let result = self.a.wrapping_sub(val);
        self.hl = self.hl.wrapping_add(delta);
        self.bc = self.bc.wrapping_sub(1);

        let half = (self.a & 0x0F) < (val & 0x0F);
        self.set_szxy_flags(result);
        self.set_flag_h(half);
        self.set_flag_n(true);
        self.set_flag_pv(self.bc != 0);
        // X/Y come from A - (HL) - H (bits 3 and 1)
        let n = result.wrapping_sub(u8::from(half));
        self.f = (self.f & !(flags::Y | flags::X)) | ((n & 0x02) << 4) | (n & 0x08);

        if repeat && self.bc != 0 && result != 0 {
            self.pc = self.pc.wrapping_sub(2);
            21
        } else {
            16
        }
    }

    /// INI/IND/INIR/INDR - read port (B on the high lines, C low) into
    /// (HL), step HL, decrement B
    fn block_input(&mut self, bus: &mut Bus, delta: u16, repeat: bool) -> u32 {
        let val = bus.port_read(self.bc);
        bus.write_byte(self.hl, val);
        self.hl = self.hl.wrapping_add(delta);
        let b = self.b().wrapping_sub(1);
        self.set_b(b);

        self.set_szxy_flags(b);
        self.set_flag_n(val & 0x80 != 0);
        let k = val as u16 + (self.c().wrapping_add(delta as u8) as u16);
        self.set_flag_h(k > 0xFF);
        self.set_flag_c(k > 0xFF);
        self.set_flag_pv(Self::parity((k as u8 & 0x07) ^ b));

        if repeat && b != 0 {
            self.pc = self.pc.wrapping_sub(2);
            21
        } else {
            16
        }
    }

    /// OUTI/OUTD/OTIR/OTDR - write (HL) to port (decremented B on the
    /// high lines, C low), step HL
    fn block_output(&mut self, bus: &mut Bus, delta: u16, repeat: bool) -> u32 {
        let val = bus.read_byte(self.hl);
        let b = self.b().wrapping_sub(1);
        self.set_b(b);
        bus.port_write(self.bc, val);
        self.hl = self.hl.wrapping_add(delta);

        self.set_szxy_flags(b);
        self.set_flag_n(val & 0x80 != 0);
        let k = val as u16 + self.l() as u16;
        self.set_flag_h(k > 0xFF);
        self.set_flag_c(k > 0xFF);
        self.set_flag_pv(Self::parity((k as u8 & 0x07) ^ b));

        if repeat && b != 0 {
            self.pc = self.pc.wrapping_sub(2);
            21
        } else {
            16
        }
    }

    // ========== DD/FD Prefix (IX/IY Instructions) ==========

    /// Fetch the displacement byte and form the indexed address
    #[inline]
    fn index_addr(&mut self, bus: &mut Bus, use_ix: bool) -> u16 {
        let d = self.fetch_byte(bus) as i8;
        let base = if use_ix { self.ix } else { self.iy };
        base.wrapping_add(d as u16)
    }

    /// Execute DD/FD prefixed instruction (IX/IY indexed).
    /// `use_ix`: true for DD (IX), false for FD (IY).
    pub(super) fn execute_index(&mut self, bus: &mut Bus, use_ix: bool) -> u32 {
        let opcode = self.fetch_opcode(bus);

        // DD CB / FD CB: bit operations on indexed memory
        if opcode == 0xCB {
            return self.execute_index_cb(bus, use_ix);
        }

        // DD ED / FD ED: the ED page ignores the index prefix
        if opcode == 0xED {
            return self.execute_ed(bus);
        }

        // Prefix chains: each extra prefix costs four T-states and the
        // last one wins
        if opcode == 0xDD {
            return 4 + self.execute_index(bus, true);
        }
        if opcode == 0xFD {
            return 4 + self.execute_index(bus, false);
        }

        let x = (opcode >> 6) & 0x03;
        let y = (opcode >> 3) & 0x07;
        let z = opcode & 0x07;
        let p = (y >> 1) & 0x03;
        let q = y & 0x01;

        match x {
            0 => self.execute_index_x0(bus, y, z, p, q, use_ix),
            1 => {
                if y == 6 && z == 6 {
                    // HALT - the prefix changes nothing but the timing
                    self.halted = true;
                    8
                } else if y == 6 {
                    // LD (IX+d),r - the source register is NOT substituted
                    let src = self.get_reg8(z, bus);
                    let addr = self.index_addr(bus, use_ix);
                    bus.write_byte(addr, src);
                    19
                } else if z == 6 {
                    // LD r,(IX+d) - the destination register is NOT
                    // substituted
                    let addr = self.index_addr(bus, use_ix);
                    let val = bus.read_byte(addr);
                    self.set_reg8(y, val, bus);
                    19
                } else {
                    // LD r,r' with H/L -> IXH/IXL substitution
                    let src = self.get_index_reg8(z, bus, use_ix);
                    self.set_index_reg8(y, src, bus, use_ix);
                    8
                }
            }
            2 => {
                // ALU A,r with indexed addressing
                let val = self.get_index_reg8(z, bus, use_ix);
                self.execute_alu(y, val);
                if z == 6 {
                    19
                } else {
                    8
                }
            }
            3 => self.execute_index_x3(bus, y, z, p, q, use_ix),
            _ => 8,
        }
    }

    /// Get 8-bit register with IX/IY substitution
    /// (4=IXH/IYH, 5=IXL/IYL, 6=(IX+d)/(IY+d))
    pub(super) fn get_index_reg8(&mut self, idx: u8, bus: &mut Bus, use_ix: bool) -> u8 {
        match idx {
            0 => self.b(),
            1 => self.c(),
            2 => self.d(),
            3 => self.e(),
            4 => {
                if use_ix {
                    self.ixh()
                } else {
                    self.iyh()
                }
            }
            5 => {
                if use_ix {
                    self.ixl()
                } else {
                    self.iyl()
                }
            }
            6 => {
                let addr = self.index_addr(bus, use_ix);
                bus.read_byte(addr)
            }
            7 => self.a,
            _ => 0,
        }
    }

    /// Set 8-bit register with IX/IY substitution
    pub(super) fn set_index_reg8(&mut self, idx: u8, val: u8, bus: &mut Bus, use_ix: bool) {
        match idx {
            0 => self.set_b(val),
            1 => self.set_c(val),
            2 => self.set_d(val),
            3 => self.set_e(val),
            4 => {
                if use_ix {
                    self.set_ixh(val)
                } else {
                    self.set_iyh(val)
                }
            }
            5 => {
                if use_ix {
                    self.set_ixl(val)
                } else {
                    self.set_iyl(val)
                }
            }
            6 => {
                let addr = self.index_addr(bus, use_ix);
                bus.write_byte(addr, val);
            }
            7 => self.a = val,
            _ => {}
        }
    }

    /// Set 8-bit register without a displacement fetch (for the
    /// IXH/IXL/IYH/IYL forms whose operand is not memory)
    pub(super) fn set_index_reg8_no_disp(&mut self, idx: u8, val: u8, use_ix: bool) {
        match idx {
            0 => self.set_b(val),
            1 => self.set_c(val),
            2 => self.set_d(val),
            3 => self.set_e(val),
            4 => {
                if use_ix {
                    self.set_ixh(val)
                } else {
                    self.set_iyh(val)
                }
            }
            5 => {
                if use_ix {
                    self.set_ixl(val)
                } else {
                    self.set_iyl(val)
                }
            }
            7 => self.a = val,
            _ => {}
        }
    }

    /// Get register pair for indexed ADD: HL's slot is taken by the
    /// index register itself
    pub(super) fn get_index_rp(&self, p: u8, use_ix: bool) -> u16 {
        match p {
            0 => self.bc,
            1 => self.de,
            2 => {
                if use_ix {
                    self.ix
                } else {
                    self.iy
                }
            }
            3 => self.sp,
            _ => 0,
        }
    }

    /// Execute indexed x=0 opcodes
    pub(super) fn execute_index_x0(
        &mut self,
        bus: &mut Bus,
        y: u8,
        z: u8,
        p: u8,
        q: u8,
        use_ix: bool,
    ) -> u32 {
        match z {
            1 => {
                if q == 0 {
                    if p == 2 {
                        // LD IX,nn
                        let nn = self.fetch_word(bus);
                        if use_ix {
                            self.ix = nn;
                        } else {
                            self.iy = nn;
                        }
                        14
                    } else {
                        // LD rp,nn for BC/DE/SP - prefix only adds time
                        4 + self.execute_x0(bus, y, z, p, q)
                    }
                } else {
                    // ADD IX,rp (HL slot reads the index register)
                    let rp = self.get_index_rp(p, use_ix);
                    let base = if use_ix { self.ix } else { self.iy };
                    let result = self.alu_add16(base, rp);
                    if use_ix {
                        self.ix = result;
                    } else {
                        self.iy = result;
                    }
                    15
                }
            }
            2 => {
                match (p, q) {
                    (2, 0) => {
                        // LD (nn),IX
                        let nn = self.fetch_word(bus);
                        let val = if use_ix { self.ix } else { self.iy };
                        bus.write_word(nn, val);
                        20
                    }
                    (2, 1) => {
                        // LD IX,(nn)
                        let nn = self.fetch_word(bus);
                        let val = bus.read_word(nn);
                        if use_ix {
                            self.ix = val;
                        } else {
                            self.iy = val;
                        }
                        20
                    }
                    _ => 4 + self.execute_x0(bus, y, z, p, q),
                }
            }
            3 => {
                if p == 2 {
                    // INC/DEC IX
                    let delta: u16 = if q == 0 { 1 } else { 0xFFFF };
                    if use_ix {
                        self.ix = self.ix.wrapping_add(delta);
                    } else {
                        self.iy = self.iy.wrapping_add(delta);
                    }
                    10
                } else {
                    4 + self.execute_x0(bus, y, z, p, q)
                }
            }
            4 => {
                // INC r with indexed addressing
                if y == 6 {
                    // INC (IX+d) - one displacement fetch, read-modify-write
                    let addr = self.index_addr(bus, use_ix);
                    let val = bus.read_byte(addr);
                    let result = self.alu_inc(val);
                    bus.write_byte(addr, result);
                    23
                } else {
                    let val = self.get_index_reg8(y, bus, use_ix);
                    let result = self.alu_inc(val);
                    self.set_index_reg8_no_disp(y, result, use_ix);
                    8
                }
            }
            5 => {
                // DEC r with indexed addressing
                if y == 6 {
                    // DEC (IX+d) - one displacement fetch, read-modify-write
                    let addr = self.index_addr(bus, use_ix);
                    let val = bus.read_byte(addr);
                    let result = self.alu_dec(val);
                    bus.write_byte(addr, result);
                    23
                } else {
                    let val = self.get_index_reg8(y, bus, use_ix);
                    let result = self.alu_dec(val);
                    self.set_index_reg8_no_disp(y, result, use_ix);
                    8
                }
            }
            6 => {
                if y == 6 {
                    // LD (IX+d),n - displacement before the immediate
                    let addr = self.index_addr(bus, use_ix);
                    let n = self.fetch_byte(bus);
                    bus.write_byte(addr, n);
                    19
                } else {
                    // LD r,n with H/L -> IXH/IXL substitution
                    let n = self.fetch_byte(bus);
                    self.set_index_reg8_no_disp(y, n, use_ix);
                    11
                }
            }
            _ => {
                // z=0 and z=7 never touch HL; the prefix only adds time
                4 + self.execute_x0(bus, y, z, p, q)
            }
        }
    }

    /// Execute indexed x=3 opcodes
    pub(super) fn execute_index_x3(
        &mut self,
        bus: &mut Bus,
        y: u8,
        z: u8,
        p: u8,
        q: u8,
        use_ix: bool,
    ) -> u32 {
        match z {
            1 => {
                if q == 0 && p == 2 {
                    // POP IX
                    let val = self.pop_word(bus);
                    if use_ix {
                        self.ix = val;
                    } else {
                        self.iy = val;
                    }
                    14
                } else if q == 1 && p == 2 {
                    // JP (IX)
                    self.pc = if use_ix { self.ix } else { self.iy };
                    8
                } else if q == 1 && p == 3 {
                    // LD SP,IX
                    self.sp = if use_ix { self.ix } else { self.iy };
                    10
                } else {
                    4 + self.execute_x3(bus, y, z, p, q)
                }
            }
            3 => {
                if y == 4 {
                    // EX (SP),IX
                    let val = bus.read_word(self.sp);
                    let index_reg = if use_ix { self.ix } else { self.iy };
                    bus.write_word(self.sp, index_reg);
                    if use_ix {
                        self.ix = val;
                    } else {
                        self.iy = val;
                    }
                    23
                } else {
                    // JP nn, OUT (n),A, IN A,(n), EX DE,HL, DI, EI
                    // (CB is intercepted before decomposition)
                    4 + self.execute_x3(bus, y, z, p, q)
                }
            }
            5 => {
                if q == 0 && p == 2 {
                    // PUSH IX
                    let val = if use_ix { self.ix } else { self.iy };
                    self.push_word(bus, val);
                    15
                } else if q == 1 && p != 0 {
                    // DD/ED/FD opcode bytes are intercepted before
                    // decomposition; this row cannot be reached
                    bus.record_anomaly(self.pc.wrapping_sub(1), 0xC5 | (p << 4) | (q << 3));
                    8
                } else {
                    // PUSH BC/DE/AF, CALL nn
                    4 + self.execute_x3(bus, y, z, p, q)
                }
            }
            _ => {
                // RET cc, JP cc, CALL cc, ALU A,n, RST - the prefix only
                // adds time
                4 + self.execute_x3(bus, y, z, p, q)
            }
        }
    }

    /// Execute DD CB / FD CB prefixed instruction (bit operations on
    /// indexed memory). The displacement byte comes BEFORE the final
    /// opcode byte, and neither fetch is an M1 cycle.
    pub(super) fn execute_index_cb(&mut self, bus: &mut Bus, use_ix: bool) -> u32 {
        let addr = self.index_addr(bus, use_ix);
        let opcode = self.fetch_byte(bus);

        let x = (opcode >> 6) & 0x03;
        let y = (opcode >> 3) & 0x07;
        let z = opcode & 0x07;

        let val = bus.read_byte(addr);

        match x {
            0 => {
                // Rotate/shift on (IX+d); z != 6 also copies the result
                // into a register (undocumented)
                let result = self.execute_rot(y, val);
                bus.write_byte(addr, result);
                if z != 6 {
                    self.set_reg8(z, result, bus);
                }
                23
            }
            1 => {
                // BIT y,(IX+d) - every z encodes the same test
                let result = val & (1 << y);

                self.f &= flags::C | flags::Y | flags::X;
                self.set_flag_z(result == 0);
                self.set_flag_h(true);
                self.set_flag_n(false);
                self.set_flag_pv(result == 0);
                if y == 7 && result != 0 {
                    self.f |= flags::S;
                }
                20
            }
            2 => {
                // RES y,(IX+d), optionally copied to a register
                let result = val & !(1 << y);
                bus.write_byte(addr, result);
                if z != 6 {
                    self.set_reg8(z, result, bus);
                }
                23
            }
            3 => {
                // SET y,(IX+d), optionally copied to a register
                let result = val | (1 << y);
                bus.write_byte(addr, result);
                if z != 6 {
                    self.set_reg8(z, result, bus);
                }
                23
            }
            _ => 23,
        }
    }
}
