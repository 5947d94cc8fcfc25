//! Instruction dispatch and handlers.
//!
//! The dispatch keys on `(group << 4) | opCode` over a total match; every
//! undefined encoding raises `illegal-instr`. Handlers return
//! `Result<(), Trap>`: the trap value unwinds out of the instruction and is
//! recorded once, by the step loop. On success non-branch handlers advance
//! the PSR by four; branch handlers install the new IA themselves. On a trap
//! the PSR is left untouched.

use crate::common::bits::{
    add_adr_ofs32, deposit_field64, extract_bit64, extract_field64, extract_signed_field64,
    shift_right128, will_add_overflow, will_shift_left_overflow, will_sub_overflow,
};
use crate::common::error::Trap;
use crate::common::reg::{CR_IPSR, CR_SHAMT};
use crate::common::{Instr, Word};
use crate::core::{Processor, PSR_M_BIT, PSR_R_BIT, PSR_X_BIT};
use crate::isa::instruction::InstrBits;
use crate::isa::{grp, op_key, opc, DataWidth};
use crate::soc::System;

/// Compare and conditional-branch condition evaluation. EV and OD test the
/// low bit of the first value; the rest compare signed.
pub fn eval_cond(cond: u32, val1: Word, val2: Word) -> bool {
    match cond {
        0 => val1 == val2,
        1 => val1 < val2,
        2 => val1 > val2,
        3 => val1 & 1 == 0,
        4 => val1 != val2,
        5 => val1 <= val2,
        6 => val1 >= val2,
        7 => val1 & 1 != 0,
        _ => false,
    }
}

impl Processor {
    fn check_add_overflow(&self, a: Word, b: Word) -> Result<(), Trap> {
        if will_add_overflow(a, b) {
            Err(Trap::Overflow)
        } else {
            Ok(())
        }
    }

    fn check_sub_overflow(&self, a: Word, b: Word) -> Result<(), Trap> {
        if will_sub_overflow(a, b) {
            Err(Trap::Overflow)
        } else {
            Ok(())
        }
    }

    fn require_priv(&self) -> Result<(), Trap> {
        if self.is_priv() {
            Ok(())
        } else {
            Err(Trap::PrivOp)
        }
    }

    /// Shift amount for the bit-field instructions: the SHAMT control
    /// register when the instruction selects it, else an immediate field.
    fn shamt_or_field(&self, instr: Instr, sel_bit: u32, pos: u32, len: u32) -> u32 {
        if instr.bit(sel_bit) {
            (self.cregs.read(CR_SHAMT) & 0x3F) as u32
        } else {
            instr.field_u(pos, len)
        }
    }

    /// Loads the memory operand of a MEM-form instruction: offset form when
    /// opt bit 19 is clear, indexed form when set.
    fn mem_operand(&mut self, sys: &mut System, instr: Instr) -> Result<Word, Trap> {
        let base = self.reg_b(instr);
        let len = DataWidth::from_field(instr.dw()).len();
        let ofs = if instr.bit(19) {
            self.reg_a(instr) << instr.dw()
        } else {
            instr.imm13_scaled() as Word
        };
        self.data_read(sys, add_adr_ofs32(base, ofs), len, true, false)
    }

    /// Effective address of a load/store instruction.
    fn mem_ea(&self, instr: Instr) -> Word {
        let base = self.reg_b(instr);
        let ofs = if instr.bit(19) {
            self.reg_a(instr) << instr.dw()
        } else {
            instr.imm13_scaled() as Word
        };
        add_adr_ofs32(base, ofs)
    }

    /// Executes one decoded instruction.
    pub(crate) fn exec_instr(&mut self, sys: &mut System, instr: Instr) -> Result<(), Trap> {
        let key = instr.op_key();

        match key {
            k if k == op_key(grp::ALU, opc::ADD) => self.exec_alu_add(instr),
            k if k == op_key(grp::MEM, opc::ADD) => self.exec_mem_add(sys, instr),
            k if k == op_key(grp::ALU, opc::SUB) => self.exec_alu_sub(instr),
            k if k == op_key(grp::MEM, opc::SUB) => self.exec_mem_sub(sys, instr),
            k if k == op_key(grp::ALU, opc::AND) => self.exec_alu_logic(instr, LogicOp::And),
            k if k == op_key(grp::MEM, opc::AND) => self.exec_mem_logic(sys, instr, LogicOp::And),
            k if k == op_key(grp::ALU, opc::OR) => self.exec_alu_logic(instr, LogicOp::Or),
            k if k == op_key(grp::MEM, opc::OR) => self.exec_mem_logic(sys, instr, LogicOp::Or),
            k if k == op_key(grp::ALU, opc::XOR) => self.exec_alu_logic(instr, LogicOp::Xor),
            k if k == op_key(grp::MEM, opc::XOR) => self.exec_mem_logic(sys, instr, LogicOp::Xor),
            k if k == op_key(grp::ALU, opc::CMP_A) || k == op_key(grp::ALU, opc::CMP_B) => {
                self.exec_alu_cmp(instr)
            }
            k if k == op_key(grp::MEM, opc::CMP_A) || k == op_key(grp::MEM, opc::CMP_B) => {
                self.exec_mem_cmp(sys, instr)
            }
            k if k == op_key(grp::ALU, opc::BITOP) => self.exec_bitop(instr),
            k if k == op_key(grp::ALU, opc::SHAOP) => self.exec_shaop(instr),
            k if k == op_key(grp::ALU, opc::IMMOP) => self.exec_immop(instr),
            k if k == op_key(grp::ALU, opc::LDO) => self.exec_ldo(instr),
            k if k == op_key(grp::ALU, opc::NOP) => {
                self.next_instr();
                Ok(())
            }

            k if k == op_key(grp::MEM, opc::LD) => self.exec_ld(sys, instr),
            k if k == op_key(grp::MEM, opc::ST) => self.exec_st(sys, instr),
            k if k == op_key(grp::MEM, opc::LDR) => self.exec_ldr(sys, instr),
            k if k == op_key(grp::MEM, opc::STC) => self.exec_stc(sys, instr),

            k if k == op_key(grp::BR, opc::B) => self.exec_b(instr),
            k if k == op_key(grp::BR, opc::BE) => self.exec_be(instr),
            k if k == op_key(grp::BR, opc::BR) => self.exec_br(instr),
            k if k == op_key(grp::BR, opc::BV) => self.exec_bv(instr),
            k if k == op_key(grp::BR, opc::BB) => self.exec_bb(instr),
            k if k == op_key(grp::BR, opc::CBR) => self.exec_cbr(instr),
            k if k == op_key(grp::BR, opc::MBR) => self.exec_mbr(instr),
            k if k == op_key(grp::BR, opc::ABR) => self.exec_abr(instr),

            k if k == op_key(grp::SYS, opc::MR) => self.exec_mr(instr),
            k if k == op_key(grp::SYS, opc::LPA) => self.exec_lpa(instr),
            k if k == op_key(grp::SYS, opc::PRB) => self.exec_prb(instr),
            k if k == op_key(grp::SYS, opc::TLB) => self.exec_tlb(instr),
            k if k == op_key(grp::SYS, opc::CA) => self.exec_ca(sys, instr),
            k if k == op_key(grp::SYS, opc::MST) => self.exec_mst(instr),
            k if k == op_key(grp::SYS, opc::RFI) => self.exec_rfi(instr),
            k if k == op_key(grp::SYS, opc::DIAG) => self.exec_diag(instr),
            k if k == op_key(grp::SYS, opc::TRAP) => self.exec_trap_op(instr),

            _ => Err(Trap::IllegalInstr(instr)),
        }
    }

    // ALU and MEM arithmetic.

    fn exec_alu_add(&mut self, instr: Instr) -> Result<(), Trap> {
        let val1 = self.reg_b(instr);
        let val2 = match instr.opt1() {
            0 => self.reg_a(instr),
            1 => instr.imm15() as Word,
            _ => return Err(Trap::IllegalInstr(instr)),
        };
        self.check_add_overflow(val1, val2)?;
        self.set_reg_r(instr, val1 + val2);
        self.next_instr();
        Ok(())
    }

    fn exec_mem_add(&mut self, sys: &mut System, instr: Instr) -> Result<(), Trap> {
        let val1 = self.reg_r(instr);
        let val2 = self.mem_operand(sys, instr)?;
        self.check_add_overflow(val1, val2)?;
        self.set_reg_r(instr, val1 + val2);
        self.next_instr();
        Ok(())
    }

    fn exec_alu_sub(&mut self, instr: Instr) -> Result<(), Trap> {
        let val1 = self.reg_b(instr);
        let val2 = match instr.opt1() {
            0 => self.reg_a(instr),
            1 => instr.imm15() as Word,
            _ => return Err(Trap::IllegalInstr(instr)),
        };
        self.check_sub_overflow(val1, val2)?;
        self.set_reg_r(instr, val1 - val2);
        self.next_instr();
        Ok(())
    }

    fn exec_mem_sub(&mut self, sys: &mut System, instr: Instr) -> Result<(), Trap> {
        let val1 = self.reg_r(instr);
        let val2 = self.mem_operand(sys, instr)?;
        self.check_sub_overflow(val1, val2)?;
        self.set_reg_r(instr, val1 - val2);
        self.next_instr();
        Ok(())
    }

    // Logical operations with input/output complement options.

    fn apply_logic(
        &mut self,
        instr: Instr,
        op: LogicOp,
        val1: Word,
        val2: Word,
    ) -> Result<(), Trap> {
        let mut lhs = val1;
        if instr.bit(20) {
            // Input complement; XOR forbids it.
            if op == LogicOp::Xor {
                return Err(Trap::IllegalInstr(instr));
            }
            lhs = !lhs;
        }
        let mut res = match op {
            LogicOp::And => lhs & val2,
            LogicOp::Or => lhs | val2,
            LogicOp::Xor => lhs ^ val2,
        };
        if instr.bit(21) {
            res = !res;
        }
        self.set_reg_r(instr, res);
        self.next_instr();
        Ok(())
    }

    fn exec_alu_logic(&mut self, instr: Instr, op: LogicOp) -> Result<(), Trap> {
        let val1 = self.reg_b(instr);
        let val2 = if instr.bit(19) {
            instr.imm15() as Word
        } else {
            self.reg_a(instr)
        };
        self.apply_logic(instr, op, val1, val2)
    }

    fn exec_mem_logic(&mut self, sys: &mut System, instr: Instr, op: LogicOp) -> Result<(), Trap> {
        let val1 = self.reg_b(instr);
        let val2 = self.mem_operand(sys, instr)?;
        self.apply_logic(instr, op, val1, val2)
    }

    // Compare.

    fn exec_alu_cmp(&mut self, instr: Instr) -> Result<(), Trap> {
        let val1 = self.reg_b(instr);
        let val2 = if instr.op_code() == opc::CMP_B {
            instr.imm15() as Word
        } else {
            self.reg_a(instr)
        };
        let res = eval_cond(instr.opt1(), val1, val2) as Word;
        self.set_reg_r(instr, res);
        self.next_instr();
        Ok(())
    }

    fn exec_mem_cmp(&mut self, sys: &mut System, instr: Instr) -> Result<(), Trap> {
        let val1 = self.reg_b(instr);
        let base = self.reg_b(instr);
        let len = DataWidth::from_field(instr.dw()).len();
        // CMP_A is the offset form, CMP_B the indexed form.
        let ofs = if instr.op_code() == opc::CMP_B {
            self.reg_a(instr) << instr.dw()
        } else {
            instr.imm13_scaled() as Word
        };
        let val2 = self.data_read(sys, add_adr_ofs32(base, ofs), len, true, false)?;
        let res = eval_cond(instr.opt1(), val1, val2) as Word;
        self.set_reg_r(instr, res);
        self.next_instr();
        Ok(())
    }

    // Bit-field operations.

    fn exec_bitop(&mut self, instr: Instr) -> Result<(), Trap> {
        match instr.opt1() {
            0 => {
                // EXTR
                let val = self.reg_b(instr);
                let len = instr.field_u(0, 6);
                let pos = self.shamt_or_field(instr, 13, 6, 6);
                let res = if instr.bit(12) {
                    extract_signed_field64(val, pos, len)
                } else {
                    extract_field64(val, pos, len)
                };
                self.set_reg_r(instr, res);
            }
            1 => {
                // DEP
                let len = instr.field_u(0, 6);
                let pos = self.shamt_or_field(instr, 13, 6, 6);
                let val1 = if instr.bit(12) { 0 } else { self.reg_r(instr) };
                let val2 = if instr.bit(14) {
                    instr.field_u(15, 4) as Word
                } else {
                    self.reg_b(instr)
                };
                self.set_reg_r(instr, deposit_field64(val1, pos, len, val2));
            }
            2 => {
                // DSR
                let hi = self.reg_b(instr);
                let lo = self.reg_a(instr);
                let shamt = self.shamt_or_field(instr, 13, 0, 6);
                self.set_reg_r(instr, shift_right128(hi, lo, shamt));
            }
            _ => return Err(Trap::IllegalInstr(instr)),
        }
        self.next_instr();
        Ok(())
    }

    // Shift and add.

    fn exec_shaop(&mut self, instr: Instr) -> Result<(), Trap> {
        let val1 = self.reg_b(instr);
        let opt = instr.opt1();
        let shamt = instr.dw();
        if shamt == 0 {
            return Err(Trap::IllegalInstr(instr));
        }

        let val2 = match opt {
            0 | 2 => self.reg_a(instr),
            1 | 3 => instr.imm13() as Word,
            _ => return Err(Trap::IllegalInstr(instr)),
        };

        let res = if opt < 2 {
            if will_shift_left_overflow(val1, shamt) {
                return Err(Trap::Overflow);
            }
            val1 << shamt
        } else {
            val1 >> shamt
        };

        self.check_add_overflow(res, val2)?;
        self.set_reg_r(instr, res + val2);
        self.next_instr();
        Ok(())
    }

    // Immediate operations.

    fn exec_immop(&mut self, instr: Instr) -> Result<(), Trap> {
        let val = instr.imm20() as Word;
        let res = match instr.field_u(20, 2) {
            0 => add_adr_ofs32(self.reg_r(instr), val << 12),
            1 => val << 12,
            2 => val << 32,
            _ => val << 52,
        };
        self.set_reg_r(instr, res);
        self.next_instr();
        Ok(())
    }

    fn exec_ldo(&mut self, instr: Instr) -> Result<(), Trap> {
        let base = self.reg_b(instr);
        let ofs = match instr.opt1() {
            0 => instr.imm13_scaled() as Word,
            1 => self.reg_a(instr) << instr.dw(),
            _ => return Err(Trap::IllegalInstr(instr)),
        };
        self.set_reg_r(instr, add_adr_ofs32(base, ofs));
        self.next_instr();
        Ok(())
    }

    // Loads and stores.

    fn exec_ld(&mut self, sys: &mut System, instr: Instr) -> Result<(), Trap> {
        // Bit 19 selects the indexed form, bit 20 the uncached option.
        if instr.bit(21) {
            return Err(Trap::IllegalInstr(instr));
        }
        let ea = self.mem_ea(instr);
        let len = DataWidth::from_field(instr.dw()).len();
        let uncached = instr.bit(20);
        let val = self.data_read(sys, ea, len, true, uncached)?;
        self.set_reg_r(instr, val);
        self.next_instr();
        Ok(())
    }

    fn exec_st(&mut self, sys: &mut System, instr: Instr) -> Result<(), Trap> {
        if instr.opt1() & !1 != 0 {
            return Err(Trap::IllegalInstr(instr));
        }
        let ea = self.mem_ea(instr);
        let len = DataWidth::from_field(instr.dw()).len();
        let val = self.reg_r(instr);
        self.data_write(sys, ea, val, len, false)?;
        self.next_instr();
        Ok(())
    }

    /// Load-reserved: a plain load that also records the line-aligned
    /// physical address of the access as the reservation.
    fn exec_ldr(&mut self, sys: &mut System, instr: Instr) -> Result<(), Trap> {
        // Only the uncached option (bit 20) is defined for LDR.
        if instr.bit(19) || instr.bit(21) {
            return Err(Trap::IllegalInstr(instr));
        }
        let ea = self.mem_ea(instr);
        let len = DataWidth::from_field(instr.dw()).len();
        let uncached = instr.bit(20);
        let p_adr = self.data_phys_adr(ea, len)?;
        let val = self.data_read(sys, ea, len, true, uncached)?;
        self.set_reg_r(instr, val);
        let line = self.d_cache.line_adr(p_adr);
        self.set_reservation(line);
        self.next_instr();
        Ok(())
    }

    /// Store-conditional: performs the store only when the reservation still
    /// covers the target line. The reservation is consumed either way.
    fn exec_stc(&mut self, sys: &mut System, instr: Instr) -> Result<(), Trap> {
        if instr.opt1() != 0 {
            return Err(Trap::IllegalInstr(instr));
        }
        let ea = self.mem_ea(instr);
        let len = DataWidth::from_field(instr.dw()).len();
        let p_adr = self.data_phys_adr(ea, len)?;
        let line = self.d_cache.line_adr(p_adr);

        let resv = self.take_reservation();
        if resv == Some(line) {
            let val = self.reg_r(instr);
            self.data_write(sys, ea, val, len, false)?;
        }
        self.next_instr();
        Ok(())
    }

    // Branches.

    /// Checks a computed branch target for 4-alignment and installs it.
    fn branch_to(&mut self, target: Word) -> Result<(), Trap> {
        if target & 0x3 != 0 {
            return Err(Trap::InstrAlign(target));
        }
        self.install_ia(target);
        Ok(())
    }

    fn exec_b(&mut self, instr: Instr) -> Result<(), Trap> {
        let ofs = (instr.imm19() as Word) << 2;
        let rl = add_adr_ofs32(self.psr_ia(), 4);
        let target = add_adr_ofs32(self.psr_ia(), ofs);

        self.branch_to(target)?;
        self.set_reg_r(instr, rl);
        if instr.bit(19) {
            // Gate: the branch raises the privilege level.
            let psr = self.psr();
            self.set_psr(deposit_field64(psr, PSR_X_BIT, 1, 1));
        }
        Ok(())
    }

    fn exec_be(&mut self, instr: Instr) -> Result<(), Trap> {
        let base = self.reg_b(instr);
        let ofs = (instr.imm15() as Word) << 2;
        let rl = add_adr_ofs32(self.psr_ia(), 4);
        let target = add_adr_ofs32(base, ofs);

        self.branch_to(target)?;
        self.set_reg_r(instr, rl);
        Ok(())
    }

    fn exec_br(&mut self, instr: Instr) -> Result<(), Trap> {
        let rl = add_adr_ofs32(self.psr_ia(), 4);
        let target = add_adr_ofs32(self.psr_ia(), self.reg_b(instr));

        self.branch_to(target)?;
        self.set_reg_r(instr, rl);
        Ok(())
    }

    fn exec_bv(&mut self, instr: Instr) -> Result<(), Trap> {
        let rl = add_adr_ofs32(self.psr_ia(), 4);
        let target = add_adr_ofs32(self.reg_b(instr), self.reg_a(instr));

        self.branch_to(target)?;
        self.set_reg_r(instr, rl);
        Ok(())
    }

    /// Branch on bit: taken when bit `pos` of Rr equals the test value.
    fn exec_bb(&mut self, instr: Instr) -> Result<(), Trap> {
        if instr.bit(21) {
            return Err(Trap::IllegalInstr(instr));
        }
        let pos = self.shamt_or_field(instr, 20, 13, 6);
        let test_val = instr.bit(19);
        let test_bit = extract_bit64(self.reg_r(instr), pos);

        if test_bit == test_val {
            let target = add_adr_ofs32(self.psr_ia(), (instr.imm13() as Word) << 2);
            self.branch_to(target)
        } else {
            self.next_instr();
            Ok(())
        }
    }

    fn exec_cbr(&mut self, instr: Instr) -> Result<(), Trap> {
        let val1 = self.reg_r(instr);
        let val2 = self.reg_b(instr);
        if eval_cond(instr.opt1(), val1, val2) {
            let target = add_adr_ofs32(self.psr_ia(), (instr.imm15() as Word) << 2);
            self.branch_to(target)
        } else {
            self.next_instr();
            Ok(())
        }
    }

    /// Move then branch: Rr receives Rb, the branch tests the moved value
    /// against zero.
    fn exec_mbr(&mut self, instr: Instr) -> Result<(), Trap> {
        let val = self.reg_b(instr);
        self.set_reg_r(instr, val);
        if eval_cond(instr.opt1(), val, 0) {
            let target = add_adr_ofs32(self.psr_ia(), (instr.imm15() as Word) << 2);
            self.branch_to(target)
        } else {
            self.next_instr();
            Ok(())
        }
    }

    /// Add then branch: Rr receives Rr + Rb with an overflow check, the
    /// branch tests the sum against zero.
    fn exec_abr(&mut self, instr: Instr) -> Result<(), Trap> {
        let val1 = self.reg_r(instr);
        let val2 = self.reg_b(instr);
        self.check_add_overflow(val1, val2)?;
        let sum = val1 + val2;
        self.set_reg_r(instr, sum);
        if eval_cond(instr.opt1(), sum, 0) {
            let target = add_adr_ofs32(self.psr_ia(), (instr.imm15() as Word) << 2);
            self.branch_to(target)
        } else {
            self.next_instr();
            Ok(())
        }
    }

    // System operations.

    /// MFCR/MTCR/MFIA. The MFIA variants read the whole PSR or one of its
    /// slices (IA bits 12..31, 32..51, status bits 52..63).
    fn exec_mr(&mut self, instr: Instr) -> Result<(), Trap> {
        match instr.opt1() {
            0 => {
                let creg = instr.field_u(0, 4) as usize;
                let val = self.cregs.read(creg);
                self.set_reg_r(instr, val);
            }
            1 => {
                self.require_priv()?;
                let creg = instr.field_u(0, 4) as usize;
                let old = self.cregs.read(creg);
                let val = self.reg_b(instr);
                self.cregs.write(creg, val);
                self.set_reg_r(instr, old);
            }
            4 => {
                let psr = self.psr();
                self.set_reg_r(instr, psr);
            }
            5 => {
                let val = extract_field64(self.psr(), 12, 20);
                self.set_reg_r(instr, val);
            }
            6 => {
                let val = extract_field64(self.psr(), 32, 20);
                self.set_reg_r(instr, val);
            }
            7 => {
                let val = extract_field64(self.psr(), 52, 12);
                self.set_reg_r(instr, val);
            }
            _ => return Err(Trap::IllegalInstr(instr)),
        }
        self.next_instr();
        Ok(())
    }

    /// LPA: translate through the D-TLB and return the physical address, or
    /// zero when no translation exists.
    fn exec_lpa(&mut self, instr: Instr) -> Result<(), Trap> {
        self.require_priv()?;
        if instr.opt1() != 0 {
            return Err(Trap::IllegalInstr(instr));
        }
        let v_adr = add_adr_ofs32(self.reg_b(instr), self.reg_a(instr));
        let vaddr = crate::common::addr::VirtAddr::new(v_adr);
        let res = match self.d_tlb.lookup(vaddr) {
            Some(entry) => entry.p_adr | vaddr.page_ofs(),
            None => 0,
        };
        self.set_reg_r(instr, res);
        self.next_instr();
        Ok(())
    }

    /// PRB: probe an address for access. Mode 0 probes read, 1 write,
    /// 2 execute; mode 3 takes the mode from RegA. Privileged mode always
    /// probes successfully.
    fn exec_prb(&mut self, instr: Instr) -> Result<(), Trap> {
        let v_adr = self.reg_b(instr);
        let mut mode = instr.field_u(13, 2);
        if mode == 3 {
            mode = (self.reg_a(instr) & 0x3) as u32;
        }

        let res = if self.is_priv() {
            1
        } else {
            let vaddr = crate::common::addr::VirtAddr::new(v_adr);
            match self.d_tlb.lookup(vaddr) {
                Some(entry) => entry.page_type.permits(mode) as Word,
                None => 0,
            }
        };
        self.set_reg_r(instr, res);
        self.next_instr();
        Ok(())
    }

    /// TLB insert and purge. RegB carries the virtual address; inserts take
    /// the info word from RegA, purges add RegA as an address offset.
    fn exec_tlb(&mut self, instr: Instr) -> Result<(), Trap> {
        self.require_priv()?;
        let v_adr = crate::common::addr::VirtAddr::new(self.reg_b(instr));
        match instr.opt1() {
            0 => {
                let info = self.reg_a(instr);
                self.i_tlb.insert(v_adr, info);
            }
            1 => {
                let info = self.reg_a(instr);
                self.d_tlb.insert(v_adr, info);
            }
            2 => {
                let adr = add_adr_ofs32(v_adr.val(), self.reg_a(instr));
                self.i_tlb.purge(crate::common::addr::VirtAddr::new(adr));
            }
            3 => {
                let adr = add_adr_ofs32(v_adr.val(), self.reg_a(instr));
                self.d_tlb.purge(crate::common::addr::VirtAddr::new(adr));
            }
            _ => return Err(Trap::IllegalInstr(instr)),
        }
        self.set_reg_r(instr, 1);
        self.next_instr();
        Ok(())
    }

    /// Cache purge and flush by address. An address outside the physical
    /// range translates through the D-TLB first.
    fn exec_ca(&mut self, sys: &mut System, instr: Instr) -> Result<(), Trap> {
        self.require_priv()?;
        let v_adr = add_adr_ofs32(self.reg_b(instr), self.reg_a(instr));

        let p_adr = if self.is_phys_adr(v_adr) {
            v_adr
        } else {
            let vaddr = crate::common::addr::VirtAddr::new(v_adr);
            match self.d_tlb.lookup(vaddr) {
                Some(entry) => entry.p_adr | vaddr.page_ofs(),
                None => return Err(Trap::DataTlbMiss(v_adr)),
            }
        };

        let req = self.mod_num();
        let result = match instr.opt1() {
            0 => self.i_cache.purge(sys, req, p_adr),
            1 => self.d_cache.purge(sys, req, p_adr),
            2 => self.i_cache.flush(sys, req, p_adr),
            3 => self.d_cache.flush(sys, req, p_adr),
            _ => return Err(Trap::IllegalInstr(instr)),
        };
        if let Err(err) = result {
            return Err(self.bus_to_trap(err));
        }

        // Purging the reserved line drops the reservation.
        if matches!(instr.opt1(), 0 | 1) {
            if let Some(resv) = self.take_reservation() {
                if resv != self.d_cache.line_adr(p_adr) {
                    self.set_reservation(resv);
                }
            }
        }

        self.set_reg_r(instr, 1);
        self.next_instr();
        Ok(())
    }

    /// RSM/SSM: reset or set status bits selected by the 8-bit mask.
    /// Bit 7 selects PSR.M, bit 5 PSR.X, bit 0 the region-check enable.
    /// Rr receives the previous status byte.
    fn exec_mst(&mut self, instr: Instr) -> Result<(), Trap> {
        self.require_priv()?;
        let mask = instr.field_u(0, 8);
        let set = match instr.opt1() {
            0 => false,
            1 => true,
            _ => return Err(Trap::IllegalInstr(instr)),
        };

        let psr = self.psr();
        let old_status = ((extract_bit64(psr, PSR_M_BIT) as Word) << 7)
            | ((extract_bit64(psr, PSR_X_BIT) as Word) << 5)
            | (extract_bit64(psr, PSR_R_BIT) as Word);

        let bit_val = set as Word;
        let mut new_psr = psr;
        if mask & (1 << 7) != 0 {
            new_psr = deposit_field64(new_psr, PSR_M_BIT, 1, bit_val);
        }
        if mask & (1 << 5) != 0 {
            new_psr = deposit_field64(new_psr, PSR_X_BIT, 1, bit_val);
        }
        if mask & 1 != 0 {
            new_psr = deposit_field64(new_psr, PSR_R_BIT, 1, bit_val);
        }
        self.set_psr(new_psr);
        self.set_reg_r(instr, old_status);
        self.next_instr();
        Ok(())
    }

    /// RFI: return from interrupt. Restores the PSR saved at trap entry.
    fn exec_rfi(&mut self, instr: Instr) -> Result<(), Trap> {
        self.require_priv()?;
        if instr.opt1() != 0 {
            return Err(Trap::IllegalInstr(instr));
        }
        let rl = add_adr_ofs32(self.psr_ia(), 4);
        self.set_reg_r(instr, rl);
        let saved = self.cregs.read(CR_IPSR);
        self.set_psr(saved);
        Ok(())
    }

    fn exec_diag(&mut self, instr: Instr) -> Result<(), Trap> {
        let opt = (instr.opt1() << 2) | instr.dw();
        Err(Trap::Diag {
            opt,
            arg0: self.reg_b(instr),
            arg1: self.reg_a(instr),
        })
    }

    fn exec_trap_op(&mut self, instr: Instr) -> Result<(), Trap> {
        let opt = (instr.opt1() << 2) | instr.dw();
        Err(Trap::Program {
            opt,
            arg0: self.reg_b(instr),
            arg1: self.reg_a(instr),
        })
    }
}

/// The three logical operations sharing the complement option scheme.
#[derive(Clone, Copy, PartialEq, Eq)]
enum LogicOp {
    And,
    Or,
    Xor,
}
