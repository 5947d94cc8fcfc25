//! One-line assembler.
//!
//! Assembles a single instruction without further context, using the syntax
//! of the real assembler: no labels, no symbols, comments ignored. The parser
//! is a straightforward recursive-descent LL(1) parser; an error aborts the
//! line and reports an id plus character position.
//!
//! The mnemonic text selects between the ALU form and the MEM form of the
//! dual-form opcodes: `OP R,R,R` and `OP R,R,imm` assemble to the ALU group,
//! `OP R,imm(R)` and `OP R,R(R)` to the MEM group.

pub mod expr;
pub mod token;

use crate::common::bits::{is_aligned_data_adr, is_aligned_ofs};
use crate::common::error::{AsmError, AsmErrorId};
use crate::common::{Instr, Word};
use crate::isa::asm::expr::{parse_expr, ExprVal};
use crate::isa::asm::token::{Lexer, OpId, StrSource, Token};
use crate::isa::instruction::{
    deposit_bit, deposit_field, deposit_field_s, deposit_field_u, deposit_reg_a, deposit_reg_b,
    deposit_reg_r, InstrBits,
};
use crate::isa::{grp, opc};

// Instruction option flags, accumulated over the dotted groups.
const OPT_B: u32 = 1 << 1;
const OPT_C: u32 = 1 << 2;
const OPT_D: u32 = 1 << 3;
const OPT_F: u32 = 1 << 4;
const OPT_G: u32 = 1 << 5;
const OPT_H: u32 = 1 << 6;
const OPT_L: u32 = 1 << 7;
const OPT_M: u32 = 1 << 8;
const OPT_N: u32 = 1 << 9;
const OPT_Q: u32 = 1 << 10;
const OPT_S: u32 = 1 << 11;
const OPT_T: u32 = 1 << 12;
const OPT_U: u32 = 1 << 13;
const OPT_W: u32 = 1 << 14;
const OPT_Z: u32 = 1 << 15;

const OPT_EQ: u32 = 1 << 24;
const OPT_LT: u32 = 1 << 25;
const OPT_GT: u32 = 1 << 26;
const OPT_EV: u32 = 1 << 27;
const OPT_NE: u32 = 1 << 28;
const OPT_LE: u32 = 1 << 29;
const OPT_GE: u32 = 1 << 30;
const OPT_OD: u32 = 1 << 31;

const OPTS_DW: u32 = OPT_B | OPT_H | OPT_W | OPT_D;
const OPTS_COND: u32 = OPT_EQ | OPT_LT | OPT_GT | OPT_EV | OPT_NE | OPT_LE | OPT_GE | OPT_OD;
const OPTS_COND_NO_PARITY: u32 = OPT_EQ | OPT_LT | OPT_GT | OPT_NE | OPT_LE | OPT_GE;

/// Allowed option mask per mnemonic. Anything outside fails `invalid-opt`.
fn allowed_opts(op: OpId) -> u32 {
    match op {
        OpId::Add | OpId::Sub | OpId::Ldo | OpId::St => OPTS_DW,
        OpId::And | OpId::Or => OPTS_DW | OPT_C | OPT_N,
        OpId::Xor => OPTS_DW | OPT_N,
        OpId::Cmp => OPTS_DW | OPTS_COND,
        OpId::Extr => OPT_S,
        OpId::Dep => OPT_Z,
        OpId::Ldil | OpId::Mfia => OPT_L | OPT_M | OPT_U,
        OpId::Ld => OPTS_DW | OPT_U,
        OpId::Ldr => OPT_D | OPT_U,
        OpId::Stc => OPT_D,
        OpId::B => OPT_G,
        OpId::Br | OpId::Bv => OPT_W | OPT_D | OPT_Q,
        OpId::Bb => OPT_T | OPT_F,
        OpId::Cbr => OPTS_COND_NO_PARITY,
        OpId::Mbr | OpId::Abr => OPTS_COND,
        _ => 0,
    }
}

/// Parses the dotted option groups following a mnemonic.
///
/// Single letters accumulate individually; the two-letter condition codes are
/// matched as a whole group. After collection the per-group exclusivity
/// rules and the per-mnemonic allowed mask are enforced, then the data-width
/// default is applied for the memory-reference mnemonics.
fn parse_instr_options(lex: &mut Lexer<'_>, op: OpId) -> Result<u32, AsmError> {
    let mut mask: u32 = 0;

    while matches!(lex.tok(), Token::Period) {
        lex.next_token()?;

        // The "B" mnemonic doubles as the byte width option.
        let name: String = match lex.tok() {
            Token::Ident(name) => name.clone(),
            Token::Op(OpId::B, _) => "B".to_string(),
            _ => return Err(AsmError::new(AsmErrorId::ExpectedInstrOpt, lex.pos())),
        };

        match name.as_str() {
            "EQ" => mask |= OPT_EQ,
            "LT" => mask |= OPT_LT,
            "GT" => mask |= OPT_GT,
            "EV" => mask |= OPT_EV,
            "NE" => mask |= OPT_NE,
            "LE" => mask |= OPT_LE,
            "GE" => mask |= OPT_GE,
            "OD" => mask |= OPT_OD,
            _ => {
                for ch in name.chars() {
                    mask |= match ch {
                        'B' => OPT_B,
                        'C' => OPT_C,
                        'D' => OPT_D,
                        'F' => OPT_F,
                        'G' => OPT_G,
                        'H' => OPT_H,
                        'L' => OPT_L,
                        'M' => OPT_M,
                        'N' => OPT_N,
                        'Q' => OPT_Q,
                        'S' => OPT_S,
                        'T' => OPT_T,
                        'U' => OPT_U,
                        'W' => OPT_W,
                        'Z' => OPT_Z,
                        _ => return Err(AsmError::new(AsmErrorId::InvalidOpt, lex.pos())),
                    };
                }
            }
        }
        lex.next_token()?;
    }

    let err_dup = AsmError::new(AsmErrorId::DupOpt, lex.pos());
    if (mask & (OPT_W | OPT_D | OPT_Q)).count_ones() > 1 {
        return Err(err_dup);
    }
    if (mask & OPTS_DW).count_ones() > 1 {
        return Err(err_dup);
    }
    if (mask & OPTS_COND).count_ones() > 1 {
        return Err(err_dup);
    }
    if (mask & (OPT_T | OPT_F)).count_ones() > 1 {
        return Err(err_dup);
    }
    if (mask & (OPT_L | OPT_M | OPT_U)).count_ones() > 1 {
        return Err(err_dup);
    }

    if mask & !allowed_opts(op) != 0 {
        return Err(AsmError::new(AsmErrorId::InvalidOpt, lex.pos()));
    }

    // Memory-reference mnemonics default to double-word width.
    let defaults_to_d = matches!(op, OpId::Ld | OpId::St | OpId::Ldo | OpId::Ldr | OpId::Stc);
    if defaults_to_d && mask & OPTS_DW == 0 {
        mask |= OPT_D;
    }

    Ok(mask)
}

fn has_dw_opts(mask: u32) -> bool {
    mask & OPTS_DW != 0
}

fn has_cond_opts(mask: u32) -> bool {
    mask & OPTS_COND != 0
}

/// Deposits the condition field (bits 19..21) from the option mask.
fn set_cond_field(instr: &mut Instr, mask: u32) {
    let cond = if mask & OPT_EQ != 0 {
        0
    } else if mask & OPT_LT != 0 {
        1
    } else if mask & OPT_GT != 0 {
        2
    } else if mask & OPT_EV != 0 {
        3
    } else if mask & OPT_NE != 0 {
        4
    } else if mask & OPT_GE != 0 {
        5
    } else if mask & OPT_LE != 0 {
        6
    } else {
        7
    };
    deposit_field(instr, 19, 3, cond);
}

/// Deposits the data-width field (bits 13..14) from the option mask.
fn set_dw_field(instr: &mut Instr, mask: u32) {
    let dw = if mask & OPT_B != 0 {
        0
    } else if mask & OPT_H != 0 {
        1
    } else if mask & OPT_W != 0 {
        2
    } else {
        3
    };
    deposit_field(instr, 13, 2, dw);
}

/// Access width in bytes implied by the option mask (default D).
fn opt_width_bytes(mask: u32) -> usize {
    if mask & OPT_B != 0 {
        1
    } else if mask & OPT_H != 0 {
        2
    } else if mask & OPT_W != 0 {
        4
    } else {
        8
    }
}

/// The numeric offset of a scaled-immediate form must be aligned to the
/// data width; the scaling shift would silently drop low bits otherwise.
fn check_ofs_alignment(ofs: Word, mask: u32, pos: usize) -> Result<(), AsmError> {
    let width = opt_width_bytes(mask);
    if width != 1 && !is_aligned_data_adr(ofs, width) {
        return Err(AsmError::new(AsmErrorId::InvalidOfs, pos));
    }
    Ok(())
}

/// Deposits the 13-bit scaled immediate: the value is shifted right by the
/// data-width field already present in the instruction.
fn deposit_scaled_imm13(instr: &mut Instr, val: Word, pos: usize) -> Result<(), AsmError> {
    let scaled = val >> instr.dw();
    deposit_field_s(instr, 0, 13, scaled, pos)
}

fn replace_group(instr: &mut Instr, group: u32) {
    *instr = (*instr & 0x3FFF_FFFF) | (group << 30);
}

fn replace_op_code(instr: &mut Instr, family: u32) {
    *instr = (*instr & 0xC3FF_FFFF) | (family << 26);
}

/// Parses an expression and requires a general register, depositing regR.
fn accept_reg_r(lex: &mut Lexer<'_>, instr: &mut Instr) -> Result<(), AsmError> {
    match parse_expr(lex)? {
        ExprVal::GReg(reg) => {
            deposit_reg_r(instr, reg);
            Ok(())
        }
        _ => Err(AsmError::new(AsmErrorId::ExpectedGeneralReg, lex.pos())),
    }
}

fn accept_reg_b(lex: &mut Lexer<'_>, instr: &mut Instr) -> Result<(), AsmError> {
    match parse_expr(lex)? {
        ExprVal::GReg(reg) => {
            deposit_reg_b(instr, reg);
            Ok(())
        }
        _ => Err(AsmError::new(AsmErrorId::ExpectedGeneralReg, lex.pos())),
    }
}

fn accept_reg_a(lex: &mut Lexer<'_>, instr: &mut Instr) -> Result<(), AsmError> {
    match parse_expr(lex)? {
        ExprVal::GReg(reg) => {
            deposit_reg_a(instr, reg);
            Ok(())
        }
        _ => Err(AsmError::new(AsmErrorId::ExpectedGeneralReg, lex.pos())),
    }
}

/// Optional `"," <regR>` tail used by the branch forms, then end of line.
fn accept_opt_reg_r_eos(lex: &mut Lexer<'_>, instr: &mut Instr) -> Result<(), AsmError> {
    if matches!(lex.tok(), Token::Comma) {
        lex.next_token()?;
        accept_reg_r(lex, instr)?;
    }
    lex.accept_eos()
}

/// ADD/SUB/AND/OR/XOR/CMP. The operand shape picks the instruction form:
///
/// ```text
/// OP [.opts] Rr,Rb,Ra        ALU, register operand
/// OP [.opts] Rr,Rb,num       ALU, immediate operand
/// OP [.opts] Rr,num(Rb)      MEM, scaled offset
/// OP [.opts] Rr,Ra(Rb)       MEM, indexed
/// ```
fn parse_mode_type_instr(
    lex: &mut Lexer<'_>,
    instr: &mut Instr,
    op: OpId,
) -> Result<(), AsmError> {
    lex.next_token()?;
    let mask = parse_instr_options(lex, op)?;
    accept_reg_r(lex, instr)?;
    lex.accept_comma()?;

    match parse_expr(lex)? {
        ExprVal::Num(ofs) => {
            replace_group(instr, grp::MEM);
            if op == OpId::Cmp {
                replace_op_code(instr, opc::CMP_A);
            }
            check_ofs_alignment(ofs, mask, lex.pos())?;
            set_dw_field(instr, mask);
            deposit_scaled_imm13(instr, ofs, lex.pos())?;

            lex.accept_lparen()?;
            accept_reg_b(lex, instr)?;
            lex.accept_rparen()?;
            lex.accept_eos()?;
        }
        ExprVal::GReg(reg) => {
            if matches!(lex.tok(), Token::Comma) {
                if has_dw_opts(mask) {
                    return Err(AsmError::new(AsmErrorId::InvalidInstrMode, lex.pos()));
                }
                replace_group(instr, grp::ALU);
                deposit_reg_b(instr, reg);

                lex.next_token()?;
                match parse_expr(lex)? {
                    ExprVal::Num(val) => {
                        if op == OpId::Cmp {
                            replace_op_code(instr, opc::CMP_B);
                        } else {
                            deposit_bit(instr, 19, true);
                        }
                        deposit_field_s(instr, 0, 15, val, lex.pos())?;
                    }
                    ExprVal::GReg(reg_a) => {
                        if op == OpId::Cmp {
                            replace_op_code(instr, opc::CMP_A);
                        }
                        deposit_reg_a(instr, reg_a);
                    }
                    _ => return Err(AsmError::new(AsmErrorId::ExpectedGeneralReg, lex.pos())),
                }
                lex.accept_eos()?;
            } else if matches!(lex.tok(), Token::LParen) {
                replace_group(instr, grp::MEM);
                if op == OpId::Cmp {
                    replace_op_code(instr, opc::CMP_B);
                } else {
                    deposit_bit(instr, 19, true);
                }
                set_dw_field(instr, mask);
                deposit_reg_a(instr, reg);

                lex.next_token()?;
                accept_reg_b(lex, instr)?;
                lex.accept_rparen()?;
                lex.accept_eos()?;
            } else {
                return Err(AsmError::new(AsmErrorId::ExpectedComma, lex.pos()));
            }
        }
        _ => return Err(AsmError::new(AsmErrorId::InvalidExpr, lex.pos())),
    }

    match op {
        OpId::And | OpId::Or => {
            if mask & OPT_C != 0 {
                deposit_bit(instr, 20, true);
            }
            if mask & OPT_N != 0 {
                deposit_bit(instr, 21, true);
            }
        }
        OpId::Xor => {
            if mask & OPT_N != 0 {
                deposit_bit(instr, 21, true);
            }
        }
        OpId::Cmp => {
            if !has_cond_opts(mask) {
                return Err(AsmError::new(AsmErrorId::InvalidInstrMode, lex.pos()));
            }
            set_cond_field(instr, mask);
        }
        _ => {}
    }

    Ok(())
}

/// EXTR: `EXTR [.S] Rr,Rb,pos,len` or `EXTR [.S] Rr,Rb,SAR,len`.
fn parse_instr_extr(lex: &mut Lexer<'_>, instr: &mut Instr, op: OpId) -> Result<(), AsmError> {
    lex.next_token()?;
    let mask = parse_instr_options(lex, op)?;
    accept_reg_r(lex, instr)?;
    lex.accept_comma()?;
    accept_reg_b(lex, instr)?;
    lex.accept_comma()?;

    let mut pos_val: Word = 0;
    match parse_expr(lex)? {
        ExprVal::Num(pos) => {
            deposit_field_u(instr, 6, 6, pos, lex.pos())?;
            pos_val = pos;
        }
        ExprVal::CReg(2) => deposit_bit(instr, 13, true),
        _ => return Err(AsmError::new(AsmErrorId::ExpectedPosArg, lex.pos())),
    }
    lex.accept_comma()?;

    let len = match parse_expr(lex)? {
        ExprVal::Num(len) => {
            deposit_field_u(instr, 0, 6, len, lex.pos())?;
            len
        }
        _ => return Err(AsmError::new(AsmErrorId::ExpectedLenArg, lex.pos())),
    };

    if mask & OPT_S != 0 {
        deposit_bit(instr, 12, true);
    }
    lex.accept_eos()?;

    if pos_val + len > 64 {
        return Err(AsmError::new(AsmErrorId::BitRangeExceeds, lex.pos()));
    }
    Ok(())
}

/// DEP: `DEP [.Z] Rr,Rb|val,pos|SAR,len`. A numeric source becomes the
/// 4-bit immediate form (bit 14); `.Z` zero-fills the target first.
fn parse_instr_dep(lex: &mut Lexer<'_>, instr: &mut Instr, op: OpId) -> Result<(), AsmError> {
    lex.next_token()?;
    let mask = parse_instr_options(lex, op)?;
    if mask & OPT_Z != 0 {
        deposit_bit(instr, 12, true);
    }
    accept_reg_r(lex, instr)?;
    lex.accept_comma()?;

    match parse_expr(lex)? {
        ExprVal::GReg(reg) => deposit_reg_b(instr, reg),
        ExprVal::Num(val) => {
            deposit_field_u(instr, 15, 4, val, lex.pos())?;
            deposit_bit(instr, 14, true);
        }
        _ => return Err(AsmError::new(AsmErrorId::ExpectedPosArg, lex.pos())),
    }
    lex.accept_comma()?;

    let mut pos_val: Word = 0;
    match parse_expr(lex)? {
        ExprVal::CReg(2) => deposit_bit(instr, 13, true),
        ExprVal::Num(pos) => {
            deposit_field_u(instr, 6, 6, pos, lex.pos())?;
            pos_val = pos;
        }
        _ => return Err(AsmError::new(AsmErrorId::ExpectedPosArg, lex.pos())),
    }
    lex.accept_comma()?;

    let len = match parse_expr(lex)? {
        ExprVal::Num(len) => {
            deposit_field_u(instr, 0, 6, len, lex.pos())?;
            len
        }
        _ => return Err(AsmError::new(AsmErrorId::ExpectedLenArg, lex.pos())),
    };
    lex.accept_eos()?;

    if pos_val + len > 64 {
        return Err(AsmError::new(AsmErrorId::BitRangeExceeds, lex.pos()));
    }
    Ok(())
}

/// DSR: `DSR Rr,Rb,Ra,len` or `DSR Rr,Rb,Ra,SAR` (128-bit funnel shift).
fn parse_instr_dsr(lex: &mut Lexer<'_>, instr: &mut Instr) -> Result<(), AsmError> {
    lex.next_token()?;
    accept_reg_r(lex, instr)?;
    lex.accept_comma()?;
    accept_reg_b(lex, instr)?;
    lex.accept_comma()?;
    accept_reg_a(lex, instr)?;
    lex.accept_comma()?;

    match parse_expr(lex)? {
        ExprVal::Num(len) => deposit_field_u(instr, 0, 6, len, lex.pos())?,
        ExprVal::CReg(2) => deposit_bit(instr, 13, true),
        _ => return Err(AsmError::new(AsmErrorId::ExpectedLenArg, lex.pos())),
    }
    lex.accept_eos()
}

/// SHLxA / SHRxA: `OP Rr,Rb,Ra` or `OP Rr,Rb,num`. The shift amount lives in
/// the data-width field; the operand shape selects the opt1 value.
fn parse_instr_shift_add(
    lex: &mut Lexer<'_>,
    instr: &mut Instr,
    op: OpId,
) -> Result<(), AsmError> {
    lex.next_token()?;
    parse_instr_options(lex, op)?;

    let (shamt, right) = match op {
        OpId::Shl1a => (1, false),
        OpId::Shl2a => (2, false),
        OpId::Shl3a => (3, false),
        OpId::Shr1a => (1, true),
        OpId::Shr2a => (2, true),
        _ => (3, true),
    };
    deposit_field(instr, 13, 2, shamt);

    accept_reg_r(lex, instr)?;
    lex.accept_comma()?;
    accept_reg_b(lex, instr)?;
    lex.accept_comma()?;

    match parse_expr(lex)? {
        ExprVal::GReg(reg) => {
            deposit_field(instr, 19, 3, if right { 2 } else { 0 });
            deposit_reg_a(instr, reg);
        }
        ExprVal::Num(val) => {
            deposit_field(instr, 19, 3, if right { 3 } else { 1 });
            deposit_field_s(instr, 0, 13, val, lex.pos())?;
        }
        _ => return Err(AsmError::new(AsmErrorId::ExpectedGeneralReg, lex.pos())),
    }
    lex.accept_eos()
}

/// LDIL / ADDIL: `LDIL[.L/M/U] Rr,val` and `ADDIL Rr,val`.
fn parse_instr_imm_op(lex: &mut Lexer<'_>, instr: &mut Instr, op: OpId) -> Result<(), AsmError> {
    lex.next_token()?;
    let mask = parse_instr_options(lex, op)?;

    if op == OpId::Ldil {
        let sub = if mask & OPT_M != 0 {
            2
        } else if mask & OPT_U != 0 {
            3
        } else {
            1
        };
        deposit_field(instr, 20, 2, sub);
    }

    accept_reg_r(lex, instr)?;
    lex.accept_comma()?;

    match parse_expr(lex)? {
        ExprVal::Num(val) => deposit_field_u(instr, 0, 20, val, lex.pos())?,
        _ => return Err(AsmError::new(AsmErrorId::ExpectedNumeric, lex.pos())),
    }
    lex.accept_eos()
}

/// LDO: `LDO [.B/H/W/D] Rr,[ofs](Rb)` or `LDO Rr,Ra(Rb)`.
fn parse_instr_ldo(lex: &mut Lexer<'_>, instr: &mut Instr, op: OpId) -> Result<(), AsmError> {
    lex.next_token()?;
    let mask = parse_instr_options(lex, op)?;
    set_dw_field(instr, mask);
    accept_reg_r(lex, instr)?;
    lex.accept_comma()?;

    match lex.tok().clone() {
        Token::LParen => {
            deposit_scaled_imm13(instr, 0, lex.pos())?;
        }
        _ => match parse_expr(lex)? {
            ExprVal::Num(ofs) => {
                check_ofs_alignment(ofs, mask, lex.pos())?;
                deposit_scaled_imm13(instr, ofs, lex.pos())?;
            }
            ExprVal::GReg(reg) => {
                if has_dw_opts(mask) && mask & OPT_D == 0 {
                    return Err(AsmError::new(AsmErrorId::InvalidOpt, lex.pos()));
                }
                deposit_field(instr, 13, 2, 0);
                deposit_bit(instr, 19, true);
                deposit_reg_a(instr, reg);
            }
            _ => return Err(AsmError::new(AsmErrorId::ExpectedNumeric, lex.pos())),
        },
    }

    lex.accept_lparen()?;
    accept_reg_b(lex, instr)?;
    lex.accept_rparen()?;
    lex.accept_eos()
}

/// LD/ST/LDR/STC: `OP [.opts] Rr,ofs(Rb)` or `OP [.opts] Rr,Ra(Rb)`.
/// LDR and STC only take the offset form.
fn parse_mem_op(lex: &mut Lexer<'_>, instr: &mut Instr, op: OpId) -> Result<(), AsmError> {
    lex.next_token()?;
    let mask = parse_instr_options(lex, op)?;
    set_dw_field(instr, mask);
    accept_reg_r(lex, instr)?;
    lex.accept_comma()?;

    if mask & OPT_U != 0 {
        deposit_bit(instr, 20, true);
    }

    match parse_expr(lex)? {
        ExprVal::Num(ofs) => {
            check_ofs_alignment(ofs, mask, lex.pos())?;
            deposit_bit(instr, 19, false);
            deposit_scaled_imm13(instr, ofs, lex.pos())?;
        }
        ExprVal::GReg(reg) => {
            if matches!(op, OpId::Ldr | OpId::Stc) {
                return Err(AsmError::new(AsmErrorId::InvalidInstrMode, lex.pos()));
            }
            deposit_bit(instr, 19, true);
            deposit_reg_a(instr, reg);
        }
        _ => return Err(AsmError::new(AsmErrorId::ExpectedNumeric, lex.pos())),
    }

    lex.accept_lparen()?;
    accept_reg_b(lex, instr)?;
    lex.accept_rparen()?;
    lex.accept_eos()
}

/// B: `B [.G] ofs [,Rr]`. IA-relative, offset scaled by 4.
fn parse_instr_b(lex: &mut Lexer<'_>, instr: &mut Instr, op: OpId) -> Result<(), AsmError> {
    lex.next_token()?;
    let mask = parse_instr_options(lex, op)?;
    if mask & OPT_G != 0 {
        deposit_bit(instr, 19, true);
    }

    match parse_expr(lex)? {
        ExprVal::Num(ofs) => {
            if !is_aligned_ofs(ofs, 4) {
                return Err(AsmError::new(AsmErrorId::InvalidOfs, lex.pos()));
            }
            deposit_field_s(instr, 0, 19, ofs >> 2, lex.pos())?;
        }
        _ => return Err(AsmError::new(AsmErrorId::ExpectedBrOfs, lex.pos())),
    }
    accept_opt_reg_r_eos(lex, instr)
}

/// BE: `BE [ofs](Rb) [,Rr]`. Base register plus scaled offset.
fn parse_instr_be(lex: &mut Lexer<'_>, instr: &mut Instr) -> Result<(), AsmError> {
    lex.next_token()?;

    match lex.tok().clone() {
        Token::LParen => {
            lex.next_token()?;
            accept_reg_b(lex, instr)?;
            lex.accept_rparen()?;
        }
        _ => match parse_expr(lex)? {
            ExprVal::Num(ofs) => {
                if !is_aligned_ofs(ofs, 4) {
                    return Err(AsmError::new(AsmErrorId::InvalidOfs, lex.pos()));
                }
                deposit_field_s(instr, 0, 15, ofs >> 2, lex.pos())?;
                lex.accept_lparen()?;
                accept_reg_b(lex, instr)?;
                lex.accept_rparen()?;
            }
            ExprVal::GReg(reg) => deposit_reg_b(instr, reg),
            _ => return Err(AsmError::new(AsmErrorId::ExpectedBrOfs, lex.pos())),
        },
    }
    accept_opt_reg_r_eos(lex, instr)
}

/// BR: `BR [.W/D/Q] Rb [,Rr]`. IA-relative through a register.
fn parse_instr_br(lex: &mut Lexer<'_>, instr: &mut Instr, op: OpId) -> Result<(), AsmError> {
    lex.next_token()?;
    let mask = parse_instr_options(lex, op)?;
    set_br_width_field(instr, mask);
    accept_reg_b(lex, instr)?;
    accept_opt_reg_r_eos(lex, instr)
}

fn set_br_width_field(instr: &mut Instr, mask: u32) {
    let field = if mask & OPT_D != 0 {
        1
    } else if mask & OPT_Q != 0 {
        2
    } else {
        0
    };
    deposit_field(instr, 13, 2, field);
}

/// BV: `BV [.W/D/Q] [Ra](Rb) [,Rr]`. Vectored branch through two registers.
fn parse_instr_bv(lex: &mut Lexer<'_>, instr: &mut Instr, op: OpId) -> Result<(), AsmError> {
    lex.next_token()?;
    let mask = parse_instr_options(lex, op)?;
    set_br_width_field(instr, mask);

    if let Token::GReg(reg) = lex.tok().clone() {
        deposit_reg_a(instr, reg);
        lex.next_token()?;
    }

    match parse_expr(lex)? {
        ExprVal::GReg(reg) => deposit_reg_b(instr, reg),
        _ => return Err(AsmError::new(AsmErrorId::ExpectedLparen, lex.pos())),
    }
    accept_opt_reg_r_eos(lex, instr)
}

/// BB: `BB .T/F Rr,pos|SAR,target`.
fn parse_instr_bb(lex: &mut Lexer<'_>, instr: &mut Instr, op: OpId) -> Result<(), AsmError> {
    lex.next_token()?;
    let mask = parse_instr_options(lex, op)?;

    if mask & OPT_T != 0 {
        deposit_bit(instr, 19, true);
    } else if mask & OPT_F != 0 {
        deposit_bit(instr, 19, false);
    } else {
        return Err(AsmError::new(AsmErrorId::ExpectedInstrOpt, lex.pos()));
    }

    accept_reg_r(lex, instr)?;
    lex.accept_comma()?;

    match parse_expr(lex)? {
        ExprVal::Num(pos) => deposit_field_u(instr, 13, 6, pos, lex.pos())?,
        ExprVal::CReg(2) => deposit_bit(instr, 20, true),
        _ => return Err(AsmError::new(AsmErrorId::ExpectedPosArg, lex.pos())),
    }
    lex.accept_comma()?;

    match parse_expr(lex)? {
        ExprVal::Num(ofs) => {
            if !is_aligned_ofs(ofs, 4) {
                return Err(AsmError::new(AsmErrorId::InvalidOfs, lex.pos()));
            }
            deposit_field_s(instr, 0, 13, ofs >> 2, lex.pos())?;
        }
        _ => return Err(AsmError::new(AsmErrorId::ExpectedBrOfs, lex.pos())),
    }
    lex.accept_eos()
}

/// CBR/MBR/ABR: `OP .cond Rr,Rb,ofs`. Compare/move/add then branch.
fn parse_instr_xbr(lex: &mut Lexer<'_>, instr: &mut Instr, op: OpId) -> Result<(), AsmError> {
    lex.next_token()?;
    let mask = parse_instr_options(lex, op)?;
    if !has_cond_opts(mask) {
        return Err(AsmError::new(AsmErrorId::ExpectedInstrOpt, lex.pos()));
    }
    set_cond_field(instr, mask);

    accept_reg_r(lex, instr)?;
    lex.accept_comma()?;
    accept_reg_b(lex, instr)?;
    lex.accept_comma()?;

    match parse_expr(lex)? {
        ExprVal::Num(ofs) => {
            if !is_aligned_ofs(ofs, 4) {
                return Err(AsmError::new(AsmErrorId::InvalidOfs, lex.pos()));
            }
            deposit_field_s(instr, 0, 15, ofs >> 2, lex.pos())?;
        }
        _ => return Err(AsmError::new(AsmErrorId::ExpectedBrOfs, lex.pos())),
    }
    lex.accept_eos()
}

/// MFCR: `MFCR Rr,Cn`.
fn parse_instr_mfcr(lex: &mut Lexer<'_>, instr: &mut Instr) -> Result<(), AsmError> {
    lex.next_token()?;
    accept_reg_r(lex, instr)?;
    lex.accept_comma()?;

    match parse_expr(lex)? {
        ExprVal::CReg(reg) => deposit_field(instr, 0, 4, reg),
        _ => return Err(AsmError::new(AsmErrorId::ExpectedControlReg, lex.pos())),
    }
    lex.accept_eos()
}

/// MTCR: `MTCR Rb,Cn [,Rr]`. The optional target receives the old value.
fn parse_instr_mtcr(lex: &mut Lexer<'_>, instr: &mut Instr) -> Result<(), AsmError> {
    lex.next_token()?;
    accept_reg_b(lex, instr)?;
    lex.accept_comma()?;

    match parse_expr(lex)? {
        ExprVal::CReg(reg) => deposit_field(instr, 0, 4, reg),
        _ => return Err(AsmError::new(AsmErrorId::ExpectedControlReg, lex.pos())),
    }

    if matches!(lex.tok(), Token::Comma) {
        lex.next_token()?;
        accept_reg_r(lex, instr)?;
    }
    lex.accept_eos()
}

/// MFIA: `MFIA [.L/M/U] Rr`. Reads the PSR or one of its IA slices.
fn parse_instr_mfia(lex: &mut Lexer<'_>, instr: &mut Instr, op: OpId) -> Result<(), AsmError> {
    lex.next_token()?;
    let mask = parse_instr_options(lex, op)?;

    let opt = if mask & OPT_L != 0 {
        5
    } else if mask & OPT_M != 0 {
        6
    } else if mask & OPT_U != 0 {
        7
    } else {
        4
    };
    deposit_field(instr, 19, 3, opt);

    accept_reg_r(lex, instr)?;
    lex.accept_eos()
}

/// LPA: `LPA Rr,[Ra](Rb)`.
fn parse_instr_lpa(lex: &mut Lexer<'_>, instr: &mut Instr) -> Result<(), AsmError> {
    lex.next_token()?;
    accept_reg_r(lex, instr)?;
    lex.accept_comma()?;
    accept_reg_x_base(lex, instr)
}

/// Common `[Ra](Rb)` tail of the address-operand system instructions.
fn accept_reg_x_base(lex: &mut Lexer<'_>, instr: &mut Instr) -> Result<(), AsmError> {
    if let Token::GReg(reg) = lex.tok().clone() {
        deposit_reg_a(instr, reg);
        lex.next_token()?;
    }

    match lex.tok() {
        Token::LParen => {
            lex.next_token()?;
            accept_reg_b(lex, instr)?;
            lex.accept_rparen()?;
        }
        _ => return Err(AsmError::new(AsmErrorId::ExpectedLparen, lex.pos())),
    }
    lex.accept_eos()
}

/// PRB: `PRB Rr,Rb,mode` or `PRB Rr,Rb,Ra`. Modes 0..2 probe read, write
/// and execute; the register form takes the mode from RegA at run time.
fn parse_instr_prb(lex: &mut Lexer<'_>, instr: &mut Instr) -> Result<(), AsmError> {
    lex.next_token()?;
    accept_reg_r(lex, instr)?;
    lex.accept_comma()?;
    accept_reg_b(lex, instr)?;
    lex.accept_comma()?;

    match parse_expr(lex)? {
        ExprVal::GReg(reg) => {
            deposit_reg_a(instr, reg);
            deposit_field(instr, 13, 2, 3);
        }
        ExprVal::Num(mode) => {
            if !(0..=2).contains(&mode) {
                return Err(AsmError::new(AsmErrorId::ImmRange, lex.pos()));
            }
            deposit_field(instr, 13, 2, mode as u32);
        }
        _ => return Err(AsmError::new(AsmErrorId::ExpectedPrbArg, lex.pos())),
    }
    lex.accept_eos()
}

/// IITLB/IDTLB: `OP Rr,Rb,Ra`. RegB holds the virtual address, RegA the
/// info word.
fn parse_instr_insert_tlb(lex: &mut Lexer<'_>, instr: &mut Instr) -> Result<(), AsmError> {
    lex.next_token()?;
    accept_reg_r(lex, instr)?;
    lex.accept_comma()?;
    accept_reg_b(lex, instr)?;
    lex.accept_comma()?;
    accept_reg_a(lex, instr)?;
    lex.accept_eos()
}

/// PITLB/PDTLB/PICA/PDCA/FICA/FDCA: `OP Rr,[Ra](Rb)`.
fn parse_instr_adr_sys_op(lex: &mut Lexer<'_>, instr: &mut Instr) -> Result<(), AsmError> {
    lex.next_token()?;
    accept_reg_r(lex, instr)?;
    lex.accept_comma()?;
    accept_reg_x_base(lex, instr)
}

/// RSM/SSM: `OP Rr,val`. The 8-bit mask selects status bits.
fn parse_instr_mst(lex: &mut Lexer<'_>, instr: &mut Instr) -> Result<(), AsmError> {
    lex.next_token()?;
    accept_reg_r(lex, instr)?;
    lex.accept_comma()?;

    match parse_expr(lex)? {
        ExprVal::Num(val) => deposit_field_u(instr, 0, 8, val, lex.pos())?,
        _ => return Err(AsmError::new(AsmErrorId::ExpectedNumeric, lex.pos())),
    }
    lex.accept_eos()
}

/// DIAG: `DIAG Rr,val,Rb,Ra`. The 5-bit option splits over opt1 and dw.
fn parse_instr_diag(lex: &mut Lexer<'_>, instr: &mut Instr) -> Result<(), AsmError> {
    lex.next_token()?;
    accept_reg_r(lex, instr)?;
    lex.accept_comma()?;

    match parse_expr(lex)? {
        ExprVal::Num(val) => {
            if !(0..=31).contains(&val) {
                return Err(AsmError::new(AsmErrorId::ImmRange, lex.pos()));
            }
            deposit_field(instr, 19, 3, (val >> 2) as u32);
            deposit_field(instr, 13, 2, (val & 3) as u32);
        }
        _ => return Err(AsmError::new(AsmErrorId::ExpectedDiagOp, lex.pos())),
    }
    lex.accept_comma()?;
    accept_reg_b(lex, instr)?;
    lex.accept_comma()?;
    accept_reg_a(lex, instr)?;
    lex.accept_eos()
}

/// TRAP: `TRAP info,Rb,Ra`.
fn parse_instr_trap(lex: &mut Lexer<'_>, instr: &mut Instr) -> Result<(), AsmError> {
    lex.next_token()?;

    match parse_expr(lex)? {
        ExprVal::Num(val) => {
            if !(0..=31).contains(&val) {
                return Err(AsmError::new(AsmErrorId::ImmRange, lex.pos()));
            }
            deposit_field(instr, 13, 2, (val & 3) as u32);
            deposit_field(instr, 19, 3, ((val >> 2) & 7) as u32);
        }
        _ => return Err(AsmError::new(AsmErrorId::ExpectedNumeric, lex.pos())),
    }
    lex.accept_comma()?;
    accept_reg_b(lex, instr)?;
    lex.accept_comma()?;
    accept_reg_a(lex, instr)?;
    lex.accept_eos()
}

/// NOP and RFI take no operands.
fn parse_instr_plain(lex: &mut Lexer<'_>) -> Result<(), AsmError> {
    lex.next_token()?;
    lex.accept_eos()
}

/// Parses one instruction line. The current token must be a mnemonic.
fn parse_line(lex: &mut Lexer<'_>) -> Result<Instr, AsmError> {
    let (op, template) = match lex.tok() {
        Token::Op(op, template) => (*op, *template),
        _ => return Err(AsmError::new(AsmErrorId::ExpectedOpCode, lex.pos())),
    };

    let mut instr: Instr = template;

    match op {
        OpId::Nop | OpId::Rfi => parse_instr_plain(lex)?,

        OpId::Add | OpId::Sub | OpId::And | OpId::Or | OpId::Xor | OpId::Cmp => {
            parse_mode_type_instr(lex, &mut instr, op)?
        }

        OpId::Extr => parse_instr_extr(lex, &mut instr, op)?,
        OpId::Dep => parse_instr_dep(lex, &mut instr, op)?,
        OpId::Dsr => parse_instr_dsr(lex, &mut instr)?,

        OpId::Shl1a | OpId::Shl2a | OpId::Shl3a | OpId::Shr1a | OpId::Shr2a | OpId::Shr3a => {
            parse_instr_shift_add(lex, &mut instr, op)?
        }

        OpId::Ldil | OpId::Addil => parse_instr_imm_op(lex, &mut instr, op)?,
        OpId::Ldo => parse_instr_ldo(lex, &mut instr, op)?,

        OpId::Ld | OpId::Ldr | OpId::St | OpId::Stc => parse_mem_op(lex, &mut instr, op)?,

        OpId::B => parse_instr_b(lex, &mut instr, op)?,
        OpId::Be => parse_instr_be(lex, &mut instr)?,
        OpId::Br => parse_instr_br(lex, &mut instr, op)?,
        OpId::Bv => parse_instr_bv(lex, &mut instr, op)?,
        OpId::Bb => parse_instr_bb(lex, &mut instr, op)?,

        OpId::Cbr | OpId::Mbr | OpId::Abr => parse_instr_xbr(lex, &mut instr, op)?,

        OpId::Mfcr => parse_instr_mfcr(lex, &mut instr)?,
        OpId::Mtcr => parse_instr_mtcr(lex, &mut instr)?,
        OpId::Mfia => parse_instr_mfia(lex, &mut instr, op)?,

        OpId::Lpa => parse_instr_lpa(lex, &mut instr)?,
        OpId::Prb => parse_instr_prb(lex, &mut instr)?,

        OpId::Iitlb | OpId::Idtlb => parse_instr_insert_tlb(lex, &mut instr)?,

        OpId::Pitlb | OpId::Pdtlb | OpId::Pica | OpId::Pdca | OpId::Fica | OpId::Fdca => {
            parse_instr_adr_sys_op(lex, &mut instr)?
        }

        OpId::Rsm | OpId::Ssm => parse_instr_mst(lex, &mut instr)?,
        OpId::Diag => parse_instr_diag(lex, &mut instr)?,
        OpId::Trap => parse_instr_trap(lex, &mut instr)?,
    }

    Ok(instr)
}

/// Assembles one source line into an instruction word.
pub fn assemble_line(line: &str) -> Result<Instr, AsmError> {
    let mut src = StrSource::new(line);
    let mut lex = Lexer::new(&mut src)?;
    parse_line(&mut lex)
}

/// Assembles one instruction from an already-positioned lexer. Used by the
/// listing loop in the loader.
pub fn assemble_next(lex: &mut Lexer<'_>) -> Result<Instr, AsmError> {
    parse_line(lex)
}

/// The one-line assembler as a value, for callers that hold one alongside a
/// disassembler.
#[derive(Default)]
pub struct Assembler;

impl Assembler {
    pub fn new() -> Self {
        Self
    }

    /// Assembles `line` into an instruction word, or reports the error id
    /// and character position.
    pub fn assemble(&self, line: &str) -> Result<Instr, AsmError> {
        assemble_line(line)
    }
}

/// Re-exported for callers that assemble from files.
pub use token::{FileSource, Lexer as AsmLexer};
