//! Instruction disassembler.
//!
//! Formats an instruction word in human-readable form. An instruction has
//! the general shape
//!
//! ```text
//! OpCode [ .options ] operands
//! ```
//!
//! The opcode and operand parts are produced separately so debugger views
//! can align them in fixed-width columns; `format_instr` joins them. The
//! disassembler is pure and total: unrecognised encodings render a
//! `**OPC:n**` marker instead of failing.
//!
//! Output is canonical assembler input: default options (`.D` data width,
//! `.W` branch width, `.L` immediate slice) are omitted, register operands
//! use the architected `Rn`/`Cn` names, and numbers follow the requested
//! radix.

use crate::common::Instr;
use crate::isa::instruction::InstrBits;
use crate::isa::{cond, grp, op_key, opc};

/// Column width of the opcode fragment.
pub const OPCODE_FIELD_WIDTH: usize = 16;
/// Column width of the operand fragment.
pub const OPERANDS_FIELD_WIDTH: usize = 32;

/// Formats a number in the given radix as the assembler reads it back.
fn fmt_num(val: i64, rdx: u32) -> String {
    if rdx == 16 {
        if val < 0 {
            format!("-0x{:X}", (val as i128).unsigned_abs())
        } else {
            format!("0x{:X}", val)
        }
    } else {
        format!("{}", val)
    }
}

/// Condition-code suffix for compare and branch forms.
fn cond_suffix(code: u32) -> String {
    match cond::NAMES.get(code as usize) {
        Some(name) => format!(".{}", name),
        None => ".**".to_string(),
    }
}

/// Data-width suffix. `D` is the default and is not printed.
fn dw_suffix(dw: u32) -> &'static str {
    match dw {
        0 => ".B",
        1 => ".H",
        2 => ".W",
        _ => "",
    }
}

/// Carry/negate suffixes of the AND/OR/XOR family.
fn logic_suffixes(instr: Instr, allow_compl: bool) -> String {
    let mut out = String::new();
    if instr.bit(20) {
        out.push_str(if allow_compl { ".C" } else { ".**" });
    }
    if instr.bit(21) {
        out.push_str(".N");
    }
    out
}

/// Builds the opcode fragment: mnemonic plus dotted options.
pub fn format_opcode(instr: Instr) -> String {
    match instr.op_key() {
        k if k == op_key(grp::ALU, opc::ADD) => "ADD".to_string(),
        k if k == op_key(grp::MEM, opc::ADD) => format!("ADD{}", dw_suffix(instr.dw())),
        k if k == op_key(grp::ALU, opc::SUB) => "SUB".to_string(),
        k if k == op_key(grp::MEM, opc::SUB) => format!("SUB{}", dw_suffix(instr.dw())),

        k if k == op_key(grp::ALU, opc::AND) => format!("AND{}", logic_suffixes(instr, true)),
        k if k == op_key(grp::MEM, opc::AND) => {
            format!("AND{}{}", dw_suffix(instr.dw()), logic_suffixes(instr, true))
        }
        k if k == op_key(grp::ALU, opc::OR) => format!("OR{}", logic_suffixes(instr, true)),
        k if k == op_key(grp::MEM, opc::OR) => {
            format!("OR{}{}", dw_suffix(instr.dw()), logic_suffixes(instr, true))
        }
        k if k == op_key(grp::ALU, opc::XOR) => format!("XOR{}", logic_suffixes(instr, false)),
        k if k == op_key(grp::MEM, opc::XOR) => {
            format!("XOR{}{}", dw_suffix(instr.dw()), logic_suffixes(instr, false))
        }

        k if k == op_key(grp::ALU, opc::CMP_A) || k == op_key(grp::ALU, opc::CMP_B) => {
            format!("CMP{}", cond_suffix(instr.opt1()))
        }
        k if k == op_key(grp::MEM, opc::CMP_A) || k == op_key(grp::MEM, opc::CMP_B) => {
            format!("CMP{}{}", cond_suffix(instr.opt1()), dw_suffix(instr.dw()))
        }

        k if k == op_key(grp::ALU, opc::BITOP) => match instr.opt1() {
            0 => format!("EXTR{}", if instr.bit(12) { ".S" } else { "" }),
            1 => format!("DEP{}", if instr.bit(12) { ".Z" } else { "" }),
            2 => "DSR".to_string(),
            _ => "**BITOP**".to_string(),
        },

        k if k == op_key(grp::ALU, opc::SHAOP) => {
            let dir = match instr.opt1() {
                0 | 1 => "L",
                2 | 3 => "R",
                _ => return "**SHAOP**".to_string(),
            };
            match instr.dw() {
                1 => format!("SH{}1A", dir),
                2 => format!("SH{}2A", dir),
                3 => format!("SH{}3A", dir),
                _ => "**SHAOP**".to_string(),
            }
        }

        k if k == op_key(grp::ALU, opc::IMMOP) => match instr.field_u(20, 2) {
            0 => "ADDIL".to_string(),
            1 => "LDIL".to_string(),
            2 => "LDIL.M".to_string(),
            _ => "LDIL.U".to_string(),
        },

        k if k == op_key(grp::ALU, opc::LDO) => {
            if instr.opt1() == 0 {
                format!("LDO{}", dw_suffix(instr.dw()))
            } else {
                "LDO".to_string()
            }
        }

        k if k == op_key(grp::MEM, opc::LD) => {
            let uncached = if instr.bit(20) { ".U" } else { "" };
            format!("LD{}{}", uncached, dw_suffix(instr.dw()))
        }
        k if k == op_key(grp::MEM, opc::ST) => format!("ST{}", dw_suffix(instr.dw())),
        k if k == op_key(grp::MEM, opc::LDR) => {
            format!("LDR{}", if instr.bit(20) { ".U" } else { "" })
        }
        k if k == op_key(grp::MEM, opc::STC) => "STC".to_string(),

        k if k == op_key(grp::BR, opc::B) => {
            format!("B{}", if instr.bit(19) { ".G" } else { "" })
        }
        k if k == op_key(grp::BR, opc::BE) => "BE".to_string(),
        k if k == op_key(grp::BR, opc::BR) => format!("BR{}", br_width_suffix(instr)),
        k if k == op_key(grp::BR, opc::BV) => format!("BV{}", br_width_suffix(instr)),
        k if k == op_key(grp::BR, opc::BB) => {
            format!("BB{}", if instr.bit(19) { ".T" } else { ".F" })
        }
        k if k == op_key(grp::BR, opc::CBR) => format!("CBR{}", cond_suffix(instr.opt1())),
        k if k == op_key(grp::BR, opc::MBR) => format!("MBR{}", cond_suffix(instr.opt1())),
        k if k == op_key(grp::BR, opc::ABR) => format!("ABR{}", cond_suffix(instr.opt1())),

        k if k == op_key(grp::SYS, opc::MR) => match instr.opt1() {
            0 => "MFCR".to_string(),
            1 => "MTCR".to_string(),
            4 => "MFIA".to_string(),
            5 => "MFIA.L".to_string(),
            6 => "MFIA.M".to_string(),
            7 => "MFIA.U".to_string(),
            _ => "**MROP**".to_string(),
        },

        k if k == op_key(grp::SYS, opc::LPA) => {
            if instr.opt1() == 0 {
                "LPA".to_string()
            } else {
                "**LPAOP**".to_string()
            }
        }
        k if k == op_key(grp::SYS, opc::PRB) => {
            if instr.opt1() == 0 {
                "PRB".to_string()
            } else {
                "**PRBOP**".to_string()
            }
        }

        k if k == op_key(grp::SYS, opc::TLB) => match instr.opt1() {
            0 => "IITLB".to_string(),
            1 => "IDTLB".to_string(),
            2 => "PITLB".to_string(),
            3 => "PDTLB".to_string(),
            _ => "**TLB**".to_string(),
        },

        k if k == op_key(grp::SYS, opc::CA) => match instr.opt1() {
            0 => "PICA".to_string(),
            1 => "PDCA".to_string(),
            2 => "FICA".to_string(),
            3 => "FDCA".to_string(),
            _ => "**CA**".to_string(),
        },

        k if k == op_key(grp::SYS, opc::MST) => match instr.opt1() {
            0 => "RSM".to_string(),
            1 => "SSM".to_string(),
            _ => "**MST**".to_string(),
        },

        k if k == op_key(grp::SYS, opc::RFI) => "RFI".to_string(),
        k if k == op_key(grp::SYS, opc::DIAG) => "DIAG".to_string(),
        k if k == op_key(grp::SYS, opc::TRAP) => "TRAP".to_string(),
        k if k == op_key(grp::ALU, opc::NOP) => "NOP".to_string(),

        other => format!("**OPC:{}**", other),
    }
}

/// Branch-width suffix of BR/BV. `W` (0) is the default and is not printed.
fn br_width_suffix(instr: Instr) -> &'static str {
    match instr.dw() {
        1 => ".D",
        2 => ".Q",
        0 => "",
        _ => ".**",
    }
}

/// The `Rr,ofs(Rb)` / `Rr,Ra(Rb)` operand body shared by the MEM group.
fn mem_operands(instr: Instr, indexed: bool, rdx: u32) -> String {
    if indexed {
        format!("R{},R{}(R{})", instr.reg_r(), instr.reg_a(), instr.reg_b())
    } else {
        format!(
            "R{},{}(R{})",
            instr.reg_r(),
            fmt_num(instr.imm13_scaled() as i64, rdx),
            instr.reg_b()
        )
    }
}

/// The `Rr,[Ra](Rb)` body of the address-operand system instructions.
fn adr_sys_operands(instr: Instr) -> String {
    let mut out = format!("R{},", instr.reg_r());
    if instr.reg_a() != 0 {
        out.push_str(&format!("R{}", instr.reg_a()));
    }
    out.push_str(&format!("(R{})", instr.reg_b()));
    out
}

/// Builds the operand fragment of the instruction.
pub fn format_operands(instr: Instr, rdx: u32) -> String {
    match instr.op_key() {
        k if k == op_key(grp::ALU, opc::ADD)
            || k == op_key(grp::ALU, opc::SUB)
            || k == op_key(grp::ALU, opc::AND)
            || k == op_key(grp::ALU, opc::OR)
            || k == op_key(grp::ALU, opc::XOR)
            || k == op_key(grp::ALU, opc::SHAOP) =>
        {
            if instr.bit(19) {
                format!(
                    "R{},R{},{}",
                    instr.reg_r(),
                    instr.reg_b(),
                    fmt_num(
                        if k == op_key(grp::ALU, opc::SHAOP) {
                            instr.imm13() as i64
                        } else {
                            instr.imm15() as i64
                        },
                        rdx
                    )
                )
            } else {
                format!("R{},R{},R{}", instr.reg_r(), instr.reg_b(), instr.reg_a())
            }
        }

        k if k == op_key(grp::ALU, opc::CMP_A) => {
            format!("R{},R{},R{}", instr.reg_r(), instr.reg_b(), instr.reg_a())
        }
        k if k == op_key(grp::ALU, opc::CMP_B) => {
            format!(
                "R{},R{},{}",
                instr.reg_r(),
                instr.reg_b(),
                fmt_num(instr.imm15() as i64, rdx)
            )
        }

        k if k == op_key(grp::ALU, opc::BITOP) => match instr.opt1() {
            0 => {
                // EXTR
                if instr.bit(13) {
                    format!(
                        "R{},R{},SAR,{}",
                        instr.reg_r(),
                        instr.reg_b(),
                        instr.field_u(0, 6)
                    )
                } else {
                    format!(
                        "R{},R{},{},{}",
                        instr.reg_r(),
                        instr.reg_b(),
                        instr.field_u(6, 6),
                        instr.field_u(0, 6)
                    )
                }
            }
            1 => {
                // DEP
                let src = if instr.bit(14) {
                    format!("{}", instr.field_u(15, 4))
                } else {
                    format!("R{}", instr.reg_b())
                };
                if instr.bit(13) {
                    format!("R{},{},SAR,{}", instr.reg_r(), src, instr.field_u(0, 6))
                } else {
                    format!(
                        "R{},{},{},{}",
                        instr.reg_r(),
                        src,
                        instr.field_u(6, 6),
                        instr.field_u(0, 6)
                    )
                }
            }
            2 => {
                // DSR
                if instr.bit(13) {
                    format!(
                        "R{},R{},R{},SAR",
                        instr.reg_r(),
                        instr.reg_b(),
                        instr.reg_a()
                    )
                } else {
                    format!(
                        "R{},R{},R{},{}",
                        instr.reg_r(),
                        instr.reg_b(),
                        instr.reg_a(),
                        instr.field_u(0, 6)
                    )
                }
            }
            _ => "**BITOP**".to_string(),
        },

        k if k == op_key(grp::ALU, opc::IMMOP) => {
            format!(
                "R{},{}",
                instr.reg_r(),
                fmt_num(instr.imm20() as i64, rdx)
            )
        }

        k if k == op_key(grp::ALU, opc::LDO) => match instr.opt1() {
            0 => mem_operands(instr, false, rdx),
            1 => mem_operands(instr, true, rdx),
            _ => "***".to_string(),
        },

        k if k == op_key(grp::MEM, opc::ADD)
            || k == op_key(grp::MEM, opc::SUB)
            || k == op_key(grp::MEM, opc::AND)
            || k == op_key(grp::MEM, opc::OR)
            || k == op_key(grp::MEM, opc::XOR)
            || k == op_key(grp::MEM, opc::LD)
            || k == op_key(grp::MEM, opc::ST)
            || k == op_key(grp::MEM, opc::LDR)
            || k == op_key(grp::MEM, opc::STC) =>
        {
            mem_operands(instr, instr.bit(19), rdx)
        }

        k if k == op_key(grp::MEM, opc::CMP_A) => mem_operands(instr, false, rdx),
        k if k == op_key(grp::MEM, opc::CMP_B) => mem_operands(instr, true, rdx),

        k if k == op_key(grp::BR, opc::B) => {
            let mut out = fmt_num((instr.imm19() as i64) << 2, rdx);
            if instr.reg_r() != 0 {
                out.push_str(&format!(",R{}", instr.reg_r()));
            }
            out
        }

        k if k == op_key(grp::BR, opc::BE) => {
            let mut out = String::new();
            if instr.imm15() != 0 {
                out.push_str(&fmt_num((instr.imm15() as i64) << 2, rdx));
            }
            out.push_str(&format!("(R{})", instr.reg_b()));
            if instr.reg_r() != 0 {
                out.push_str(&format!(",R{}", instr.reg_r()));
            }
            out
        }

        k if k == op_key(grp::BR, opc::BR) => {
            let mut out = format!("R{}", instr.reg_b());
            if instr.reg_r() != 0 {
                out.push_str(&format!(",R{}", instr.reg_r()));
            }
            out
        }

        k if k == op_key(grp::BR, opc::BV) => {
            let mut out = String::new();
            if instr.reg_a() != 0 {
                out.push_str(&format!("R{}", instr.reg_a()));
            }
            out.push_str(&format!("(R{})", instr.reg_b()));
            if instr.reg_r() != 0 {
                out.push_str(&format!(",R{}", instr.reg_r()));
            }
            out
        }

        k if k == op_key(grp::BR, opc::BB) => {
            let pos = if instr.bit(20) {
                "SAR".to_string()
            } else {
                format!("{}", instr.field_u(13, 6))
            };
            format!(
                "R{},{},{}",
                instr.reg_r(),
                pos,
                fmt_num((instr.imm13() as i64) << 2, rdx)
            )
        }

        k if k == op_key(grp::BR, opc::CBR)
            || k == op_key(grp::BR, opc::MBR)
            || k == op_key(grp::BR, opc::ABR) =>
        {
            format!(
                "R{},R{},{}",
                instr.reg_r(),
                instr.reg_b(),
                fmt_num((instr.imm15() as i64) << 2, rdx)
            )
        }

        k if k == op_key(grp::SYS, opc::MR) => match instr.opt1() {
            0 => format!("R{},C{}", instr.reg_r(), instr.field_u(0, 4)),
            1 => {
                let mut out = format!("R{},C{}", instr.reg_b(), instr.field_u(0, 4));
                if instr.reg_r() != 0 {
                    out.push_str(&format!(",R{}", instr.reg_r()));
                }
                out
            }
            4..=7 => format!("R{}", instr.reg_r()),
            _ => "**MROP**".to_string(),
        },

        k if k == op_key(grp::SYS, opc::LPA) => adr_sys_operands(instr),

        k if k == op_key(grp::SYS, opc::PRB) => {
            let mode = instr.field_u(13, 2);
            if mode == 3 {
                format!("R{},R{},R{}", instr.reg_r(), instr.reg_b(), instr.reg_a())
            } else {
                format!("R{},R{},{}", instr.reg_r(), instr.reg_b(), mode)
            }
        }

        k if k == op_key(grp::SYS, opc::TLB) => match instr.opt1() {
            0 | 1 => format!("R{},R{},R{}", instr.reg_r(), instr.reg_b(), instr.reg_a()),
            2 | 3 => adr_sys_operands(instr),
            _ => "**TLB**".to_string(),
        },

        k if k == op_key(grp::SYS, opc::CA) => adr_sys_operands(instr),

        k if k == op_key(grp::SYS, opc::MST) => {
            format!("R{},{}", instr.reg_r(), instr.field_u(0, 8))
        }

        k if k == op_key(grp::SYS, opc::DIAG) => {
            format!(
                "R{},{},R{},R{}",
                instr.reg_r(),
                (instr.opt1() << 2) | instr.dw(),
                instr.reg_b(),
                instr.reg_a()
            )
        }

        k if k == op_key(grp::SYS, opc::TRAP) => {
            format!(
                "{},R{},R{}",
                (instr.opt1() << 2) | instr.dw(),
                instr.reg_b(),
                instr.reg_a()
            )
        }

        k if k == op_key(grp::SYS, opc::RFI) || k == op_key(grp::ALU, opc::NOP) => String::new(),

        other => format!("**OPC:{}**", other),
    }
}

/// Formats a whole instruction: opcode fragment, a space, operands.
pub fn format_instr(instr: Instr, rdx: u32) -> String {
    let opcode = format_opcode(instr);
    let operands = format_operands(instr, rdx);
    if operands.is_empty() {
        opcode
    } else {
        format!("{} {}", opcode, operands)
    }
}
