//! One-Line Assembler Tests.
//!
//! Encoding checks for the instruction forms, option handling rules and the
//! error taxonomy (id plus character position).

use t64_core::common::error::AsmErrorId;
use t64_core::isa::asm::assemble_line;
use t64_core::isa::instruction::InstrBits;

fn asm(line: &str) -> u32 {
    assemble_line(line).unwrap_or_else(|e| panic!("asm {:?}: {}", line, e))
}

fn asm_err(line: &str) -> AsmErrorId {
    assemble_line(line).expect_err(&format!("expected error for {:?}", line)).id
}

// ══════════════════════════════════════════════════════════
// 1. Instruction forms
// ══════════════════════════════════════════════════════════

#[test]
fn add_immediate_form() {
    let word = asm("ADD R1,R2,5");
    assert_eq!(word, (1 << 22) | (1 << 19) | (2 << 15) | 5);
}

#[test]
fn add_register_form() {
    let word = asm("ADD R1,R2,R3");
    assert_eq!(word, (1 << 22) | (2 << 15) | (3 << 9));
}

#[test]
fn add_memory_form_selects_mem_group() {
    let word = asm("ADD R1,8(R2)");
    assert_eq!(word.group(), 1, "offset operand produces the MEM form");
    assert_eq!(word.imm13_scaled(), 8);
    assert_eq!(word.reg_b(), 2);
}

#[test]
fn ld_defaults_to_double_width() {
    let word = asm("LD R1,8(R2)");
    assert_eq!(word.dw(), 3);
    assert_eq!(word.imm13(), 1, "offset is stored scaled");
}

#[test]
fn ld_byte_width_unscaled() {
    let word = asm("LD.B R1,5(R2)");
    assert_eq!(word.dw(), 0);
    assert_eq!(word.imm13(), 5);
}

#[test]
fn ld_indexed_form_sets_bit19() {
    let word = asm("LD R1,R3(R2)");
    assert!(word.bit(19));
    assert_eq!(word.reg_a(), 3);
}

#[test]
fn cmp_immediate_uses_cmp_b_family() {
    let word = asm("CMP.EQ R1,R2,7");
    assert_eq!(word.op_code(), 7);
    assert_eq!(word.opt1(), 0, "EQ condition");
}

#[test]
fn cmp_register_uses_cmp_a_family() {
    let word = asm("CMP.LT R1,R2,R3");
    assert_eq!(word.op_code(), 6);
    assert_eq!(word.opt1(), 1, "LT condition");
}

#[test]
fn extr_with_sar_position() {
    let word = asm("EXTR.S R1,R2,SAR,12");
    assert!(word.bit(13), "SAR selects the shift-amount register");
    assert!(word.bit(12), "signed extract");
    assert_eq!(word.field_u(0, 6), 12);
}

#[test]
fn dep_immediate_source() {
    let word = asm("DEP R1,9,4,4");
    assert!(word.bit(14), "numeric source sets the immediate bit");
    assert_eq!(word.field_u(15, 4), 9);
}

#[test]
fn ldil_variants() {
    assert_eq!(asm("LDIL R1,1").field_u(20, 2), 1);
    assert_eq!(asm("LDIL.M R1,1").field_u(20, 2), 2);
    assert_eq!(asm("LDIL.U R1,1").field_u(20, 2), 3);
    assert_eq!(asm("ADDIL R1,1").field_u(20, 2), 0);
}

#[test]
fn branch_offset_scaled() {
    let word = asm("B 64");
    assert_eq!(word.imm19(), 16);
}

#[test]
fn branch_with_link_register() {
    let word = asm("B 8,R14");
    assert_eq!(word.reg_r(), 14);
}

#[test]
fn bb_requires_test_option() {
    let word = asm("BB.T R3,5,16");
    assert!(word.bit(19));
    assert_eq!(word.field_u(13, 6), 5);
    assert_eq!(word.imm13(), 4);
}

#[test]
fn register_aliases_resolve() {
    // SP is R15, RL is R14, SAR is C2.
    assert_eq!(asm("ADD SP,RL,R0"), asm("ADD R15,R14,R0"));
    assert_eq!(asm("MFCR R1,SAR"), asm("MFCR R1,C2"));
}

#[test]
fn qualified_constants() {
    // L%: bits 12..31 of the value; R%: low 12 bits.
    let full = 0x12345i64;
    let upper = (full & 0xFFFF_F000) >> 12;
    let lower = full & 0xFFF;
    assert_eq!(asm("LDIL R1,L%0x12345").imm20() as i64, upper);
    assert_eq!(asm("ADD R1,R2,R%0x12345").imm15() as i64, lower);
}

#[test]
fn expressions_in_operands() {
    assert_eq!(asm("ADD R1,R2,2+3"), asm("ADD R1,R2,5"));
    assert_eq!(asm("ADD R1,R2,(2*8)-1"), asm("ADD R1,R2,15"));
    assert_eq!(asm("ADD R1,R2,0x10|0x1"), asm("ADD R1,R2,17"));
}

#[test]
fn numeric_literal_forms() {
    assert_eq!(asm("ADD R1,R2,0x1F"), asm("ADD R1,R2,31"));
    assert_eq!(asm("ADD R1,R2,0b101"), asm("ADD R1,R2,5"));
    assert_eq!(asm("ADD R1,R2,1_000"), asm("ADD R1,R2,1000"));
}

#[test]
fn comment_terminates_line() {
    assert_eq!(asm("NOP ; trailing words"), asm("NOP"));
}

// ══════════════════════════════════════════════════════════
// 2. Option rules
// ══════════════════════════════════════════════════════════

#[test]
fn options_accumulate_across_groups() {
    assert_eq!(asm("AND.C.N R1,R2,R3"), asm("AND.CN R1,R2,R3"));
}

#[test]
fn duplicate_width_rejected() {
    assert_eq!(asm_err("LD.B.W R1,0(R2)"), AsmErrorId::DupOpt);
}

#[test]
fn duplicate_condition_rejected() {
    assert_eq!(asm_err("CMP.EQ.NE R1,R2,R3"), AsmErrorId::DupOpt);
}

#[test]
fn disallowed_option_rejected() {
    assert_eq!(asm_err("EXTR.W R1,R2,0,8"), AsmErrorId::InvalidOpt);
    assert_eq!(asm_err("ADDIL.L R1,5"), AsmErrorId::InvalidOpt);
}

#[test]
fn cmp_without_condition_rejected() {
    assert_eq!(asm_err("CMP R1,R2,R3"), AsmErrorId::InvalidInstrMode);
}

#[test]
fn bb_without_test_rejected() {
    assert_eq!(asm_err("BB R1,5,16"), AsmErrorId::ExpectedInstrOpt);
}

// ══════════════════════════════════════════════════════════
// 3. Ranges and diagnostics
// ══════════════════════════════════════════════════════════

#[test]
fn imm13_range_boundary() {
    // Unscaled byte accesses expose the raw 13-bit signed range.
    assert!(assemble_line("LD.B R1,4095(R2)").is_ok());
    assert!(assemble_line("LD.B R1,-4096(R2)").is_ok());
    assert_eq!(asm_err("LD.B R1,4096(R2)"), AsmErrorId::ImmRange);
    assert_eq!(asm_err("LD.B R1,-4097(R2)"), AsmErrorId::ImmRange);
}

#[test]
fn imm15_range_boundary() {
    assert!(assemble_line("ADD R1,R2,16383").is_ok());
    assert_eq!(asm_err("ADD R1,R2,16384"), AsmErrorId::ImmRange);
}

#[test]
fn misaligned_offset_rejected() {
    assert_eq!(asm_err("LD.W R1,2(R2)"), AsmErrorId::InvalidOfs);
    assert_eq!(asm_err("B 6"), AsmErrorId::InvalidOfs);
}

#[test]
fn extr_range_past_word_rejected() {
    assert_eq!(asm_err("EXTR R1,R2,60,8"), AsmErrorId::BitRangeExceeds);
}

#[test]
fn unknown_mnemonic_reports_position() {
    let err = assemble_line("FROB R1,R2,R3").unwrap_err();
    assert_eq!(err.id, AsmErrorId::ExpectedOpCode);
    assert_eq!(err.pos, 0);
}

#[test]
fn error_position_points_into_line() {
    let err = assemble_line("ADD R1 R2").unwrap_err();
    assert_eq!(err.id, AsmErrorId::ExpectedComma);
    assert!(err.pos >= 7, "position {} should be at the second operand", err.pos);
}

#[test]
fn extra_tokens_rejected() {
    assert_eq!(asm_err("NOP R1"), AsmErrorId::ExtraTokenInStr);
}

#[test]
fn numeric_overflow_in_expression() {
    let err = asm_err("ADD R1,R2,9223372036854775807+1");
    assert_eq!(err, AsmErrorId::NumericOverflow);
}

#[test]
fn invalid_binary_digit() {
    assert_eq!(asm_err("ADD R1,R2,0b102"), AsmErrorId::InvalidNum);
}
