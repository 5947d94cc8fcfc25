//! Branch Execution Tests.
//!
//! Control transfer semantics: IA-relative and computed branches, link
//! registers, conditional forms and the alignment trap.

use crate::common::harness::{TestContext, PSR_X};
use t64_core::common::reg::CR_SHAMT;
use t64_core::common::Trap;
use t64_core::core::PSR_X_BIT;

const BASE: i64 = 0x1000;

#[test]
fn relative_branch_with_link() {
    let mut ctx = TestContext::new();
    ctx.load_program(BASE, &["B 16,R14"]);

    ctx.step(1);

    assert_eq!(ctx.proc().psr_ia(), BASE + 16);
    assert_eq!(ctx.get_reg(14), BASE + 4, "link register holds return IA");
}

#[test]
fn backward_branch() {
    let mut ctx = TestContext::new();
    ctx.store_words(BASE - 8, &[ctx.sim.assemble("NOP").unwrap()]);
    ctx.load_program(BASE, &["B -8"]);

    ctx.step(1);
    assert_eq!(ctx.proc().psr_ia(), BASE - 8);
}

#[test]
fn gate_branch_raises_privilege() {
    let mut ctx = TestContext::new();
    ctx.load_program(BASE, &["B.G 8"]);
    // Start unprivileged; virtual fetch would need a TLB, so fetch from the
    // physical range still needs X. Use a privileged start and verify the
    // bit stays set, then an unprivileged computed case is covered by the
    // privilege tests.
    ctx.step(1);
    assert!(ctx.psr() & (1 << PSR_X_BIT) != 0);
    assert_eq!(ctx.proc().psr_ia(), BASE + 8);
}

#[test]
fn base_branch_through_register() {
    let mut ctx = TestContext::new();
    ctx.load_program(BASE, &["BE 8(R3),R14"]);
    ctx.set_reg(3, 0x2000);

    ctx.step(1);

    assert_eq!(ctx.proc().psr_ia(), 0x2008);
    assert_eq!(ctx.get_reg(14), BASE + 4);
}

#[test]
fn computed_branch_alignment_trap() {
    let mut ctx = TestContext::new();
    ctx.load_program(BASE, &["BR R5"]);
    ctx.set_reg(5, 2);

    ctx.step(1);

    assert_eq!(ctx.proc().last_trap, Some(Trap::InstrAlign(BASE + 2)));
    assert_eq!(ctx.proc().psr_ia(), BASE, "PSR unchanged on trap");
}

#[test]
fn trapping_branch_leaves_link_register() {
    // A misaligned target aborts the instruction before any state change;
    // the link register keeps its old value.
    let mut ctx = TestContext::new();
    ctx.load_program(BASE, &["BR R5,R6"]);
    ctx.set_reg(5, 2);
    ctx.set_reg(6, 0x5A5A);

    ctx.step(1);

    assert_eq!(ctx.proc().last_trap, Some(Trap::InstrAlign(BASE + 2)));
    assert_eq!(ctx.get_reg(6), 0x5A5A, "link register unchanged on trap");

    let mut ctx = TestContext::new();
    ctx.load_program(BASE, &["BV (R5),R6"]);
    ctx.set_reg(5, 0x2002);
    ctx.set_reg(6, 0x5A5A);

    ctx.step(1);

    assert_eq!(ctx.proc().last_trap, Some(Trap::InstrAlign(0x2002)));
    assert_eq!(ctx.get_reg(6), 0x5A5A, "link register unchanged on trap");

    let mut ctx = TestContext::new();
    ctx.load_program(BASE, &["BE (R5),R6"]);
    ctx.set_reg(5, 0x2002);
    ctx.set_reg(6, 0x5A5A);

    ctx.step(1);

    assert_eq!(ctx.proc().last_trap, Some(Trap::InstrAlign(0x2002)));
    assert_eq!(ctx.get_reg(6), 0x5A5A, "link register unchanged on trap");
}

#[test]
fn vectored_branch() {
    let mut ctx = TestContext::new();
    ctx.load_program(BASE, &["BV R3(R5)"]);
    ctx.set_reg(5, 0x2000);
    ctx.set_reg(3, 0x40);

    ctx.step(1);
    assert_eq!(ctx.proc().psr_ia(), 0x2040);
}

#[test]
fn branch_on_bit_taken_and_not() {
    let mut ctx = TestContext::new();
    ctx.load_program(BASE, &["BB.T R3,5,16"]);
    ctx.set_reg(3, 1 << 5);
    ctx.step(1);
    assert_eq!(ctx.proc().psr_ia(), BASE + 16, "bit set, .T taken");

    let mut ctx = TestContext::new();
    ctx.load_program(BASE, &["BB.T R3,5,16"]);
    ctx.set_reg(3, 0);
    ctx.step(1);
    assert_eq!(ctx.proc().psr_ia(), BASE + 4, "bit clear, .T falls through");
}

#[test]
fn branch_on_bit_position_from_shamt() {
    let mut ctx = TestContext::new();
    ctx.load_program(BASE, &["BB.F R3,SAR,8"]);
    ctx.proc_mut().set_control_reg(CR_SHAMT, 63);
    ctx.set_reg(3, 0);
    ctx.step(1);
    assert_eq!(ctx.proc().psr_ia(), BASE + 8, "bit 63 clear, .F taken");
}

#[test]
fn compare_branch() {
    let mut ctx = TestContext::new();
    ctx.load_program(BASE, &["CBR.EQ R1,R2,12"]);
    ctx.set_reg(1, 5);
    ctx.set_reg(2, 5);
    ctx.step(1);
    assert_eq!(ctx.proc().psr_ia(), BASE + 12);

    let mut ctx = TestContext::new();
    ctx.load_program(BASE, &["CBR.EQ R1,R2,12"]);
    ctx.set_reg(1, 5);
    ctx.set_reg(2, 6);
    ctx.step(1);
    assert_eq!(ctx.proc().psr_ia(), BASE + 4);
}

#[test]
fn move_branch_writes_target_register() {
    let mut ctx = TestContext::new();
    ctx.load_program(BASE, &["MBR.NE R1,R2,8"]);
    ctx.set_reg(2, 7);

    ctx.step(1);

    assert_eq!(ctx.get_reg(1), 7, "moved value");
    assert_eq!(ctx.proc().psr_ia(), BASE + 8, "7 != 0 branches");
}

#[test]
fn add_branch_sums_then_tests() {
    let mut ctx = TestContext::new();
    ctx.load_program(BASE, &["ABR.EQ R1,R2,8"]);
    ctx.set_reg(1, 5);
    ctx.set_reg(2, -5);

    ctx.step(1);

    assert_eq!(ctx.get_reg(1), 0);
    assert_eq!(ctx.proc().psr_ia(), BASE + 8, "sum is zero, EQ branches");
}

#[test]
fn add_branch_overflow_traps() {
    let mut ctx = TestContext::new();
    ctx.load_program(BASE, &["ABR.EQ R1,R2,8"]);
    ctx.set_reg(1, i64::MAX);
    ctx.set_reg(2, 1);

    ctx.step(1);
    assert_eq!(ctx.proc().last_trap, Some(Trap::Overflow));
}

#[test]
fn psr_ia_stays_4_aligned() {
    let mut ctx = TestContext::new();
    ctx.load_program(BASE, &["ADD R1,R2,1", "B 8", "NOP"]);
    for _ in 0..3 {
        ctx.step(1);
        assert_eq!(ctx.proc().psr_ia() & 3, 0);
    }
}

#[test]
fn status_bits_survive_branches() {
    let mut ctx = TestContext::new();
    ctx.load_program(BASE, &["B 16"]);
    let psr = ctx.psr();
    assert!(psr & PSR_X != 0);

    ctx.step(1);
    assert!(ctx.psr() & PSR_X != 0, "X bit preserved across branch");
}
