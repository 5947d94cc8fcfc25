//! Register File Tests.

use t64_core::common::reg::{ControlRegs, GeneralRegs};

#[test]
fn reg0_reads_zero() {
    let mut regs = GeneralRegs::new();
    regs.write(0, 0x1234);
    assert_eq!(regs.read(0), 0, "writes to R0 are discarded");
}

#[test]
fn general_reg_write_read() {
    let mut regs = GeneralRegs::new();
    for idx in 1..16 {
        regs.write(idx, idx as i64 * 3);
    }
    for idx in 1..16 {
        assert_eq!(regs.read(idx), idx as i64 * 3);
    }
}

#[test]
fn control_regs_hold_all_slots() {
    let mut regs = ControlRegs::new();
    regs.write(0, -1);
    regs.write(15, 42);
    assert_eq!(regs.read(0), -1);
    assert_eq!(regs.read(15), 42);
}

#[test]
fn reset_clears() {
    let mut regs = GeneralRegs::new();
    regs.write(5, 99);
    regs.reset();
    assert_eq!(regs.read(5), 0);
}
