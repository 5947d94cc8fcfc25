//! Address Arithmetic Tests.
//!
//! The 32-bit-offset add is the only addition used for IA advance and
//! effective addresses: the low half wraps, the upper half passes through.

use t64_core::common::bits::add_adr_ofs32;

#[test]
fn upper_half_unchanged() {
    let adr = 0x1234_5678_0000_1000i64;
    let res = add_adr_ofs32(adr, 0x10);
    assert_eq!(res, 0x1234_5678_0000_1010);
}

#[test]
fn low_half_wraps_without_carry() {
    let adr = 0x0000_0002_FFFF_FFFCi64;
    let res = add_adr_ofs32(adr, 8);
    assert_eq!(res, 0x0000_0002_0000_0004, "carry must not reach bit 32");
}

#[test]
fn negative_offset() {
    let adr = 0x0000_0001_0000_0010i64;
    let res = add_adr_ofs32(adr, -16);
    assert_eq!(res, 0x0000_0001_0000_0000);
}

#[test]
fn negative_offset_wraps_low_half() {
    let adr = 0x00AB_0000_0000_0004i64;
    let res = add_adr_ofs32(adr, -8);
    assert_eq!(res, 0x00AB_0000_FFFF_FFFCu64 as i64);
}
