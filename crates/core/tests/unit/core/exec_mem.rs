//! Load/Store Execution Tests.
//!
//! Physical and translated data paths: store/load round trips, alignment
//! and privilege traps, TLB miss/insert recovery, and the LDR/STC
//! reservation behaviour.

use crate::common::harness::{TestContext, PSR_X};
use t64_core::common::reg::{CR_IARG0, CR_TVA};
use t64_core::common::Trap;
use t64_core::config::{Config, MemConfig};
use t64_core::sim::Simulator;

const BASE: i64 = 0x1000;

// ══════════════════════════════════════════════════════════
// 1. Physical path
// ══════════════════════════════════════════════════════════

#[test]
fn store_load_roundtrip_word() {
    let mut ctx = TestContext::new();
    ctx.load_program(BASE, &["ST.W R5,16(R6)", "LD.W R7,16(R6)"]);
    ctx.set_reg(5, 0xDEADBEEFu32 as i64);
    ctx.set_reg(6, 0x4000);

    ctx.step(2);

    assert_eq!(
        ctx.get_reg(7),
        0xDEADBEEFu32 as i32 as i64,
        "loaded value is sign-extended"
    );
}

#[test]
fn store_load_all_widths() {
    let mut ctx = TestContext::new();
    ctx.load_program(
        BASE,
        &[
            "ST.B R5,0(R6)",
            "ST.H R5,2(R6)",
            "ST R5,8(R6)",
            "LD.B R1,0(R6)",
            "LD.H R2,2(R6)",
            "LD R3,8(R6)",
        ],
    );
    ctx.set_reg(5, 0x1122_3344_5566_7788);
    ctx.set_reg(6, 0x4000);

    ctx.step(6);

    assert_eq!(ctx.get_reg(1), 0xFFFF_FFFF_FFFF_FF88u64 as i64);
    assert_eq!(ctx.get_reg(2), 0x7788);
    assert_eq!(ctx.get_reg(3), 0x1122_3344_5566_7788);
}

#[test]
fn indexed_addressing() {
    let mut ctx = TestContext::new();
    ctx.load_program(BASE, &["ST R5,R4(R6)", "LD R7,R4(R6)"]);
    ctx.set_reg(4, 2); // scaled by the double-word width: offset 16
    ctx.set_reg(5, 77);
    ctx.set_reg(6, 0x4000);

    ctx.step(2);

    assert_eq!(ctx.get_reg(7), 77);
    let mut buf = [0u8; 8];
    ctx.sim.read_mem(0x4010, &mut buf).unwrap();
    assert_eq!(u64::from_be_bytes(buf), 77);
}

#[test]
fn misaligned_word_load_traps() {
    let mut ctx = TestContext::new();
    ctx.load_program(BASE, &["LD.W R7,0(R6)"]);
    ctx.set_reg(6, 0x1002);

    ctx.step(1);

    assert_eq!(ctx.proc().last_trap, Some(Trap::DataAlign(0x1002)));
}

#[test]
fn physical_access_requires_privilege() {
    let mut ctx = TestContext::new();
    ctx.load_program(BASE, &["NOP", "LD R1,0(R6)"]);
    ctx.set_reg(6, 0x4000);
    ctx.step(1);

    // Drop the X bit: the next physical access must trap.
    let psr = ctx.psr();
    ctx.set_psr(psr & !PSR_X);
    ctx.step(1);

    assert_eq!(ctx.proc().last_trap, Some(Trap::PrivOp));
}

// ══════════════════════════════════════════════════════════
// 2. Translated path
// ══════════════════════════════════════════════════════════

/// A virtual address above the physical memory limit.
const VADR: i64 = 0x0000_0001_0000_0000;

/// TLB info word mapping to physical page `p_page` with read-write access.
fn rw_info(p_page: i64) -> i64 {
    (2 << 40) | (p_page << 12)
}

#[test]
fn tlb_miss_then_insert_then_load() {
    let mut ctx = TestContext::new();
    // Handler area: insert the translation, that is all.
    ctx.store_words(0x2000, &[ctx.sim.assemble("IDTLB R0,R2,R3").unwrap()]);
    ctx.load_program(BASE, &["LD R1,0(R2)"]);
    ctx.proc_mut().set_control_reg(CR_TVA, 0x2000);
    ctx.set_reg(2, VADR);
    ctx.set_reg(3, rw_info(0x3)); // maps to physical page 0x3000

    // Seed the backing memory.
    ctx.sim.write_mem(0x3000, &42i64.to_be_bytes()).unwrap();

    // First attempt: miss, divert to the handler.
    ctx.step(1);
    assert_eq!(ctx.proc().last_trap, Some(Trap::DataTlbMiss(VADR)));
    assert_eq!(ctx.proc().control_reg(CR_IARG0), VADR);

    // Handler inserts the mapping.
    ctx.step(1);

    // Retry the load.
    ctx.set_psr(BASE | PSR_X);
    ctx.step(1);
    assert_eq!(ctx.get_reg(1), 42);
    assert_eq!(ctx.proc().stats.dtlb_hits, 1);
}

#[test]
fn write_to_read_only_page_traps() {
    let mut ctx = TestContext::new();
    ctx.store_words(0x2000, &[ctx.sim.assemble("NOP").unwrap()]);
    ctx.load_program(BASE, &["ST R1,0(R2)"]);
    ctx.proc_mut().set_control_reg(CR_TVA, 0x2000);
    ctx.set_reg(2, VADR);

    // Insert a read-only mapping directly.
    let info = (1 << 40) | (0x3 << 12);
    ctx.proc_mut()
        .d_tlb
        .insert(t64_core::common::VirtAddr::new(VADR), info);

    ctx.step(1);
    assert_eq!(ctx.proc().last_trap, Some(Trap::DataProtection(VADR)));
}

// ══════════════════════════════════════════════════════════
// 3. ROM protection
// ══════════════════════════════════════════════════════════

#[test]
fn store_to_rom_traps_data_protection() {
    let mut config = Config::default();
    config.memories.push(MemConfig {
        mod_num: 2,
        read_only: true,
        spa_adr: 0x0100_0000,
        spa_len: 0x1000,
    });
    let sim = Simulator::new(&config).unwrap();
    let mut ctx = TestContext { sim };

    ctx.load_program(BASE, &["ST R1,0(R6)"]);
    ctx.set_reg(1, 7);
    ctx.set_reg(6, 0x0100_0000);

    ctx.step(1);

    assert_eq!(
        ctx.proc().last_trap,
        Some(Trap::DataProtection(0x0100_0000))
    );
}

// ══════════════════════════════════════════════════════════
// 4. Reservations
// ══════════════════════════════════════════════════════════

#[test]
fn ldr_stc_pair_succeeds() {
    let mut ctx = TestContext::new();
    ctx.load_program(BASE, &["LDR R1,0(R6)", "ADD R1,R1,1", "STC R1,0(R6)"]);
    ctx.set_reg(6, 0x4000);
    ctx.sim.write_mem(0x4000, &5i64.to_be_bytes()).unwrap();

    ctx.step(3);

    let mut buf = [0u8; 8];
    ctx.sim.read_mem(0x4000, &mut buf).unwrap();
    assert_eq!(i64::from_be_bytes(buf), 6, "conditional store performed");
}

#[test]
fn stc_without_reservation_skips_store() {
    let mut ctx = TestContext::new();
    ctx.load_program(BASE, &["STC R1,0(R6)"]);
    ctx.set_reg(1, 99);
    ctx.set_reg(6, 0x4000);

    ctx.step(1);

    let mut buf = [0u8; 8];
    ctx.sim.read_mem(0x4000, &mut buf).unwrap();
    assert_eq!(i64::from_be_bytes(buf), 0, "store skipped");
}

#[test]
fn cache_purge_clears_reservation() {
    let mut ctx = TestContext::new();
    ctx.load_program(
        BASE,
        &["LDR R1,0(R6)", "PDCA R2,(R6)", "STC R3,0(R6)"],
    );
    ctx.set_reg(3, 99);
    ctx.set_reg(6, 0x4000);
    ctx.sim.write_mem(0x4000, &5i64.to_be_bytes()).unwrap();

    ctx.step(3);

    let mut buf = [0u8; 8];
    ctx.sim.read_mem(0x4000, &mut buf).unwrap();
    assert_eq!(i64::from_be_bytes(buf), 5, "purge dropped the reservation");
}
