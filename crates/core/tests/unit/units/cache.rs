//! Cache and Coherence Tests.
//!
//! Line states, flush/purge semantics and the two-processor coherence
//! scenario: a write invalidates the peer's shared copy, the peer's next
//! read refetches the written data.

use t64_core::common::bits::store_be;
use t64_core::config::{Config, ProcConfig};
use t64_core::core::Processor;
use t64_core::isa::asm::assemble_line;
use t64_core::sim::{RegKind, Simulator};
use t64_core::units::cache::LineState;

const PSR_X: i64 = 1 << 61;
const LINE: i64 = 0x4000;

/// Two processors (modules 0 and 2) sharing one RAM module (module 1).
fn two_proc_sim() -> Simulator {
    let mut config = Config::default();
    config.processors.push(ProcConfig {
        mod_num: 2,
        ..ProcConfig::default()
    });
    Simulator::new(&config).expect("two-processor system")
}

fn proc(sim: &Simulator, num: u32) -> &Processor {
    sim.system
        .module(num)
        .and_then(|m| m.as_processor())
        .expect("processor module")
}

fn load_program(sim: &mut Simulator, proc_num: u32, adr: i64, lines: &[&str]) {
    for (idx, line) in lines.iter().enumerate() {
        let word = assemble_line(line).unwrap();
        let mut buf = [0u8; 4];
        store_be(&mut buf, word as u64);
        sim.system.write_mem(adr + idx as i64 * 4, &buf).unwrap();
    }
    sim.register_set(proc_num, RegKind::Psr, 0, adr | PSR_X)
        .unwrap();
}

fn set_reg(sim: &mut Simulator, proc_num: u32, reg: usize, val: i64) {
    sim.register_set(proc_num, RegKind::General, reg, val).unwrap();
}

// ══════════════════════════════════════════════════════════
// 1. Line states on a single processor
// ══════════════════════════════════════════════════════════

#[test]
fn read_fills_shared() {
    let mut sim = two_proc_sim();
    load_program(&mut sim, 0, 0x100, &["LD R1,0(R6)"]);
    set_reg(&mut sim, 0, 6, LINE);

    sim.step(1); // processor 0 runs first in round-robin order

    assert_eq!(proc(&sim, 0).d_cache.state_of(LINE), LineState::Shared);
}

#[test]
fn write_fills_exclusive_modified() {
    let mut sim = two_proc_sim();
    load_program(&mut sim, 0, 0x100, &["ST R1,0(R6)"]);
    set_reg(&mut sim, 0, 1, 7);
    set_reg(&mut sim, 0, 6, LINE);

    sim.step(1);

    assert_eq!(
        proc(&sim, 0).d_cache.state_of(LINE),
        LineState::ExclusiveModified
    );
}

#[test]
fn flush_writes_back_and_shares() {
    let mut sim = two_proc_sim();
    load_program(&mut sim, 0, 0x100, &["ST R1,0(R6)", "FDCA R2,(R6)"]);
    set_reg(&mut sim, 0, 1, 1234);
    set_reg(&mut sim, 0, 6, LINE);

    sim.step(3); // ST, (proc 2 idles at 0), FDCA

    assert_eq!(proc(&sim, 0).d_cache.state_of(LINE), LineState::Shared);
    let mut buf = [0u8; 8];
    sim.read_mem(LINE, &mut buf).unwrap();
    assert_eq!(i64::from_be_bytes(buf), 1234, "dirty data written back");
}

// ══════════════════════════════════════════════════════════
// 2. Two-processor coherence
// ══════════════════════════════════════════════════════════

#[test]
fn write_invalidates_peer_and_reread_fetches_new_data() {
    let mut sim = two_proc_sim();

    // Processor 0: read, idle, read again.
    load_program(&mut sim, 0, 0x100, &["LD.W R1,0(R6)", "NOP", "LD.W R4,0(R6)"]);
    // Processor 2: read, write, idle.
    load_program(&mut sim, 2, 0x200, &["LD.W R1,0(R6)", "ST.W R3,0(R6)", "NOP"]);
    set_reg(&mut sim, 0, 6, LINE);
    set_reg(&mut sim, 2, 6, LINE);
    set_reg(&mut sim, 2, 3, 0x55667788);

    // Round-robin: P0 LD, P2 LD.
    sim.step(2);
    assert_eq!(proc(&sim, 0).d_cache.state_of(LINE), LineState::Shared);
    assert_eq!(proc(&sim, 2).d_cache.state_of(LINE), LineState::Shared);

    // P0 NOP, P2 ST: the peer's copy must invalidate.
    sim.step(2);
    assert_eq!(proc(&sim, 0).d_cache.state_of(LINE), LineState::Invalid);
    assert_eq!(
        proc(&sim, 2).d_cache.state_of(LINE),
        LineState::ExclusiveModified
    );

    // P0 rereads: refetch as shared, observing the new data; the writer's
    // line downgrades to shared with write-back.
    sim.step(1);
    assert_eq!(proc(&sim, 0).general_reg(4), 0x55667788);
    assert_eq!(proc(&sim, 0).d_cache.state_of(LINE), LineState::Shared);
    assert_eq!(proc(&sim, 2).d_cache.state_of(LINE), LineState::Shared);
}

#[test]
fn at_most_one_exclusive_holder() {
    let mut sim = two_proc_sim();

    load_program(&mut sim, 0, 0x100, &["ST.W R3,0(R6)"]);
    load_program(&mut sim, 2, 0x200, &["ST.W R3,4(R6)"]);
    set_reg(&mut sim, 0, 6, LINE);
    set_reg(&mut sim, 2, 6, LINE);
    set_reg(&mut sim, 0, 3, 1);
    set_reg(&mut sim, 2, 3, 2);

    // Both write into the same line, one after the other.
    sim.step(2);

    let exclusive_holders = [proc(&sim, 0), proc(&sim, 2)]
        .iter()
        .filter(|p| {
            matches!(
                p.d_cache.state_of(LINE),
                LineState::ExclusiveClean | LineState::ExclusiveModified
            )
        })
        .count();
    assert!(exclusive_holders <= 1, "single exclusive owner invariant");

    // Both stores land in the line despite the ping-pong.
    let mut buf = [0u8; 4];
    sim.read_mem(LINE, &mut buf).unwrap();
    assert_eq!(i32::from_be_bytes(buf), 1);
    sim.read_mem(LINE + 4, &mut buf).unwrap();
    assert_eq!(i32::from_be_bytes(buf), 2);
}

#[test]
fn uncached_write_purges_cached_copies() {
    let mut sim = two_proc_sim();
    load_program(&mut sim, 0, 0x100, &["LD R1,0(R6)"]);
    set_reg(&mut sim, 0, 6, LINE);
    sim.step(1);
    assert_eq!(proc(&sim, 0).d_cache.state_of(LINE), LineState::Shared);

    // Debugger write goes out uncached and snoops everyone.
    sim.write_mem(LINE, &9i64.to_be_bytes()).unwrap();
    assert_eq!(proc(&sim, 0).d_cache.state_of(LINE), LineState::Invalid);
}
