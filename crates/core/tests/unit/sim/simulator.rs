//! Simulator Façade Tests.
//!
//! Stepping, run-to-halt, the debugger register surface, the environment
//! store and listing assembly through the file-backed source.

use std::io::Write as _;

use crate::common::harness::{TestContext, PROC, PSR_X};
use t64_core::sim::env::{EnvValue, ENV_EXIT_CODE, ENV_RDX_DEFAULT};
use t64_core::sim::{loader, RegKind};

const BASE: i64 = 0x1000;

// ══════════════════════════════════════════════════════════
// 1. Stepping
// ══════════════════════════════════════════════════════════

#[test]
fn step_n_executes_n_instructions() {
    let mut ctx = TestContext::new();
    ctx.load_program(BASE, &["ADD R1,R1,1"; 5]);

    ctx.step(3);
    assert_eq!(ctx.get_reg(1), 3);
    assert_eq!(ctx.proc().stats.instructions, 3);

    ctx.step(2);
    assert_eq!(ctx.get_reg(1), 5);
}

#[test]
fn run_stops_at_halt() {
    let mut ctx = TestContext::new();
    // TRAP with no vector configured halts the processor.
    ctx.load_program(BASE, &["ADD R1,R1,1", "TRAP 0,R0,R0", "ADD R1,R1,1"]);

    let stepped = ctx.sim.run(1000);

    assert!(stepped <= 3, "stopped at the halt trap");
    assert_eq!(ctx.get_reg(1), 1, "third instruction never ran");
    assert!(ctx.sim.all_halted());
}

#[test]
fn reset_then_rerun() {
    let mut ctx = TestContext::new();
    ctx.load_program(BASE, &["ADD R1,R1,1"]);
    ctx.step(1);
    assert_eq!(ctx.get_reg(1), 1);

    ctx.sim.reset();
    assert_eq!(ctx.get_reg(1), 0);
    assert_eq!(ctx.psr(), 0);
}

// ══════════════════════════════════════════════════════════
// 2. Debugger surface
// ══════════════════════════════════════════════════════════

#[test]
fn register_get_set_kinds() {
    let mut ctx = TestContext::new();

    ctx.sim.register_set(PROC, RegKind::General, 3, 42).unwrap();
    assert_eq!(ctx.sim.register_get(PROC, RegKind::General, 3).unwrap(), 42);

    ctx.sim.register_set(PROC, RegKind::Control, 2, 9).unwrap();
    assert_eq!(ctx.sim.register_get(PROC, RegKind::Control, 2).unwrap(), 9);

    ctx.sim
        .register_set(PROC, RegKind::Psr, 0, BASE | PSR_X)
        .unwrap();
    assert_eq!(
        ctx.sim.register_get(PROC, RegKind::Psr, 0).unwrap(),
        BASE | PSR_X
    );
}

#[test]
fn register_access_rejects_non_processor() {
    let mut ctx = TestContext::new();
    assert!(ctx.sim.register_get(1, RegKind::General, 0).is_err());
    assert!(ctx.sim.register_set(7, RegKind::General, 0, 1).is_err());
}

#[test]
fn assemble_disassemble_passthrough() {
    let ctx = TestContext::new();
    let word = ctx.sim.assemble("ADD R1,R2,5").unwrap();
    let (opcode, operands) = ctx.sim.disassemble(word, 10);
    assert_eq!(opcode, "ADD");
    assert_eq!(operands, "R1,R2,5");
}

// ══════════════════════════════════════════════════════════
// 3. Environment store
// ══════════════════════════════════════════════════════════

#[test]
fn env_defaults_present() {
    let ctx = TestContext::new();
    assert_eq!(ctx.sim.env.get_int(ENV_RDX_DEFAULT, 0), 16);
    assert_eq!(ctx.sim.env.get_int(ENV_EXIT_CODE, -1), 0);
}

#[test]
fn env_set_get_user_variable() {
    let mut ctx = TestContext::new();
    ctx.sim.env.set("MY_FLAG", EnvValue::Bool(true)).unwrap();
    assert!(ctx.sim.env.get_bool("MY_FLAG", false));

    ctx.sim
        .env
        .set("MY_NAME", EnvValue::Str("hello".into()))
        .unwrap();
    assert_eq!(ctx.sim.env.get_str("MY_NAME", ""), "hello");
}

#[test]
fn env_read_only_rejected() {
    let mut ctx = TestContext::new();
    assert!(ctx
        .sim
        .env
        .set("PROG_VERSION", EnvValue::Str("x".into()))
        .is_err());
}

#[test]
fn env_remove_rules() {
    let mut ctx = TestContext::new();
    ctx.sim.env.set("TEMP", EnvValue::Int(1)).unwrap();
    ctx.sim.env.remove("TEMP").unwrap();
    assert!(ctx.sim.env.get("TEMP").is_none());
    assert!(ctx.sim.env.remove("RDX_DEFAULT").is_err(), "predefined stays");
    assert!(ctx.sim.env.remove("NO_SUCH").is_err());
}

// ══════════════════════════════════════════════════════════
// 4. Loader
// ══════════════════════════════════════════════════════════

#[test]
fn listing_assembles_and_loads() {
    let dir = std::env::temp_dir().join("t64_listing_test");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("prog.lst");
    {
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "ADD R1,R2,5 ; immediate form").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "; a full-line comment").unwrap();
        writeln!(file, "NOP").unwrap();
    }

    let mut ctx = TestContext::new();
    let count = loader::load_listing(&mut ctx.sim.system, BASE, &path).unwrap();
    assert_eq!(count, 2);

    ctx.set_psr(BASE | PSR_X);
    ctx.set_reg(2, 7);
    ctx.step(2);
    assert_eq!(ctx.get_reg(1), 12);

    std::fs::remove_file(&path).ok();
}

#[test]
fn listing_error_carries_position() {
    let dir = std::env::temp_dir().join("t64_listing_err");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("bad.lst");
    std::fs::write(&path, "ADD R1 R2\n").unwrap();

    let err = loader::assemble_listing(&path).unwrap_err();
    assert!(format!("{}", err).contains("comma"), "diagnostic: {}", err);

    std::fs::remove_file(&path).ok();
}

#[test]
fn missing_file_reported() {
    assert!(loader::load_binary(std::path::Path::new("/no/such/file")).is_err());
}
