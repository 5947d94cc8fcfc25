//! Trap, bus error and diagnostic definitions.
//!
//! This module defines the error values used across the simulator:
//! 1. **Traps:** synchronous exceptions raised during instruction execution.
//!    A trap is a plain value carried in a `Result`; it unwinds through the
//!    dispatch and is caught exactly once, at the processor step loop.
//! 2. **Bus errors:** failures of physical memory access, converted to traps
//!    or reported as fatal runaway conditions.
//! 3. **Assembler errors:** an error id plus the character position of the
//!    offending token.
//! 4. **Simulator errors:** the single-line failures surfaced by the command
//!    layer (invalid argument, missing file, and so on).

use std::fmt;

use crate::common::{Instr, Word};

/// Execution traps of the T64 architecture.
///
/// The associated values are the trap arguments recorded in `IARG0`/`IARG1`
/// when the trap is taken; the saved PSR and instruction word are captured by
/// the step loop, which has them at hand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trap {
    /// Instruction fetch found no matching I-TLB entry. Carries the address.
    InstrTlbMiss(Word),
    /// Data access found no matching D-TLB entry. Carries the address.
    DataTlbMiss(Word),
    /// Instruction address not 4-aligned. Carries the address.
    InstrAlign(Word),
    /// Data address not naturally aligned for its width. Carries the address.
    DataAlign(Word),
    /// Instruction fetch failed the region or access-rights check.
    InstrProtection(Word),
    /// Data access failed the region, access-rights or ROM-write check.
    DataProtection(Word),
    /// Privileged operation attempted without PSR.X set.
    PrivOp,
    /// Signed arithmetic overflow.
    Overflow,
    /// Undefined or malformed instruction encoding.
    IllegalInstr(Instr),
    /// DIAG instruction. Carries the 5-bit option and both argument registers.
    Diag { opt: u32, arg0: Word, arg1: Word },
    /// TRAP instruction. Carries the 5-bit option and both argument registers.
    Program { opt: u32, arg0: Word, arg1: Word },
}

impl Trap {
    /// Trap arguments as recorded in the IARG control registers.
    pub fn args(&self) -> (Word, Word) {
        match *self {
            Trap::InstrTlbMiss(adr)
            | Trap::DataTlbMiss(adr)
            | Trap::InstrAlign(adr)
            | Trap::DataAlign(adr)
            | Trap::InstrProtection(adr)
            | Trap::DataProtection(adr) => (adr, 0),
            Trap::PrivOp | Trap::Overflow => (0, 0),
            Trap::IllegalInstr(instr) => (instr as Word, 0),
            Trap::Diag { arg0, arg1, .. } | Trap::Program { arg0, arg1, .. } => (arg0, arg1),
        }
    }
}

impl fmt::Display for Trap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trap::InstrTlbMiss(adr) => write!(f, "instr-tlb-miss({:#x})", adr),
            Trap::DataTlbMiss(adr) => write!(f, "data-tlb-miss({:#x})", adr),
            Trap::InstrAlign(adr) => write!(f, "instr-align({:#x})", adr),
            Trap::DataAlign(adr) => write!(f, "data-align({:#x})", adr),
            Trap::InstrProtection(adr) => write!(f, "instr-protection({:#x})", adr),
            Trap::DataProtection(adr) => write!(f, "data-protection({:#x})", adr),
            Trap::PrivOp => write!(f, "priv-op"),
            Trap::Overflow => write!(f, "overflow"),
            Trap::IllegalInstr(instr) => write!(f, "illegal-instr({:#010x})", instr),
            Trap::Diag { opt, .. } => write!(f, "diag({})", opt),
            Trap::Program { opt, .. } => write!(f, "trap({})", opt),
        }
    }
}

impl std::error::Error for Trap {}

/// Failures of a bus-level physical memory access.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusError {
    /// No module's SPA range covers the address. A runaway condition.
    NoTarget(Word),
    /// Write attempted to a read-only module.
    ReadOnly(Word),
    /// Access runs past the end of the owning module.
    Range(Word),
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusError::NoTarget(adr) => write!(f, "no module serves address {:#x}", adr),
            BusError::ReadOnly(adr) => write!(f, "write to read-only memory at {:#x}", adr),
            BusError::Range(adr) => write!(f, "access beyond module limit at {:#x}", adr),
        }
    }
}

impl std::error::Error for BusError {}

/// Assembler and expression parser error identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AsmErrorId {
    ExtraTokenInStr,
    InvalidChar,
    InvalidExpr,
    InvalidNum,
    InvalidOpCode,
    InvalidInstrMode,
    InvalidOfs,
    InvalidOpt,
    ExpectedNumeric,
    ExpectedComma,
    ExpectedLparen,
    ExpectedRparen,
    ExpectedOpCode,
    ExpectedInstrOpt,
    ExpectedGeneralReg,
    ExpectedControlReg,
    ExpectedPosArg,
    ExpectedLenArg,
    ExpectedBrOfs,
    ExpectedPrbArg,
    ExpectedDiagOp,
    BitRangeExceeds,
    UnexpectedEos,
    ExprTypeMatch,
    NumericOverflow,
    ImmRange,
    DupOpt,
}

impl AsmErrorId {
    /// Human-readable message for the error id.
    pub fn message(&self) -> &'static str {
        match self {
            AsmErrorId::ExtraTokenInStr => "Extra tokens in input line",
            AsmErrorId::InvalidChar => "Invalid char in input line",
            AsmErrorId::InvalidExpr => "Invalid expression",
            AsmErrorId::InvalidNum => "Invalid number",
            AsmErrorId::InvalidOpCode => "Invalid opCode",
            AsmErrorId::InvalidInstrMode => "Invalid instruction mode",
            AsmErrorId::InvalidOfs => "Invalid offset",
            AsmErrorId::InvalidOpt => "Invalid instruction option",
            AsmErrorId::ExpectedNumeric => "Expected a numeric value",
            AsmErrorId::ExpectedComma => "Expected a comma",
            AsmErrorId::ExpectedLparen => "Expected a left parenthesis",
            AsmErrorId::ExpectedRparen => "Expected a right parenthesis",
            AsmErrorId::ExpectedOpCode => "Expected an opCode",
            AsmErrorId::ExpectedInstrOpt => "Expected an instruction option",
            AsmErrorId::ExpectedGeneralReg => "Expected a general register",
            AsmErrorId::ExpectedControlReg => "Expected a control register",
            AsmErrorId::ExpectedPosArg => "Expected a position argument",
            AsmErrorId::ExpectedLenArg => "Expected a length argument",
            AsmErrorId::ExpectedBrOfs => "Expected a branch offset",
            AsmErrorId::ExpectedPrbArg => "Expected the PRB argument",
            AsmErrorId::ExpectedDiagOp => "Expected the DIAG opCode",
            AsmErrorId::BitRangeExceeds => "Bit range exceeds word size",
            AsmErrorId::UnexpectedEos => "Unexpected end of string",
            AsmErrorId::ExprTypeMatch => "Expression type mismatch",
            AsmErrorId::NumericOverflow => "Numeric overflow",
            AsmErrorId::ImmRange => "Value range error",
            AsmErrorId::DupOpt => "Duplicate instruction option",
        }
    }
}

/// An assembler failure: what went wrong and where in the source line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AsmError {
    pub id: AsmErrorId,
    /// Character position of the token that triggered the error.
    pub pos: usize,
}

impl AsmError {
    pub fn new(id: AsmErrorId, pos: usize) -> Self {
        Self { id, pos }
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at position {}", self.id.message(), self.pos)
    }
}

impl std::error::Error for AsmError {}

/// Errors surfaced to the interactive layer as a single message line.
#[derive(Debug)]
pub enum SimError {
    InvalidArg(String),
    InvalidModuleNum(u32),
    ModuleExists(u32),
    TooManyModules,
    SpaOverlap(u32),
    EnvVarNotFound(String),
    FileNotFound(String),
    Asm(AsmError),
    Bus(BusError),
    Io(std::io::Error),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::InvalidArg(what) => write!(f, "invalid argument: {}", what),
            SimError::InvalidModuleNum(num) => write!(f, "invalid module number {}", num),
            SimError::ModuleExists(num) => write!(f, "module {} already exists", num),
            SimError::TooManyModules => write!(f, "module map is full"),
            SimError::SpaOverlap(num) => {
                write!(f, "SPA range overlaps existing module {}", num)
            }
            SimError::EnvVarNotFound(name) => write!(f, "environment variable {} not found", name),
            SimError::FileNotFound(path) => write!(f, "file not found: {}", path),
            SimError::Asm(err) => write!(f, "{}", err),
            SimError::Bus(err) => write!(f, "bus error: {}", err),
            SimError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for SimError {}

impl From<AsmError> for SimError {
    fn from(err: AsmError) -> Self {
        SimError::Asm(err)
    }
}

impl From<BusError> for SimError {
    fn from(err: BusError) -> Self {
        SimError::Bus(err)
    }
}

impl From<std::io::Error> for SimError {
    fn from(err: std::io::Error) -> Self {
        SimError::Io(err)
    }
}
