//! Common types and constants shared across the simulator.
//!
//! This module collects the pieces every subsystem needs:
//! 1. **Bit manipulation:** one central set of extract/deposit/sign-extend
//!    helpers; instruction handlers never inline their own bit twiddling.
//! 2. **Addresses:** virtual and physical address newtypes with page and
//!    region slicing.
//! 3. **Registers:** general and control register files.
//! 4. **Errors:** traps, bus errors and assembler diagnostics.

pub mod addr;
pub mod bits;
pub mod error;
pub mod reg;

pub use addr::{PhysAddr, VirtAddr};
pub use error::{AsmError, AsmErrorId, BusError, SimError, Trap};
pub use reg::{ControlRegs, GeneralRegs};

/// Machine word of the T64 architecture. Arithmetic is signed 64-bit.
pub type Word = i64;

/// Encoded instruction word.
pub type Instr = u32;
