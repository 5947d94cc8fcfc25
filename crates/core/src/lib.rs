//! T64 system simulator library.
//!
//! This crate implements the execution engine of an interactive simulator for
//! the T64 64-bit load/store architecture:
//! 1. **ISA:** 32-bit instruction encoding, one-line assembler, disassembler.
//! 2. **Core:** CPU register state, fetch/execute dispatch, trap machinery.
//! 3. **Memory:** split instruction/data TLBs and caches with bus coherence.
//! 4. **SoC:** module map (processor, memory), physical address space, bus.
//! 5. **Simulation:** stepping façade, loader, environment store, statistics.

/// Common types and helpers (addresses, registers, bit fields, errors).
pub mod common;
/// Simulator configuration (defaults, geometry enums, config structures).
pub mod config;
/// CPU core (processor module, execution, memory access, trap handling).
pub mod core;
/// Instruction set (encoding, one-line assembler, disassembler).
pub mod isa;
/// Simulation façade, loader and environment store.
pub mod sim;
/// System-on-a-whiteboard: module arena, bus broadcast, memory modules.
pub mod soc;
/// Simulation statistics collection and reporting.
pub mod stats;
/// Hardware building blocks owned by a processor (TLB, cache).
pub mod units;

/// Root configuration type; use `Config::default()` or deserialize from JSON.
pub use crate::config::Config;
/// Processor module; holds CPU registers, TLBs and caches.
pub use crate::core::Processor;
/// Simulation façade over a `System`.
pub use crate::sim::Simulator;
/// Top-level system: module map and bus.
pub use crate::soc::System;
