//! Module trait and bus operation types.
//!
//! Every component on the system bus is a module: processors, memories and
//! (one day) I/O adapters. Modules live in the system's arena, keyed by
//! module number; they hold their number rather than a pointer back to the
//! system. Bus traffic reaches a module through the trait entry points:
//! target service (`read_bytes`/`write_bytes`) and observer reactions
//! (`observe`).

use crate::common::error::BusError;
use crate::common::Word;
use crate::core::Processor;
use crate::soc::System;

/// Kind of a module.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModuleKind {
    Processor,
    Memory,
    Io,
}

/// Broadcast coherence messages. `write-block` has no observer action (the
/// issuer is the sole owner by invariant) and is delivered straight to the
/// target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusOp {
    ReadSharedBlock,
    ReadPrivateBlock,
    ReadUncached,
    WriteUncached,
}

/// A write-back produced by an observer reaction: line address plus data,
/// delivered to the owning module by the system.
pub type WriteBack = (Word, Vec<u8>);

/// A module on the system bus.
pub trait Module {
    fn mod_num(&self) -> u32;

    fn kind(&self) -> ModuleKind;

    /// The module's soft-physical-address range as (base, length), or `None`
    /// when the module owns no part of the physical address space.
    fn spa_range(&self) -> Option<(Word, Word)>;

    /// Resets the module to power-on state.
    fn reset(&mut self);

    /// Advances the module by one instruction. Non-processor modules do
    /// nothing.
    fn step(&mut self, _sys: &mut System) {}

    /// Target service: reads `buf.len()` bytes at `p_adr` from the module's
    /// backing store.
    fn read_bytes(&mut self, p_adr: Word, buf: &mut [u8]) -> Result<(), BusError>;

    /// Target service: writes `data` at `p_adr` into the module's backing
    /// store.
    fn write_bytes(&mut self, p_adr: Word, data: &[u8]) -> Result<(), BusError>;

    /// True when the module accepts bus writes. Read-only memory reports
    /// false so stores fail before a line is cached dirty.
    fn writable(&self) -> bool {
        true
    }

    /// Observer reaction to a broadcast bus operation. Returns any modified
    /// blocks that must be written back to the owning module.
    fn observe(&mut self, _op: BusOp, _p_adr: Word) -> Vec<WriteBack> {
        Vec::new()
    }

    /// Downcast for the debugger surface.
    fn as_processor(&self) -> Option<&Processor> {
        None
    }

    fn as_processor_mut(&mut self) -> Option<&mut Processor> {
        None
    }

    /// Downcast for the loader, which may fill ROM images.
    fn as_memory_mut(&mut self) -> Option<&mut crate::soc::memory::MemoryModule> {
        None
    }
}
