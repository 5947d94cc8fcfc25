//! Hardware building blocks owned by a processor module.

pub mod cache;
pub mod tlb;

pub use cache::{Cache, CacheSide, LineState};
pub use tlb::{PageType, Tlb, TlbEntry, TlbSide};
