//! Configuration system for the T64 simulator.
//!
//! This module defines the configuration structures and enums used to build a
//! system. It provides:
//! 1. **Defaults:** baseline constants (module limit, physical memory bounds,
//!    TLB and cache geometry).
//! 2. **Structures:** hierarchical config for the general settings and the
//!    module population, deserializable from a JSON config file.
//! 3. **Enums:** TLB and cache geometry variants.
//!
//! Use `Config::default()` for a one-processor, one-RAM system, or supply
//! `--configfile=PATH` to the CLI.

use serde::Deserialize;

/// Default configuration constants.
pub mod defaults {
    /// Maximum number of modules in a system.
    pub const MAX_MODULES: usize = 32;

    /// Default upper bound of the physical memory address range seen by a
    /// processor. Addresses at or below this bound are physical accesses and
    /// require privileged mode.
    pub const PHYS_MEM_LIMIT: i64 = 0x0000_0000_FFFF_FFFF;

    /// Default SPA base of the first memory module.
    pub const MEM_SPA_ADR: i64 = 0;

    /// Default memory module size (16 MiB).
    pub const MEM_SPA_LEN: i64 = 16 * 1024 * 1024;

    /// Run-command step limit before the simulator gives up (no halt seen).
    pub const RUN_STEP_LIMIT: u64 = 100_000_000;
}

/// TLB geometry. Both variants are fully associative.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum TlbKind {
    /// 64 entries.
    Fa64,
    /// 128 entries.
    Fa128,
}

impl TlbKind {
    /// Number of entries for the variant.
    pub fn entries(&self) -> usize {
        match self {
            TlbKind::Fa64 => 64,
            TlbKind::Fa128 => 128,
        }
    }
}

impl Default for TlbKind {
    fn default() -> Self {
        TlbKind::Fa64
    }
}

/// Cache geometry: ways x sets x words-per-line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum CacheKind {
    C2w128s4l,
    C4w128s4l,
    C8w128s4l,
    C2w64s8l,
    C4w64s8l,
    C8w64s8l,
}

impl CacheKind {
    pub fn ways(&self) -> usize {
        match self {
            CacheKind::C2w128s4l | CacheKind::C2w64s8l => 2,
            CacheKind::C4w128s4l | CacheKind::C4w64s8l => 4,
            CacheKind::C8w128s4l | CacheKind::C8w64s8l => 8,
        }
    }

    pub fn sets(&self) -> usize {
        match self {
            CacheKind::C2w128s4l | CacheKind::C4w128s4l | CacheKind::C8w128s4l => 128,
            CacheKind::C2w64s8l | CacheKind::C4w64s8l | CacheKind::C8w64s8l => 64,
        }
    }

    /// Line size in bytes (4 or 8 words of 8 bytes).
    pub fn line_bytes(&self) -> usize {
        match self {
            CacheKind::C2w128s4l | CacheKind::C4w128s4l | CacheKind::C8w128s4l => 32,
            CacheKind::C2w64s8l | CacheKind::C4w64s8l | CacheKind::C8w64s8l => 64,
        }
    }
}

impl Default for CacheKind {
    fn default() -> Self {
        CacheKind::C2w128s4l
    }
}

/// General simulator settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Verbose progress reporting.
    pub verbose: bool,
    /// Default radix for formatted output (10 or 16).
    pub rdx_default: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            rdx_default: 16,
        }
    }
}

/// Configuration of a processor module.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ProcConfig {
    pub mod_num: u32,
    pub i_tlb: TlbKind,
    pub d_tlb: TlbKind,
    pub i_cache: CacheKind,
    pub d_cache: CacheKind,
}

impl Default for ProcConfig {
    fn default() -> Self {
        Self {
            mod_num: 0,
            i_tlb: TlbKind::Fa64,
            d_tlb: TlbKind::Fa64,
            i_cache: CacheKind::C2w128s4l,
            d_cache: CacheKind::C4w128s4l,
        }
    }
}

/// Configuration of a memory module.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MemConfig {
    pub mod_num: u32,
    /// Read-only memory rejects stores with a bus error.
    pub read_only: bool,
    pub spa_adr: i64,
    pub spa_len: i64,
}

impl Default for MemConfig {
    fn default() -> Self {
        Self {
            mod_num: 1,
            read_only: false,
            spa_adr: defaults::MEM_SPA_ADR,
            spa_len: defaults::MEM_SPA_LEN,
        }
    }
}

/// A program image to preload into physical memory.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProgramConfig {
    /// Path of the raw binary image.
    pub path: String,
    /// Physical load address.
    pub load_adr: i64,
    /// Initial instruction address of processor 0.
    pub start_adr: i64,
}

/// Root configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub processors: Vec<ProcConfig>,
    pub memories: Vec<MemConfig>,
    pub program: Option<ProgramConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            processors: vec![ProcConfig::default()],
            memories: vec![MemConfig::default()],
            program: None,
        }
    }
}
