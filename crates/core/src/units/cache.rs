//! Coherent set-associative cache.
//!
//! A physical-address block store with per-line coherence state. Lines move
//! between four states: invalid, shared, exclusive-clean and
//! exclusive-modified. Misses and upgrades issue bus requests through the
//! owning system; observer-side reactions run without bus access and hand
//! any write-back data to the system for delivery (two-phase broadcast, no
//! reentrancy).
//!
//! Geometry comes from the cache-kind enum: ways, sets and line size are
//! fixed per variant. Replacement is least-recently-used within a set.

use crate::common::error::BusError;
use crate::common::Word;
use crate::config::CacheKind;
use crate::soc::System;

/// Coherence state of a cache line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineState {
    Invalid,
    Shared,
    ExclusiveClean,
    ExclusiveModified,
}

/// Instruction or data side, for statistics and display.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheSide {
    Instr,
    Data,
}

/// One cache line: tag, state and data block.
#[derive(Clone, Debug)]
pub struct CacheLine {
    pub tag: u64,
    pub state: LineState,
    pub data: Vec<u8>,
    lru: u64,
}

impl CacheLine {
    fn new(line_bytes: usize) -> Self {
        Self {
            tag: 0,
            state: LineState::Invalid,
            data: vec![0; line_bytes],
            lru: 0,
        }
    }
}

/// Set-associative cache.
pub struct Cache {
    side: CacheSide,
    kind: CacheKind,
    sets: usize,
    ways: usize,
    line_bytes: usize,
    lines: Vec<CacheLine>,
    clock: u64,
}

impl Cache {
    pub fn new(side: CacheSide, kind: CacheKind) -> Self {
        let sets = kind.sets();
        let ways = kind.ways();
        let line_bytes = kind.line_bytes();
        Self {
            side,
            kind,
            sets,
            ways,
            line_bytes,
            lines: vec![CacheLine::new(line_bytes); sets * ways],
            clock: 0,
        }
    }

    pub fn side(&self) -> CacheSide {
        self.side
    }

    pub fn kind(&self) -> CacheKind {
        self.kind
    }

    pub fn line_bytes(&self) -> usize {
        self.line_bytes
    }

    pub fn reset(&mut self) {
        let line_bytes = self.line_bytes;
        for line in &mut self.lines {
            *line = CacheLine::new(line_bytes);
        }
        self.clock = 0;
    }

    /// Line base address of `p_adr`.
    #[inline]
    pub fn line_adr(&self, p_adr: Word) -> Word {
        (p_adr as u64 & !(self.line_bytes as u64 - 1)) as Word
    }

    #[inline]
    fn set_index(&self, p_adr: Word) -> usize {
        ((p_adr as u64 as usize) / self.line_bytes) % self.sets
    }

    #[inline]
    fn tag_of(&self, p_adr: Word) -> u64 {
        (p_adr as u64) / (self.line_bytes * self.sets) as u64
    }

    /// Line slot for the debugger display.
    pub fn line(&self, set: usize, way: usize) -> Option<&CacheLine> {
        if set >= self.sets || way >= self.ways {
            return None;
        }
        self.lines.get(set * self.ways + way)
    }

    pub fn sets(&self) -> usize {
        self.sets
    }

    pub fn ways(&self) -> usize {
        self.ways
    }

    fn find(&mut self, p_adr: Word) -> Option<usize> {
        let set = self.set_index(p_adr);
        let tag = self.tag_of(p_adr);
        let base = set * self.ways;
        (0..self.ways)
            .map(|way| base + way)
            .find(|&idx| self.lines[idx].state != LineState::Invalid && self.lines[idx].tag == tag)
    }

    /// Coherence state of the line covering `p_adr`.
    pub fn state_of(&self, p_adr: Word) -> LineState {
        let set = self.set_index(p_adr);
        let tag = self.tag_of(p_adr);
        let base = set * self.ways;
        for way in 0..self.ways {
            let line = &self.lines[base + way];
            if line.state != LineState::Invalid && line.tag == tag {
                return line.state;
            }
        }
        LineState::Invalid
    }

    /// Picks the victim slot in the set of `p_adr`, writing back a modified
    /// victim through the bus.
    fn evict_for(
        &mut self,
        sys: &mut System,
        req_mod: u32,
        p_adr: Word,
    ) -> Result<usize, BusError> {
        let set = self.set_index(p_adr);
        let base = set * self.ways;

        let victim = (0..self.ways)
            .map(|way| base + way)
            .min_by_key(|&idx| {
                let line = &self.lines[idx];
                if line.state == LineState::Invalid {
                    0
                } else {
                    line.lru + 1
                }
            })
            .expect("set has at least one way");

        if self.lines[victim].state == LineState::ExclusiveModified {
            let victim_adr = self.reconstruct_adr(set, self.lines[victim].tag);
            let data = self.lines[victim].data.clone();
            sys.bus_write_block(req_mod, victim_adr, &data)?;
        }
        self.lines[victim].state = LineState::Invalid;
        Ok(victim)
    }

    /// Rebuilds the line base address from set index and tag.
    fn reconstruct_adr(&self, set: usize, tag: u64) -> Word {
        ((tag * self.sets as u64 + set as u64) * self.line_bytes as u64) as Word
    }

    /// Fills the line covering `p_adr` via the given bus request and returns
    /// its slot index.
    fn fill(
        &mut self,
        sys: &mut System,
        req_mod: u32,
        p_adr: Word,
        private: bool,
    ) -> Result<usize, BusError> {
        let line_adr = self.line_adr(p_adr);
        let victim = self.evict_for(sys, req_mod, p_adr)?;

        let mut block = vec![0u8; self.line_bytes];
        if private {
            sys.bus_read_private_block(req_mod, line_adr, &mut block)?;
        } else {
            sys.bus_read_shared_block(req_mod, line_adr, &mut block)?;
        }

        let tag = self.tag_of(p_adr);
        let line = &mut self.lines[victim];
        line.tag = tag;
        line.data = block;
        line.state = if private {
            LineState::ExclusiveModified
        } else {
            LineState::Shared
        };
        Ok(victim)
    }

    /// Reads `dst.len()` bytes at `p_adr`. Uncached accesses bypass the
    /// cache and go to the bus directly; otherwise the line is located or
    /// filled with a shared-block request.
    pub fn read(
        &mut self,
        sys: &mut System,
        req_mod: u32,
        p_adr: Word,
        dst: &mut [u8],
        uncached: bool,
    ) -> Result<bool, BusError> {
        if uncached {
            sys.bus_read_uncached(req_mod, p_adr, dst)?;
            return Ok(false);
        }

        self.clock += 1;
        let (idx, hit) = match self.find(p_adr) {
            Some(idx) => (idx, true),
            None => (self.fill(sys, req_mod, p_adr, false)?, false),
        };

        let ofs = (p_adr as u64 as usize) & (self.line_bytes - 1);
        dst.copy_from_slice(&self.lines[idx].data[ofs..ofs + dst.len()]);
        self.lines[idx].lru = self.clock;
        Ok(hit)
    }

    /// Writes `src` at `p_adr`. A missing line is filled with a
    /// private-block request; a shared line is upgraded the same way. The
    /// line ends exclusive-modified.
    pub fn write(
        &mut self,
        sys: &mut System,
        req_mod: u32,
        p_adr: Word,
        src: &[u8],
        uncached: bool,
    ) -> Result<bool, BusError> {
        if uncached {
            sys.bus_write_uncached(req_mod, p_adr, src)?;
            return Ok(false);
        }

        self.clock += 1;
        let (idx, hit) = match self.find(p_adr) {
            Some(idx) => {
                if self.lines[idx].state == LineState::Shared {
                    // Upgrade: take the block private before modifying it.
                    let line_adr = self.line_adr(p_adr);
                    let mut block = vec![0u8; self.line_bytes];
                    sys.bus_read_private_block(req_mod, line_adr, &mut block)?;
                    self.lines[idx].data = block;
                }
                (idx, true)
            }
            None => (self.fill(sys, req_mod, p_adr, true)?, false),
        };

        let ofs = (p_adr as u64 as usize) & (self.line_bytes - 1);
        self.lines[idx].data[ofs..ofs + src.len()].copy_from_slice(src);
        self.lines[idx].state = LineState::ExclusiveModified;
        self.lines[idx].lru = self.clock;
        Ok(hit)
    }

    /// Flushes the line covering `p_adr`: a modified line is written back
    /// and the line transitions to shared. No-op when the line is absent.
    pub fn flush(&mut self, sys: &mut System, req_mod: u32, p_adr: Word) -> Result<(), BusError> {
        if let Some(idx) = self.find(p_adr) {
            if self.lines[idx].state == LineState::ExclusiveModified {
                let line_adr = self.line_adr(p_adr);
                let data = self.lines[idx].data.clone();
                sys.bus_write_block(req_mod, line_adr, &data)?;
            }
            self.lines[idx].state = LineState::Shared;
        }
        Ok(())
    }

    /// Purges the line covering `p_adr`: flush if modified, then invalidate.
    pub fn purge(&mut self, sys: &mut System, req_mod: u32, p_adr: Word) -> Result<(), BusError> {
        self.flush(sys, req_mod, p_adr)?;
        if let Some(idx) = self.find(p_adr) {
            self.lines[idx].state = LineState::Invalid;
        }
        Ok(())
    }

    // Observer-side reactions. These run while another module drives the
    // bus, so they cannot issue requests themselves; modified data is
    // returned for the system to deliver to the owning module.

    /// Peer requested a shared copy: exclusive lines downgrade to shared,
    /// returning the block for write-back when it was modified.
    pub fn observe_read_shared(&mut self, p_adr: Word) -> Option<(Word, Vec<u8>)> {
        let idx = self.find(p_adr)?;
        let line_adr = self.line_adr(p_adr);
        let line = &mut self.lines[idx];
        let writeback = match line.state {
            LineState::ExclusiveModified => Some((line_adr, line.data.clone())),
            _ => None,
        };
        if line.state != LineState::Invalid {
            line.state = LineState::Shared;
        }
        writeback
    }

    /// Peer requested a private copy: the local line is purged, returning
    /// the block for write-back when it was modified.
    pub fn observe_read_private(&mut self, p_adr: Word) -> Option<(Word, Vec<u8>)> {
        let idx = self.find(p_adr)?;
        let line_adr = self.line_adr(p_adr);
        let line = &mut self.lines[idx];
        let writeback = match line.state {
            LineState::ExclusiveModified => Some((line_adr, line.data.clone())),
            _ => None,
        };
        line.state = LineState::Invalid;
        writeback
    }
}
