//! System: module map and bus.
//!
//! The system owns all modules in an arena indexed by module number; modules
//! hold their number, not a pointer back. It provides:
//! 1. **Module map:** add/remove with disjoint-SPA enforcement, lookup by
//!    number and by physical address.
//! 2. **Bus broadcast:** the four coherence messages of the architecture,
//!    dispatched observers-first, then served by the address-range owner.
//! 3. **Stepping:** round-robin instruction stepping over the processor
//!    modules; a processor is taken out of the arena while it runs so its
//!    bus requests can borrow the rest of the system.
//! 4. **Debugger access:** bus-level memory read/write.

pub mod memory;
pub mod module;

pub use memory::MemoryModule;
pub use module::{BusOp, Module, ModuleKind, WriteBack};

use log::error;

use crate::common::error::{BusError, SimError};
use crate::common::Word;
use crate::config::defaults::MAX_MODULES;

/// Bus traffic counters.
#[derive(Clone, Copy, Debug, Default)]
pub struct BusStats {
    pub read_shared: u64,
    pub read_private: u64,
    pub write_block: u64,
    pub read_uncached: u64,
    pub write_uncached: u64,
}

/// The T64 system: up to 32 modules on a shared bus.
pub struct System {
    modules: Vec<Option<Box<dyn Module>>>,
    /// Round-robin cursor over processor modules.
    rr_cursor: usize,
    pub bus_stats: BusStats,
}

impl System {
    pub fn new() -> Self {
        Self {
            modules: (0..MAX_MODULES).map(|_| None).collect(),
            rr_cursor: 0,
            bus_stats: BusStats::default(),
        }
    }

    /// Adds a module under its own number. SPA ranges of distinct modules
    /// must be disjoint.
    pub fn module_add(&mut self, module: Box<dyn Module>) -> Result<u32, SimError> {
        let num = module.mod_num();
        let slot = num as usize;
        if slot >= MAX_MODULES {
            return Err(SimError::InvalidModuleNum(num));
        }
        if self.modules[slot].is_some() {
            return Err(SimError::ModuleExists(num));
        }
        if let Some((adr, len)) = module.spa_range() {
            if len > 0 {
                for other in self.modules.iter().flatten() {
                    if let Some((o_adr, o_len)) = other.spa_range() {
                        if o_len > 0 && adr < o_adr + o_len && o_adr < adr + len {
                            return Err(SimError::SpaOverlap(other.mod_num()));
                        }
                    }
                }
            }
        }
        self.modules[slot] = Some(module);
        Ok(num)
    }

    /// Removes a module. The processor's TLBs and caches die with it.
    pub fn module_remove(&mut self, mod_num: u32) -> Result<(), SimError> {
        let slot = mod_num as usize;
        if slot >= MAX_MODULES || self.modules[slot].is_none() {
            return Err(SimError::InvalidModuleNum(mod_num));
        }
        self.modules[slot] = None;
        Ok(())
    }

    pub fn module(&self, mod_num: u32) -> Option<&dyn Module> {
        self.modules
            .get(mod_num as usize)
            .and_then(|slot| slot.as_deref())
    }

    pub fn module_mut(&mut self, mod_num: u32) -> Option<&mut dyn Module> {
        match self.modules.get_mut(mod_num as usize) {
            Some(Some(module)) => Some(module.as_mut()),
            _ => None,
        }
    }

    /// Module numbers currently populated, ascending.
    pub fn module_nums(&self) -> Vec<u32> {
        self.modules
            .iter()
            .flatten()
            .map(|module| module.mod_num())
            .collect()
    }

    /// Module owning the physical address, by SPA range.
    pub fn lookup_by_adr(&self, p_adr: Word) -> Option<u32> {
        for module in self.modules.iter().flatten() {
            if let Some((adr, len)) = module.spa_range() {
                if len > 0 && p_adr >= adr && p_adr < adr + len {
                    return Some(module.mod_num());
                }
            }
        }
        None
    }

    /// True when the module owning `p_adr` accepts writes. Addresses no
    /// module serves report true; the runaway path handles them.
    pub fn is_writable(&self, p_adr: Word) -> bool {
        match self.lookup_by_adr(p_adr) {
            Some(num) => self.module(num).map(|m| m.writable()).unwrap_or(true),
            None => true,
        }
    }

    /// Resets every module.
    pub fn reset(&mut self) {
        for module in self.modules.iter_mut().flatten() {
            module.reset();
        }
        self.rr_cursor = 0;
        self.bus_stats = BusStats::default();
    }

    /// Advances `n` instructions, round-robin over the processor modules.
    ///
    /// The processor being stepped is taken out of the arena for the
    /// duration of its instruction so that its memory traffic can borrow
    /// the system mutably. Halted processors are skipped.
    pub fn step(&mut self, n: u64) {
        for _ in 0..n {
            if !self.step_next_processor() {
                break;
            }
        }
    }

    /// Steps the next runnable processor. Returns false when no processor
    /// can run.
    fn step_next_processor(&mut self) -> bool {
        let count = self.modules.len();
        for probe in 0..count {
            let slot = (self.rr_cursor + probe) % count;
            let is_proc = matches!(
                &self.modules[slot],
                Some(module) if module.kind() == ModuleKind::Processor
            );
            if !is_proc {
                continue;
            }

            let mut module = self.modules[slot].take().expect("checked above");
            module.step(self);
            self.modules[slot] = Some(module);
            self.rr_cursor = (slot + 1) % count;
            return true;
        }
        false
    }

    // Target routing.

    fn read_target(&mut self, p_adr: Word, buf: &mut [u8]) -> Result<(), BusError> {
        let num = self
            .lookup_by_adr(p_adr)
            .ok_or(BusError::NoTarget(p_adr))?;
        self.module_mut(num)
            .ok_or(BusError::NoTarget(p_adr))?
            .read_bytes(p_adr, buf)
    }

    fn write_target(&mut self, p_adr: Word, data: &[u8]) -> Result<(), BusError> {
        let num = self
            .lookup_by_adr(p_adr)
            .ok_or(BusError::NoTarget(p_adr))?;
        self.module_mut(num)
            .ok_or(BusError::NoTarget(p_adr))?
            .write_bytes(p_adr, data)
    }

    /// Broadcasts a bus operation to every module except the requester and
    /// delivers the collected write-backs to their owners. Observer
    /// reactions complete before the issuing operation continues.
    fn broadcast(&mut self, req_mod: u32, op: BusOp, p_adr: Word) -> Result<(), BusError> {
        let mut writebacks: Vec<WriteBack> = Vec::new();
        for module in self.modules.iter_mut().flatten() {
            if module.mod_num() == req_mod {
                continue;
            }
            writebacks.extend(module.observe(op, p_adr));
        }
        for (adr, data) in writebacks {
            self.write_target(adr, &data)?;
        }
        Ok(())
    }

    // The four coherence messages.

    /// Fill request for a shared copy of a block.
    pub fn bus_read_shared_block(
        &mut self,
        req_mod: u32,
        line_adr: Word,
        buf: &mut [u8],
    ) -> Result<(), BusError> {
        self.bus_stats.read_shared += 1;
        self.broadcast(req_mod, BusOp::ReadSharedBlock, line_adr)?;
        self.read_target(line_adr, buf)
    }

    /// Fill request for a private copy of a block; peers purge theirs.
    pub fn bus_read_private_block(
        &mut self,
        req_mod: u32,
        line_adr: Word,
        buf: &mut [u8],
    ) -> Result<(), BusError> {
        self.bus_stats.read_private += 1;
        self.broadcast(req_mod, BusOp::ReadPrivateBlock, line_adr)?;
        self.read_target(line_adr, buf)
    }

    /// Write-back of an exclusive block. No observer holds the line.
    pub fn bus_write_block(
        &mut self,
        _req_mod: u32,
        line_adr: Word,
        data: &[u8],
    ) -> Result<(), BusError> {
        self.bus_stats.write_block += 1;
        self.write_target(line_adr, data)
    }

    /// Uncached read; peers flush and purge any cached copy first.
    pub fn bus_read_uncached(
        &mut self,
        req_mod: u32,
        p_adr: Word,
        buf: &mut [u8],
    ) -> Result<(), BusError> {
        self.bus_stats.read_uncached += 1;
        self.broadcast(req_mod, BusOp::ReadUncached, p_adr)?;
        self.read_target(p_adr, buf)
    }

    /// Uncached write; peers flush and purge any cached copy first.
    pub fn bus_write_uncached(
        &mut self,
        req_mod: u32,
        p_adr: Word,
        data: &[u8],
    ) -> Result<(), BusError> {
        self.bus_stats.write_uncached += 1;
        self.broadcast(req_mod, BusOp::WriteUncached, p_adr)?;
        self.write_target(p_adr, data)
    }

    // Debugger surface. Routed like uncached traffic so cached copies are
    // made coherent first; the requester id is outside the module range.

    const DEBUGGER: u32 = u32::MAX;

    /// Reads physical memory for the debugger.
    pub fn read_mem(&mut self, p_adr: Word, buf: &mut [u8]) -> Result<(), BusError> {
        self.bus_read_uncached(Self::DEBUGGER, p_adr, buf)
    }

    /// Writes physical memory for the debugger.
    pub fn write_mem(&mut self, p_adr: Word, data: &[u8]) -> Result<(), BusError> {
        self.bus_write_uncached(Self::DEBUGGER, p_adr, data)
    }

    /// Reports a runaway bus condition: an address no module serves.
    pub fn report_runaway(&self, who: u32, err: &BusError) {
        error!("module {}: fatal bus condition: {}", who, err);
    }
}

impl Default for System {
    fn default() -> Self {
        Self::new()
    }
}
