//! Instruction fetch and data access paths.
//!
//! The memory interface of the CPU core:
//! 1. **Checks:** alignment, privilege, translation, region id and access
//!    rights, each converting a failure into the corresponding trap.
//! 2. **Translation:** addresses inside the physical memory range bypass the
//!    TLB but require privileged mode; all other addresses translate
//!    through the I- or D-TLB.
//! 3. **Data movement:** reads return right-justified, optionally
//!    sign-extended values; the bus data format is big-endian.

use log::error;

use crate::common::addr::VirtAddr;
use crate::common::bits::{
    extract_bit64, extract_field64, extract_signed_field64, is_aligned_data_adr,
    is_aligned_instr_adr, is_in_range, load_be, store_be,
};
use crate::common::error::{BusError, Trap};
use crate::common::reg::{CR_REGION_FIRST, CR_REGION_LAST};
use crate::common::{Instr, Word};
use crate::core::{Processor, PSR_R_BIT};
use crate::soc::System;
use crate::units::tlb::{PageType, TlbEntry};

/// Data access kinds against a TLB entry's page type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    Execute,
}

impl Processor {
    /// True if the address lies in the configured physical memory range.
    pub(crate) fn is_phys_adr(&self, adr: Word) -> bool {
        is_in_range(adr, self.lower_phys_mem, self.upper_phys_mem)
    }

    /// Region-id check against the region registers CR4..CR7.
    ///
    /// With PSR bit 0 clear the check is disabled and always passes. Each
    /// region register packs two entries: id in bits 0..19 with its
    /// write-enable at bit 31, and id in bits 32..51 with write-enable at
    /// bit 63. A matching entry permits reads; writes additionally need the
    /// write-enable flag.
    pub(crate) fn region_id_check(&self, r_id: Word, w_mode: bool) -> bool {
        if !extract_bit64(self.psr(), PSR_R_BIT) {
            return true;
        }
        for idx in CR_REGION_FIRST..=CR_REGION_LAST {
            let cr = self.cregs.read(idx);
            if extract_field64(cr, 0, 20) == r_id && (!w_mode || extract_bit64(cr, 31)) {
                return true;
            }
            if extract_field64(cr, 32, 20) == r_id && (!w_mode || extract_bit64(cr, 63)) {
                return true;
            }
        }
        false
    }

    fn priv_check(&self) -> Result<(), Trap> {
        if self.is_priv() {
            Ok(())
        } else {
            Err(Trap::PrivOp)
        }
    }

    /// Page access-rights check for a translated access.
    fn access_rights_check(entry: &TlbEntry, access: Access, adr: Word, fetch: bool) -> Result<(), Trap> {
        let allowed = match access {
            Access::Execute => entry.page_type == PageType::Execute,
            Access::Read => matches!(entry.page_type, PageType::ReadOnly | PageType::ReadWrite),
            Access::Write => entry.page_type == PageType::ReadWrite,
        };
        if allowed {
            Ok(())
        } else if fetch {
            Err(Trap::InstrProtection(adr))
        } else {
            Err(Trap::DataProtection(adr))
        }
    }

    /// Pages with a non-zero privilege level are reachable only in
    /// privileged mode.
    fn priv_level_check(&self, entry: &TlbEntry) -> Result<(), Trap> {
        if entry.priv_level != 0 && !self.is_priv() {
            Err(Trap::PrivOp)
        } else {
            Ok(())
        }
    }

    /// Converts a bus failure into a trap. A runaway condition (no module
    /// serves the address) is fatal: the diagnostic is printed and the
    /// processor halts.
    pub(crate) fn bus_to_trap(&mut self, err: BusError) -> Trap {
        match err {
            BusError::NoTarget(adr) => {
                error!(
                    "processor {}: no module serves physical address {:#x}; halting",
                    self.mod_num(),
                    adr
                );
                self.halt();
                Trap::DataProtection(adr)
            }
            BusError::ReadOnly(adr) | BusError::Range(adr) => Trap::DataProtection(adr),
        }
    }

    /// Fetches the instruction word at `v_adr`.
    ///
    /// The address must be 4-aligned. A physical address requires privileged
    /// mode; a virtual address translates through the I-TLB and must pass
    /// the region and execute-rights checks.
    pub(crate) fn instr_read(&mut self, sys: &mut System, v_adr: Word) -> Result<Instr, Trap> {
        if !is_aligned_instr_adr(v_adr) {
            return Err(Trap::InstrAlign(v_adr));
        }

        let mut buf = [0u8; 4];
        if self.is_phys_adr(v_adr) {
            self.priv_check()?;
            let req = self.mod_num();
            match self.i_cache.read(sys, req, v_adr, &mut buf, false) {
                Ok(hit) => self.note_icache(hit),
                Err(err) => return Err(self.bus_to_trap(err)),
            }
        } else {
            let vaddr = VirtAddr::new(v_adr);
            let entry = match self.i_tlb.lookup(vaddr) {
                Some(entry) => {
                    self.stats.itlb_hits += 1;
                    entry
                }
                None => {
                    self.stats.itlb_misses += 1;
                    return Err(Trap::InstrTlbMiss(v_adr));
                }
            };

            Self::access_rights_check(&entry, Access::Execute, v_adr, true)?;
            self.priv_level_check(&entry)?;
            if !self.region_id_check(vaddr.region_id(), false) {
                return Err(Trap::InstrProtection(v_adr));
            }

            let p_adr = entry.p_adr | vaddr.page_ofs();
            let req = self.mod_num();
            match self.i_cache.read(sys, req, p_adr, &mut buf, entry.uncached) {
                Ok(hit) => self.note_icache(hit),
                Err(err) => return Err(self.bus_to_trap(err)),
            }
        }

        Ok(load_be(&buf) as Instr)
    }

    fn note_icache(&mut self, hit: bool) {
        if hit {
            self.stats.icache_hits += 1;
        } else {
            self.stats.icache_misses += 1;
        }
    }

    fn note_dcache(&mut self, hit: bool) {
        if hit {
            self.stats.dcache_hits += 1;
        } else {
            self.stats.dcache_misses += 1;
        }
    }

    /// Resolves a data address to a physical address and uncached flag,
    /// running the full check sequence for the access kind.
    fn data_translate(
        &mut self,
        v_adr: Word,
        len: usize,
        access: Access,
    ) -> Result<(Word, bool), Trap> {
        if !is_aligned_data_adr(v_adr, len) {
            return Err(Trap::DataAlign(v_adr));
        }

        if self.is_phys_adr(v_adr) {
            self.priv_check()?;
            return Ok((v_adr, false));
        }

        let vaddr = VirtAddr::new(v_adr);
        let entry = match self.d_tlb.lookup(vaddr) {
            Some(entry) => {
                self.stats.dtlb_hits += 1;
                entry
            }
            None => {
                self.stats.dtlb_misses += 1;
                return Err(Trap::DataTlbMiss(v_adr));
            }
        };

        Self::access_rights_check(&entry, access, v_adr, false)?;
        self.priv_level_check(&entry)?;
        if !self.region_id_check(vaddr.region_id(), access == Access::Write) {
            return Err(Trap::DataProtection(v_adr));
        }

        Ok((entry.p_adr | vaddr.page_ofs(), entry.uncached))
    }

    /// Reads `len` bytes at `v_adr`, right-justified and sign-extended when
    /// requested. `force_uncached` models the `.U` load option.
    pub(crate) fn data_read(
        &mut self,
        sys: &mut System,
        v_adr: Word,
        len: usize,
        sign_ext: bool,
        force_uncached: bool,
    ) -> Result<Word, Trap> {
        let (p_adr, uncached) = self.data_translate(v_adr, len, Access::Read)?;

        let mut buf = [0u8; 8];
        let req = self.mod_num();
        match self
            .d_cache
            .read(sys, req, p_adr, &mut buf[..len], uncached || force_uncached)
        {
            Ok(hit) => self.note_dcache(hit),
            Err(err) => return Err(self.bus_to_trap(err)),
        }

        let mut data = load_be(&buf[..len]) as Word;
        if sign_ext {
            data = match len {
                1 => extract_signed_field64(data, 0, 8),
                2 => extract_signed_field64(data, 0, 16),
                4 => extract_signed_field64(data, 0, 32),
                _ => data,
            };
        }
        Ok(data)
    }

    /// Writes the low `len` bytes of `val` at `v_adr`.
    pub(crate) fn data_write(
        &mut self,
        sys: &mut System,
        v_adr: Word,
        val: Word,
        len: usize,
        force_uncached: bool,
    ) -> Result<(), Trap> {
        let (p_adr, uncached) = self.data_translate(v_adr, len, Access::Write)?;

        // A read-only target rejects the store before the line could be
        // cached dirty.
        if !sys.is_writable(p_adr) {
            return Err(Trap::DataProtection(v_adr));
        }

        let mut buf = [0u8; 8];
        store_be(&mut buf[..len], val as u64);
        let req = self.mod_num();
        match self
            .d_cache
            .write(sys, req, p_adr, &buf[..len], uncached || force_uncached)
        {
            Ok(hit) => self.note_dcache(hit),
            Err(err) => return Err(self.bus_to_trap(err)),
        }
        Ok(())
    }

    /// Physical address of a data access without performing it; used by the
    /// LDR/STC reservation bookkeeping.
    pub(crate) fn data_phys_adr(&mut self, v_adr: Word, len: usize) -> Result<Word, Trap> {
        self.data_translate(v_adr, len, Access::Read).map(|(p, _)| p)
    }
}
