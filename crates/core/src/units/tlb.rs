//! Translation Lookaside Buffer.
//!
//! A fully associative cache for address translations. Each entry maps a
//! 40-bit virtual page number to a physical page address and carries the
//! access-control data: page type, privilege level, region id and the
//! uncached flag. Replacement is least-recently-used on lookup.
//!
//! The 64-bit info word supplied by the TLB insert instructions packs the
//! physical page (`info[12..35] << 12`), the page size code (bits 36..39),
//! the access code (bits 40..43), lock bits (56..57), user bits (58..59)
//! and the uncached flag (bit 60).

use crate::common::addr::VirtAddr;
use crate::common::bits::{extract_bit64, extract_field64};
use crate::common::Word;
use crate::config::TlbKind;

/// Page access types, ordered by the access code in the info word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageType {
    Execute,
    ReadOnly,
    ReadWrite,
}

impl PageType {
    fn from_acc(acc: Word) -> Self {
        match acc & 0x3 {
            0 => PageType::Execute,
            1 => PageType::ReadOnly,
            _ => PageType::ReadWrite,
        }
    }

    /// True if the page type permits the probe mode (0 read, 1 write,
    /// 2 execute).
    pub fn permits(&self, mode: u32) -> bool {
        match mode {
            0 => true,
            1 => matches!(self, PageType::ReadWrite),
            2 => matches!(self, PageType::Execute),
            _ => false,
        }
    }
}

/// Instruction or data side, for statistics and display.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TlbSide {
    Instr,
    Data,
}

/// One TLB entry.
#[derive(Clone, Copy, Debug)]
pub struct TlbEntry {
    pub valid: bool,
    /// Virtual page number (vAdr >> 12), 40 bits.
    pub vpn: Word,
    /// Physical page base address, page aligned.
    pub p_adr: Word,
    pub page_type: PageType,
    pub priv_level: u8,
    /// Region id of the mapped page (the high 20 bits of the VPN).
    pub region_id: Word,
    pub uncached: bool,
    lru: u64,
}

impl TlbEntry {
    fn invalid() -> Self {
        Self {
            valid: false,
            vpn: 0,
            p_adr: 0,
            page_type: PageType::ReadOnly,
            priv_level: 0,
            region_id: 0,
            uncached: false,
            lru: 0,
        }
    }
}

/// Fully associative TLB.
pub struct Tlb {
    side: TlbSide,
    entries: Vec<TlbEntry>,
    clock: u64,
}

impl Tlb {
    pub fn new(side: TlbSide, kind: TlbKind) -> Self {
        Self {
            side,
            entries: vec![TlbEntry::invalid(); kind.entries()],
            clock: 0,
        }
    }

    pub fn side(&self) -> TlbSide {
        self.side
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Entry by slot index, for the debugger display.
    pub fn entry(&self, idx: usize) -> Option<&TlbEntry> {
        self.entries.get(idx)
    }

    pub fn reset(&mut self) {
        for entry in &mut self.entries {
            *entry = TlbEntry::invalid();
        }
        self.clock = 0;
    }

    /// Looks up the entry covering `v_adr`. A hit refreshes the LRU stamp.
    pub fn lookup(&mut self, v_adr: VirtAddr) -> Option<TlbEntry> {
        let vpn = v_adr.page_num();
        self.clock += 1;
        let clock = self.clock;

        for entry in &mut self.entries {
            if entry.valid && entry.vpn == vpn {
                entry.lru = clock;
                return Some(*entry);
            }
        }
        None
    }

    /// Inserts a translation built from the virtual address and info word.
    ///
    /// An existing entry for the same page is overwritten in place, making
    /// the operation idempotent; otherwise the least recently used slot is
    /// the victim.
    pub fn insert(&mut self, v_adr: VirtAddr, info: Word) {
        let vpn = v_adr.page_num();
        let acc = extract_field64(info, 40, 4);
        let entry = TlbEntry {
            valid: true,
            vpn,
            p_adr: extract_field64(info, 12, 24) << 12,
            page_type: PageType::from_acc(acc),
            priv_level: ((acc >> 2) & 0x3) as u8,
            region_id: v_adr.region_id(),
            uncached: extract_bit64(info, 60),
            lru: self.clock,
        };

        if let Some(slot) = self.entries.iter_mut().find(|e| e.valid && e.vpn == vpn) {
            *slot = entry;
            return;
        }
        let victim = self
            .entries
            .iter_mut()
            .min_by_key(|e| if e.valid { e.lru + 1 } else { 0 })
            .expect("tlb has at least one entry");
        *victim = entry;
    }

    /// Removes the entry covering `v_adr`. No-op if absent.
    pub fn purge(&mut self, v_adr: VirtAddr) {
        let vpn = v_adr.page_num();
        for entry in &mut self.entries {
            if entry.valid && entry.vpn == vpn {
                *entry = TlbEntry::invalid();
            }
        }
    }
}
