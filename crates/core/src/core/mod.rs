//! Processor module: CPU state plus its TLBs and caches.
//!
//! The processor owns the architectural state the debugger inspects:
//! 1. **Registers:** general and control register files, the PSR and the
//!    current instruction register.
//! 2. **Memory hierarchy:** split instruction/data TLBs and caches, created
//!    with the module and destroyed with it.
//! 3. **Step loop:** fetch, execute, and catch the trap value exactly once.
//!
//! The PSR packs the instruction address into bits 2..51; bit 0 enables
//! region-id checking, bit 61 is privileged execution ("X") and bit 63 is
//! the trap-state mask ("M"). Branches replace only the IA field, so the
//! status bits survive control transfers.

pub mod exec;
pub mod memory;
pub mod trap;

use crate::common::bits::{add_adr_ofs32, extract_bit64};
use crate::common::reg::{ControlRegs, GeneralRegs};
use crate::common::{Instr, Word};
use crate::config::defaults::PHYS_MEM_LIMIT;
use crate::config::ProcConfig;
use crate::isa::instruction::InstrBits;
use crate::soc::module::{BusOp, Module, ModuleKind, WriteBack};
use crate::soc::System;
use crate::stats::ProcStats;
use crate::units::cache::{Cache, CacheSide};
use crate::units::tlb::{Tlb, TlbSide};

/// PSR bit: interrupt masked / trap state.
pub const PSR_M_BIT: u32 = 63;
/// PSR bit: privileged execution.
pub const PSR_X_BIT: u32 = 61;
/// PSR bit: region-id checking enabled.
pub const PSR_R_BIT: u32 = 0;

/// Bits 2..51 of the PSR: the instruction address field. IA bits 0..1 are
/// always zero; bits 0..1 of the PSR itself carry status.
pub const PSR_IA_FIELD: u64 = 0x000F_FFFF_FFFF_FFFC;

/// A processor module: one CPU core with split TLBs and caches.
pub struct Processor {
    mod_num: u32,
    pub gregs: GeneralRegs,
    pub cregs: ControlRegs,
    psr: Word,
    instr_reg: Instr,
    /// Line-aligned physical address of an active LDR reservation.
    resv_adr: Option<Word>,
    lower_phys_mem: Word,
    upper_phys_mem: Word,
    pub i_tlb: Tlb,
    pub d_tlb: Tlb,
    pub i_cache: Cache,
    pub d_cache: Cache,
    halted: bool,
    /// Most recent trap taken, for the diagnostic surface.
    pub last_trap: Option<crate::common::Trap>,
    pub stats: ProcStats,
}

impl Processor {
    pub fn new(config: &ProcConfig) -> Self {
        Self {
            mod_num: config.mod_num,
            gregs: GeneralRegs::new(),
            cregs: ControlRegs::new(),
            psr: 0,
            instr_reg: 0,
            resv_adr: None,
            lower_phys_mem: 0,
            upper_phys_mem: PHYS_MEM_LIMIT,
            i_tlb: Tlb::new(TlbSide::Instr, config.i_tlb),
            d_tlb: Tlb::new(TlbSide::Data, config.d_tlb),
            i_cache: Cache::new(CacheSide::Instr, config.i_cache),
            d_cache: Cache::new(CacheSide::Data, config.d_cache),
            halted: false,
            last_trap: None,
            stats: ProcStats::default(),
        }
    }

    /// Module number of this processor.
    pub fn mod_num(&self) -> u32 {
        self.mod_num
    }

    // Register access for the debugger and the instruction handlers.

    pub fn general_reg(&self, idx: usize) -> Word {
        self.gregs.read(idx)
    }

    pub fn set_general_reg(&mut self, idx: usize, val: Word) {
        self.gregs.write(idx, val);
    }

    pub fn control_reg(&self, idx: usize) -> Word {
        self.cregs.read(idx)
    }

    pub fn set_control_reg(&mut self, idx: usize, val: Word) {
        self.cregs.write(idx, val);
    }

    pub fn psr(&self) -> Word {
        self.psr
    }

    pub fn set_psr(&mut self, val: Word) {
        self.psr = val;
    }

    pub fn halted(&self) -> bool {
        self.halted
    }

    pub(crate) fn halt(&mut self) {
        self.halted = true;
    }

    /// The current instruction address: PSR bits 2..51.
    pub fn psr_ia(&self) -> Word {
        (self.psr as u64 & PSR_IA_FIELD) as Word
    }

    /// Installs a branch target into the IA field, preserving status bits.
    pub(crate) fn install_ia(&mut self, target: Word) {
        self.psr =
            ((self.psr as u64 & !PSR_IA_FIELD) | (target as u64 & PSR_IA_FIELD)) as Word;
    }

    /// Advances to the next sequential instruction. The +4 never carries
    /// into the status bits.
    pub(crate) fn next_instr(&mut self) {
        self.psr = add_adr_ofs32(self.psr, 4);
    }

    pub(crate) fn is_priv(&self) -> bool {
        extract_bit64(self.psr, PSR_X_BIT)
    }

    // Register fields of the current instruction.

    pub(crate) fn reg_r(&self, instr: Instr) -> Word {
        self.gregs.read(instr.reg_r())
    }

    pub(crate) fn reg_b(&self, instr: Instr) -> Word {
        self.gregs.read(instr.reg_b())
    }

    pub(crate) fn reg_a(&self, instr: Instr) -> Word {
        self.gregs.read(instr.reg_a())
    }

    pub(crate) fn set_reg_r(&mut self, instr: Instr, val: Word) {
        self.gregs.write(instr.reg_r(), val);
    }

    pub(crate) fn set_reservation(&mut self, line_adr: Word) {
        self.resv_adr = Some(line_adr);
    }

    pub(crate) fn take_reservation(&mut self) -> Option<Word> {
        self.resv_adr.take()
    }

    /// Resets registers, PSR, reservation, TLBs, caches and statistics.
    pub fn reset(&mut self) {
        self.gregs.reset();
        self.cregs.reset();
        self.psr = 0;
        self.instr_reg = 0;
        self.resv_adr = None;
        self.i_tlb.reset();
        self.d_tlb.reset();
        self.i_cache.reset();
        self.d_cache.reset();
        self.halted = false;
        self.last_trap = None;
        self.stats.reset();
    }

    /// Executes one instruction: fetch through the I-side, dispatch, and
    /// record a trap if one unwinds out. The PSR is not advanced on a trap.
    pub fn step(&mut self, sys: &mut System) {
        if self.halted {
            return;
        }

        let ia = self.psr_ia();
        let outcome = self
            .instr_read(sys, ia)
            .and_then(|instr| {
                self.instr_reg = instr;
                self.exec_instr(sys, instr)
            });

        match outcome {
            Ok(()) => self.stats.instructions += 1,
            Err(trap) => {
                // A runaway bus condition halts the processor instead of
                // trapping; the diagnostic is already logged.
                if !self.halted {
                    self.take_trap(trap);
                }
            }
        }
    }
}

impl Module for Processor {
    fn mod_num(&self) -> u32 {
        self.mod_num
    }

    fn kind(&self) -> ModuleKind {
        ModuleKind::Processor
    }

    /// A processor owns no SPA range; it is never the target of a cache
    /// operation.
    fn spa_range(&self) -> Option<(Word, Word)> {
        None
    }

    fn reset(&mut self) {
        Processor::reset(self);
    }

    fn step(&mut self, sys: &mut System) {
        Processor::step(self, sys);
    }

    fn read_bytes(&mut self, p_adr: Word, _buf: &mut [u8]) -> Result<(), crate::common::BusError> {
        Err(crate::common::BusError::NoTarget(p_adr))
    }

    fn write_bytes(&mut self, p_adr: Word, _data: &[u8]) -> Result<(), crate::common::BusError> {
        Err(crate::common::BusError::NoTarget(p_adr))
    }

    /// Observer reactions per the coherence protocol. A private or uncached
    /// transfer that covers an active reservation also clears it.
    fn observe(&mut self, op: BusOp, p_adr: Word) -> Vec<WriteBack> {
        let mut writebacks = Vec::new();
        match op {
            BusOp::ReadSharedBlock => {
                writebacks.extend(self.i_cache.observe_read_shared(p_adr));
                writebacks.extend(self.d_cache.observe_read_shared(p_adr));
            }
            BusOp::ReadPrivateBlock | BusOp::ReadUncached | BusOp::WriteUncached => {
                writebacks.extend(self.i_cache.observe_read_private(p_adr));
                writebacks.extend(self.d_cache.observe_read_private(p_adr));
                if let Some(resv) = self.resv_adr {
                    if self.d_cache.line_adr(p_adr) == resv {
                        self.resv_adr = None;
                    }
                }
            }
        }
        writebacks
    }

    fn as_processor(&self) -> Option<&Processor> {
        Some(self)
    }

    fn as_processor_mut(&mut self) -> Option<&mut Processor> {
        Some(self)
    }
}
