//! Simulation façade.
//!
//! `Simulator` wraps a `System` with the operations the interactive layer
//! and the tests drive:
//! 1. **Construction:** build the module population from a `Config`.
//! 2. **Execution:** `step(n)`, `run(limit)`, `reset`.
//! 3. **Debugger access:** register get/set by kind, memory read/write,
//!    assemble and disassemble passthrough.

pub mod console;
pub mod env;
pub mod loader;

pub use console::{BufferConsole, Console, StdConsole};
pub use env::{EnvValue, SimEnv};

use crate::common::error::{AsmError, SimError};
use crate::common::{Instr, Word};
use crate::config::Config;
use crate::core::Processor;
use crate::isa::asm;
use crate::isa::disasm;
use crate::soc::{MemoryModule, ModuleKind, System};

/// Register kinds addressable through the debugger surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegKind {
    General,
    Control,
    Psr,
}

/// The simulator: a system plus the debugger conveniences.
pub struct Simulator {
    pub system: System,
    pub env: SimEnv,
    console: Box<dyn Console>,
}

impl Simulator {
    /// Builds a system from the configuration: memory modules first, then
    /// processors.
    pub fn new(config: &Config) -> Result<Self, SimError> {
        let mut system = System::new();
        for mem in &config.memories {
            system.module_add(Box::new(MemoryModule::new(
                mem.mod_num,
                mem.read_only,
                mem.spa_adr,
                mem.spa_len,
            )))?;
        }
        for proc in &config.processors {
            system.module_add(Box::new(Processor::new(proc)))?;
        }
        Ok(Self {
            system,
            env: SimEnv::new(),
            console: Box::new(StdConsole),
        })
    }

    /// Replaces the console collaborator (tests use a buffering one).
    pub fn set_console(&mut self, console: Box<dyn Console>) {
        self.console = console;
    }

    /// Advances `n` instructions, round-robin over the processors.
    pub fn step(&mut self, n: u64) {
        self.system.step(n);
        self.drain_diag();
    }

    /// Runs until every processor halts or `limit` instructions have
    /// executed. Returns the number of instructions stepped.
    pub fn run(&mut self, limit: u64) -> u64 {
        let mut stepped = 0;
        while stepped < limit {
            if self.all_halted() {
                break;
            }
            self.system.step(1);
            self.drain_diag();
            stepped += 1;
        }
        stepped
    }

    /// Reports DIAG traps through the console collaborator.
    fn drain_diag(&mut self) {
        use crate::common::Trap;
        for num in self.system.module_nums() {
            let Some(module) = self.system.module_mut(num) else {
                continue;
            };
            let Some(proc) = module.as_processor_mut() else {
                continue;
            };
            if let Some(Trap::Diag { opt, arg0, arg1 }) = proc.last_trap {
                proc.last_trap = None;
                self.console.write_line(&format!(
                    "diag({}) from processor {}: {:#x} {:#x}",
                    opt, num, arg0, arg1
                ));
            }
        }
    }

    /// True when no processor can make progress.
    pub fn all_halted(&self) -> bool {
        let mut saw_proc = false;
        for num in self.system.module_nums() {
            if let Some(module) = self.system.module(num) {
                if module.kind() == ModuleKind::Processor {
                    saw_proc = true;
                    if let Some(proc) = module.as_processor() {
                        if !proc.halted() {
                            return false;
                        }
                    }
                }
            }
        }
        saw_proc
    }

    /// Resets every module.
    pub fn reset(&mut self) {
        self.system.reset();
    }

    fn processor(&self, mod_num: u32) -> Result<&Processor, SimError> {
        self.system
            .module(mod_num)
            .and_then(|module| module.as_processor())
            .ok_or(SimError::InvalidModuleNum(mod_num))
    }

    fn processor_mut(&mut self, mod_num: u32) -> Result<&mut Processor, SimError> {
        self.system
            .module_mut(mod_num)
            .and_then(|module| module.as_processor_mut())
            .ok_or(SimError::InvalidModuleNum(mod_num))
    }

    /// Reads a CPU register for the debugger.
    pub fn register_get(&self, mod_num: u32, kind: RegKind, index: usize) -> Result<Word, SimError> {
        let proc = self.processor(mod_num)?;
        Ok(match kind {
            RegKind::General => proc.general_reg(index),
            RegKind::Control => proc.control_reg(index),
            RegKind::Psr => proc.psr(),
        })
    }

    /// Writes a CPU register for the debugger.
    pub fn register_set(
        &mut self,
        mod_num: u32,
        kind: RegKind,
        index: usize,
        val: Word,
    ) -> Result<(), SimError> {
        let proc = self.processor_mut(mod_num)?;
        match kind {
            RegKind::General => proc.set_general_reg(index, val),
            RegKind::Control => proc.set_control_reg(index, val),
            RegKind::Psr => proc.set_psr(val),
        }
        Ok(())
    }

    /// Bus-level memory read for the debugger.
    pub fn read_mem(&mut self, p_adr: Word, buf: &mut [u8]) -> Result<(), SimError> {
        self.system.read_mem(p_adr, buf).map_err(SimError::from)
    }

    /// Bus-level memory write for the debugger.
    pub fn write_mem(&mut self, p_adr: Word, data: &[u8]) -> Result<(), SimError> {
        self.system.write_mem(p_adr, data).map_err(SimError::from)
    }

    /// Assembles one source line.
    pub fn assemble(&self, line: &str) -> Result<Instr, AsmError> {
        asm::assemble_line(line)
    }

    /// Disassembles an instruction word into (opcode, operands) fragments.
    pub fn disassemble(&self, instr: Instr, rdx: u32) -> (String, String) {
        (
            disasm::format_opcode(instr),
            disasm::format_operands(instr, rdx),
        )
    }
}
