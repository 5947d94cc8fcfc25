//! Trap recording and redirection.
//!
//! A trap aborts the current instruction; the step loop catches the value
//! and lands here. Entry saves the interrupted context into the control
//! registers and redirects execution to the trap vector. The handler starts
//! masked and privileged; RFI restores the saved PSR.

use log::debug;

use crate::common::bits::deposit_field64;
use crate::common::error::Trap;
use crate::common::reg::{CR_IARG0, CR_IARG1, CR_IINSTR, CR_IPSR, CR_TVA};
use crate::common::Word;
use crate::core::{Processor, PSR_IA_FIELD, PSR_M_BIT, PSR_X_BIT};

impl Processor {
    /// Records a trap: saves PSR, instruction word and arguments into the
    /// control registers and resumes at the trap vector address. Traps
    /// raised inside a handler are recorded the same way; the previous
    /// context is overwritten.
    pub(crate) fn take_trap(&mut self, trap: Trap) {
        let (arg0, arg1) = trap.args();
        debug!(
            "processor {}: {} at ia {:#x}",
            self.mod_num(),
            trap,
            self.psr_ia()
        );

        self.last_trap = Some(trap);

        let psr = self.psr();
        self.cregs.write(CR_IPSR, psr);
        self.cregs.write(CR_IINSTR, self.instr_reg as Word);
        self.cregs.write(CR_IARG0, arg0);
        self.cregs.write(CR_IARG1, arg1);

        // With no trap vector configured there is nothing to resume into;
        // the processor halts. RUN uses this as its stop condition.
        let tva = self.cregs.read(CR_TVA);
        if tva == 0 {
            self.stats.traps += 1;
            self.halt();
            return;
        }
        let mut new_psr = (psr as u64 & !PSR_IA_FIELD) as Word;
        new_psr = ((new_psr as u64) | (tva as u64 & PSR_IA_FIELD)) as Word;
        new_psr = deposit_field64(new_psr, PSR_M_BIT, 1, 1);
        new_psr = deposit_field64(new_psr, PSR_X_BIT, 1, 1);
        self.set_psr(new_psr);

        self.stats.traps += 1;
    }

    /// The instruction word currently in the instruction register.
    pub fn instr_word(&self) -> u32 {
        self.instr_reg
    }
}
