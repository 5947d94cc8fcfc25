use t64_core::common::bits::store_be;
use t64_core::common::Word;
use t64_core::config::Config;
use t64_core::core::Processor;
use t64_core::isa::asm::assemble_line;
use t64_core::sim::{RegKind, Simulator};

/// PSR bit granting privileged execution.
pub const PSR_X: Word = 1 << 61;

/// Default processor module number of the harness system.
pub const PROC: u32 = 0;

/// Builds a one-processor, one-RAM system: processor module 0, 16 MiB of
/// RAM as module 1 starting at physical address 0.
pub struct TestContext {
    pub sim: Simulator,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    pub fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let config = Config::default();
        let sim = Simulator::new(&config).expect("default system builds");
        Self { sim }
    }

    pub fn proc(&self) -> &Processor {
        self.sim
            .system
            .module(PROC)
            .and_then(|m| m.as_processor())
            .expect("processor module 0")
    }

    pub fn proc_mut(&mut self) -> &mut Processor {
        self.sim
            .system
            .module_mut(PROC)
            .and_then(|m| m.as_processor_mut())
            .expect("processor module 0")
    }

    /// Assembles and stores a sequence of instructions at `adr`, then points
    /// the processor there, privileged.
    pub fn load_program(&mut self, adr: Word, lines: &[&str]) {
        let words: Vec<u32> = lines
            .iter()
            .map(|line| assemble_line(line).unwrap_or_else(|e| panic!("asm {:?}: {}", line, e)))
            .collect();
        self.store_words(adr, &words);
        self.set_psr(adr | PSR_X);
    }

    /// Stores raw instruction words at `adr` in bus (big-endian) order.
    pub fn store_words(&mut self, adr: Word, words: &[u32]) {
        for (idx, word) in words.iter().enumerate() {
            let mut buf = [0u8; 4];
            store_be(&mut buf, *word as u64);
            self.sim
                .system
                .write_mem(adr + (idx as Word) * 4, &buf)
                .expect("program store");
        }
    }

    pub fn set_reg(&mut self, reg: usize, val: Word) {
        self.proc_mut().set_general_reg(reg, val);
    }

    pub fn get_reg(&self, reg: usize) -> Word {
        self.proc().general_reg(reg)
    }

    pub fn set_psr(&mut self, val: Word) {
        self.sim
            .register_set(PROC, RegKind::Psr, 0, val)
            .expect("psr set");
    }

    pub fn psr(&self) -> Word {
        self.proc().psr()
    }

    pub fn step(&mut self, n: u64) {
        self.sim.step(n);
    }
}
