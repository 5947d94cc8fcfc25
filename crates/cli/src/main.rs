//! T64 simulator CLI.
//!
//! Builds a system from a JSON config file (or the built-in default of one
//! processor and one RAM module), preloads the configured program image and
//! runs until every processor halts. Exit codes: 0 for a clean exit, the
//! value of the EXIT_CODE environment variable when a program set one, 255
//! on error.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use log::info;

use t64_core::config::defaults::RUN_STEP_LIMIT;
use t64_core::config::Config;
use t64_core::sim::env::ENV_EXIT_CODE;
use t64_core::sim::{loader, RegKind, Simulator};
use t64_core::soc::ModuleKind;

/// PSR bit granting privileged execution, set for the boot processor.
const PSR_X: i64 = 1 << 61;

#[derive(Parser, Debug)]
#[command(
    name = "t64sim",
    author,
    version,
    about = "T64 64-bit processor simulator",
    long_about = "Simulates a multi-module T64 system: processor modules with \
split TLBs and caches, memory modules, and a shared coherent bus.\n\n\
Examples:\n  t64sim --configfile=system.json\n  t64sim --verbose --logfile=run.log"
)]
struct Cli {
    /// Verbose progress reporting.
    #[arg(long)]
    verbose: bool,

    /// System configuration file (JSON).
    #[arg(long = "configfile", value_name = "PATH")]
    config_file: Option<PathBuf>,

    /// Redirect log output to a file.
    #[arg(long = "logfile", value_name = "PATH")]
    log_file: Option<PathBuf>,
}

fn init_logging(cli: &Cli) {
    let mut builder = env_logger::Builder::from_default_env();
    if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    if let Some(path) = &cli.log_file {
        match fs::File::create(path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(err) => {
                eprintln!("cannot open log file {}: {}", path.display(), err);
                process::exit(255);
            }
        }
    }
    builder.init();
}

fn load_config(cli: &Cli) -> Config {
    let path = match &cli.config_file {
        Some(path) => path,
        None => return Config::default(),
    };
    let text = fs::read_to_string(path).unwrap_or_else(|err| {
        eprintln!("cannot read config {}: {}", path.display(), err);
        process::exit(255);
    });
    serde_json::from_str(&text).unwrap_or_else(|err| {
        eprintln!("invalid config {}: {}", path.display(), err);
        process::exit(255);
    })
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);
    let config = load_config(&cli);

    let mut sim = Simulator::new(&config).unwrap_or_else(|err| {
        eprintln!("cannot build system: {}", err);
        process::exit(255);
    });

    if cli.verbose {
        println!(
            "system: {} modules ({} processors)",
            sim.system.module_nums().len(),
            config.processors.len()
        );
    }

    if let Some(program) = &config.program {
        let image = loader::load_binary(&PathBuf::from(&program.path)).unwrap_or_else(|err| {
            eprintln!("{}", err);
            process::exit(255);
        });
        if let Err(err) = loader::load_image(&mut sim.system, program.load_adr, &image) {
            eprintln!("cannot load program: {}", err);
            process::exit(255);
        }
        info!(
            "loaded {} bytes at {:#x}, start {:#x}",
            image.len(),
            program.load_adr,
            program.start_adr
        );
        if let Some(proc_cfg) = config.processors.first() {
            // Boot: processor 0 starts privileged at the program entry.
            sim.register_set(proc_cfg.mod_num, RegKind::Psr, 0, program.start_adr | PSR_X)
                .ok();
        }
    }

    let stepped = sim.run(RUN_STEP_LIMIT);
    info!("executed {} instructions", stepped);

    for num in sim.system.module_nums() {
        if let Some(module) = sim.system.module(num) {
            if module.kind() == ModuleKind::Processor {
                if let Some(proc) = module.as_processor() {
                    println!("processor {}: {}", num, proc.stats.summary());
                }
            }
        }
    }

    let exit_code = sim.env.get_int(ENV_EXIT_CODE, 0);
    std::io::stdout().flush().ok();
    process::exit((exit_code & 0xFF) as i32);
}
