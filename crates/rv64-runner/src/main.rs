//! Command-line driver for the RV64 functional simulator.
//!
//! Loads an ELF64 guest, maps a stack, installs the requested translation
//! regime and runs until the guest's environment call. The guest exit
//! code convention is `a7`; it becomes the process exit code.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use rv64_elf::{DEFAULT_STACK_PAGES, Loader};
use rv64_hart::reg;
use rv64_mem::TranslationMode;
use rv64_sim::Simulator;
use sim_core::SimStatus;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Bare,
    Sv39,
    Sv48,
    Sv57,
}

impl From<ModeArg> for TranslationMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Bare => Self::Bare,
            ModeArg::Sv39 => Self::Sv39,
            ModeArg::Sv48 => Self::Sv48,
            ModeArg::Sv57 => Self::Sv57,
        }
    }
}

/// User-mode RV64I functional simulator.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Guest ELF64 image to run.
    elf: PathBuf,

    /// Address-translation mode for the guest address space.
    #[arg(long, value_enum, default_value = "sv39")]
    mode: ModeArg,

    /// Stack size in 4 KiB pages.
    #[arg(long, default_value_t = DEFAULT_STACK_PAGES)]
    stack_pages: u64,

    /// Dump all general-purpose registers after the run.
    #[arg(long)]
    dump_regs: bool,
}

fn dump_registers(sim: &Simulator) {
    println!("pc   = {:#018x}", sim.hart().pc);
    for (idx, name) in reg::NAMES.iter().enumerate() {
        println!("{name:<4} = {:#018x}", sim.hart().gpr.read(idx));
    }
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mode = TranslationMode::from(args.mode);

    let image = fs::read(&args.elf)
        .with_context(|| format!("reading guest image {}", args.elf.display()))?;

    let mut sim = Simulator::new();

    let mut loader = Loader::new(sim.phys_memory_mut(), mode);
    let entry = loader
        .load_elf(&image)
        .context("loading guest image into memory")?;
    let start_sp = loader
        .map_stack(args.stack_pages)
        .context("mapping guest stack")?;
    let satp = loader.satp();
    drop(loader);

    sim.hart_mut().gpr.write(reg::SP, start_sp);
    sim.set_satp(satp);

    info!(entry, start_sp, ?mode, "starting guest");

    let status = sim.simulate(entry);
    let icount = sim.icount();

    if status != SimStatus::Ok {
        if args.dump_regs {
            dump_registers(&sim);
        }
        bail!(
            "simulation failed with {status:?} at pc {:#x} after {icount} instructions",
            sim.hart().pc
        );
    }

    let exit_code = sim.hart().gpr.read(reg::A7);
    println!("guest exited with code {exit_code}, {icount} instructions retired");

    if args.dump_regs {
        dump_registers(&sim);
    }

    Ok(ExitCode::from(exit_code as u8))
}
