use std::{fs::File, io::BufWriter, path::PathBuf, process::ExitCode};

use ansi_term::Colour;
use anyhow::{Context, Result};
use axi_cosim::{
    axi::resp,
    device::{Transaction, WaveTrace},
    load_elf, mem_diff, parse_literal, Cosim, CosimConfig, HostLayout, MemoryImage, Outcome,
    ScriptedManager, TraceWindow,
};
use binutils::{clap, verbose};
use clap::Parser;

fn parse_addr(s: &str) -> Result<u64, String> {
    parse_literal(s).ok_or_else(|| format!("`{s}` is not a decimal or 0x-prefixed address"))
}

// AXI4 cosimulation harness: memory and tohost emulation for a device model
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = None,
    styles = binutils::get_styles(),
    arg_required_else_help = true,
)]
struct Args {
    /// ELF executable to load into main memory
    binary: Option<PathBuf>,

    /// Traffic script replayed by the behavioral AXI manager
    #[arg(long)]
    script: PathBuf,

    /// Give up after this many cycles once reset is over
    #[arg(long, default_value_t = 1_000_000)]
    max_cycles: u64,

    /// Cycles with reset asserted
    #[arg(long, default_value_t = 100)]
    reset_cycles: u64,

    /// Cycles before the run starts, reset included
    #[arg(long, default_value_t = 1000)]
    settle_cycles: u64,

    /// Write a VCD waveform of the bus signals to this file
    #[arg(long, value_name = "VCD")]
    trace: Option<PathBuf>,

    /// First cycle recorded in the waveform
    #[arg(long, default_value_t = 0)]
    trace_start: u64,

    /// Number of cycles recorded in the waveform
    #[arg(long, default_value_t = 20000)]
    trace_cycles: u64,

    /// Address of the tohost register (default: the `tohost` symbol of the
    /// binary, or 0x60000000)
    #[arg(long, value_name = "ADDR", value_parser = parse_addr)]
    tohost: Option<u64>,

    /// Print the memory words changed by the run
    #[arg(long)]
    mem_diff: bool,

    #[command(flatten)]
    verbose: verbose::Verbosity,
}

fn run(args: &Args) -> Result<Outcome> {
    let mut memory = MemoryImage::default();
    let loaded = match &args.binary {
        Some(path) => Some(load_elf(path, &mut memory)?),
        None => None,
    };
    let tohost = args
        .tohost
        .or_else(|| loaded.as_ref().and_then(|elf| elf.tohost));
    let layout = tohost.map(HostLayout::at).unwrap_or_default();
    tracing::debug!("host-control layout: {layout:x?}");

    let script = std::fs::read_to_string(&args.script)
        .with_context(|| format!("could not read file `{}`", args.script.display()))?;
    let mut manager = ScriptedManager::from_script(&script)
        .with_context(|| format!("invalid script `{}`", args.script.display()))?;

    let mut config = CosimConfig::default()
        .set_reset_cycles(args.reset_cycles)
        .set_settle_cycles(args.settle_cycles)
        .set_max_cycles(args.max_cycles);
    if let Some(path) = &args.trace {
        let file = File::create(path)
            .with_context(|| format!("could not create file `{}`", path.display()))?;
        let out: Box<dyn std::io::Write> = Box::new(BufWriter::new(file));
        manager.attach_trace(WaveTrace::new(out)?);
        config = config.set_trace(Some(TraceWindow {
            start: args.trace_start,
            cycles: args.trace_cycles,
        }));
    }

    let before = args.mem_diff.then(|| memory.clone());
    let memory = memory.into_shared();
    let mut sim = Cosim::new(manager, memory.clone(), layout, std::io::stdout(), config);
    let outcome = sim.run()?;

    for t in sim.device().transcript() {
        match t {
            Transaction::Read {
                bus,
                id,
                addr,
                beats,
            } => tracing::info!(%bus, id, "read {addr:#x}: {beats:x?}"),
            Transaction::Write {
                bus,
                id,
                addr,
                resp: code,
            } => tracing::info!(%bus, id, "write {addr:#x}: {}", resp::name_of(*code)),
        }
    }
    if !sim.device().is_done() {
        tracing::warn!("run ended with scripted operations still pending");
    }
    if let Some(before) = before {
        mem_diff(&before, &memory.borrow());
    }
    Ok(outcome)
}

fn main() -> ExitCode {
    let args = Args::parse();
    binutils::logging_setup(
        binutils::verbose_level_to_trace(args.verbose.log_level()),
        None::<&File>,
    );

    match run(&args) {
        Ok(outcome @ Outcome::Finished { .. }) => {
            println!("{outcome}");
            ExitCode::from(outcome.exit_code())
        }
        Ok(outcome @ Outcome::Timeout { .. }) => {
            eprintln!("{outcome}");
            ExitCode::from(outcome.exit_code())
        }
        Err(err) => {
            eprintln!("{} {err:#}", Colour::Red.bold().paint("error:"));
            ExitCode::from(2)
        }
    }
}
