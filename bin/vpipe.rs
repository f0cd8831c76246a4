use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use vpipe::simulator::config::config::{load_and_merge_configs, CliOverrides};
use vpipe::simulator::sim::shell::{Command, Shell};
use vpipe::simulator::utils::log::{init_log, set_quiet};
use vpipe::{load_trace, CoreError, RunStatus, Simulator};

/// vpipe - cycle-level RISC-V vector pipeline model
#[derive(Parser, Debug)]
#[command(name = "vpipe")]
#[command(version = "0.1.0")]
#[command(about = "Timing model of a RISC-V vector pipeline: decode, issue and retire", long_about = None)]
struct Args {
  /// Instruction trace (JSON array of instruction records)
  trace: PathBuf,

  /// Configuration file merged over the built-in defaults
  #[arg(short, long, value_name = "FILE")]
  config: Option<String>,

  /// Stop after N cycles (default: simulation.max_cycles)
  #[arg(long, value_name = "N")]
  cycles: Option<u64>,

  /// Vector register length in bits
  #[arg(long, value_name = "BITS")]
  vlen: Option<u32>,

  /// Reorder buffer entries
  #[arg(long, value_name = "N")]
  rob_size: Option<usize>,

  /// Write every delivered message to FILE as JSON lines
  #[arg(long, value_name = "FILE")]
  trace_file: Option<String>,

  /// Quiet mode (warnings and errors only)
  #[arg(short, long)]
  quiet: bool,

  /// Enable step mode (interactive stepping)
  #[arg(short, long)]
  step: bool,

  /// Print per-model event records at the end
  #[arg(long)]
  records: bool,
}

fn print_summary(simulator: &mut Simulator) -> Result<(), CoreError> {
  let cores = simulator.config().simulation.num_cores;
  let iq_names: Vec<String> = simulator.config().issue_queues.iter().map(|iq| iq.name.clone()).collect();
  println!("--- cycle {} ---", simulator.cycle());
  if let Some(fault) = simulator.halted() {
    println!("halted: {}", fault);
  }
  for core in 0..cores {
    let decode = simulator.decode(core)?;
    println!("core{} decode: {}", core, serde_json::to_string(&decode)?);
    for name in &iq_names {
      let iq = simulator.issue_queue(core, name)?;
      println!("core{} {}: {}", core, name, serde_json::to_string(&iq)?);
    }
    let rob = simulator.rob(core)?;
    println!("core{} rob: {}", core, serde_json::to_string(&rob)?);
  }
  Ok(())
}

fn run_step_mode(simulator: &mut Simulator) -> Result<(), CoreError> {
  println!("Step mode - Enter: 1 cycle, 'si N': N cycles, 'p <path>': print model, 'c': continue, 'q': quit");
  let mut shell = Shell::new()?;
  loop {
    match shell.read_command()? {
      Command::Step(n) => {
        if simulator.run(n)? == RunStatus::Idle {
          println!("idle at cycle {}", simulator.cycle());
        }
      },
      Command::Print(path) => match simulator.status(&path) {
        Ok(status) => println!("{}", status),
        Err(e) => eprintln!("Error: {}", e),
      },
      Command::Continue => {
        simulator.run_to_completion()?;
        return Ok(());
      },
      Command::Quit => return Ok(()),
    }
  }
}

fn run(args: Args) -> Result<(), CoreError> {
  let root = std::env::current_dir()?;
  let cli = CliOverrides {
    quiet: args.quiet,
    step: args.step,
    trace_file: args.trace_file.clone(),
    vlen: args.vlen,
    rob_size: args.rob_size,
    max_cycles: args.cycles,
  };
  let config = load_and_merge_configs(args.config.as_deref(), Path::new(&root), &cli).map_err(CoreError::Config)?;
  set_quiet(config.simulation.quiet);

  let trace = load_trace(&args.trace)?;
  let mut simulator = Simulator::new(config)?;
  simulator.load_trace(&trace)?;

  let result = if simulator.config().simulation.step_mode {
    run_step_mode(&mut simulator)
  } else {
    simulator.run_to_completion().map(|_| ())
  };

  if args.records {
    simulator.print_records();
  }
  print_summary(&mut simulator)?;
  result
}

fn main() -> ExitCode {
  init_log();
  let args = Args::parse();

  match run(args) {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      log::error!("{}", e);
      ExitCode::FAILURE
    },
  }
}
