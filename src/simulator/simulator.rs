use serde::de::DeserializeOwned;
use serde::Deserialize;
use sim::models::Reportable;
use sim::simulator::Simulation;
use std::f64::INFINITY;
use std::fs::File;
use std::io::BufWriter;

use super::config::config::AppConfig;
use super::sim::inject::inject_message;
use super::sim::mode::RunStatus;
use super::sim::model::{model_step, next_event_in};
use super::utils::report;
use crate::cpu::bundles::inst::InstRecord;
use crate::cpu::decode::DecodeSnapshot;
use crate::cpu::fetch::events::TRACE_PORT;
use crate::cpu::issue::IssueQueueSnapshot;
use crate::cpu::main::{create_simulation, decode_path, fetch_path, issue_queue_path, rob_path};
use crate::cpu::rob::RobSnapshot;
use crate::error::{CoreError, Fault};

/// Any status snapshot that may carry a fault.
#[derive(Deserialize)]
struct FaultStatus {
  #[serde(default)]
  fault: Option<Fault>,
}

/// Top-level driver: owns the kernel, injects programs, advances cycles and
/// serves status queries by model path.
pub struct Simulator {
  config: AppConfig,
  simulation: Simulation,
  cycle: f64,
  halted: Option<Fault>,
  trace_writer: Option<BufWriter<File>>,
}

impl Simulator {
  pub fn new(config: AppConfig) -> Result<Self, CoreError> {
    let simulation = create_simulation(&config);
    let trace_writer = if config.simulation.trace_file.is_empty() {
      None
    } else {
      let file = File::create(&config.simulation.trace_file)?;
      log::info!("message trace: {}", config.simulation.trace_file);
      Some(BufWriter::new(file))
    };
    Ok(Self {
      config,
      simulation,
      cycle: 0.0,
      halted: None,
      trace_writer,
    })
  }

  pub fn config(&self) -> &AppConfig {
    &self.config
  }

  /// Current cycle.
  pub fn cycle(&self) -> u64 {
    self.cycle as u64
  }

  pub fn halted(&self) -> Option<&Fault> {
    self.halted.as_ref()
  }

  /// Hand the program to the fetch model of every core.
  pub fn load_trace(&mut self, trace: &[InstRecord]) -> Result<(), CoreError> {
    let content = serde_json::to_string(trace)?;
    for core in 0..self.config.simulation.num_cores {
      inject_message(
        &mut self.simulation,
        &fetch_path(core),
        None,
        None,
        TRACE_PORT,
        &content,
      );
    }
    log::info!("loaded {} instructions", trace.len());
    Ok(())
  }

  /// Advance `cycles` cycles, or until nothing is left to do.
  pub fn run(&mut self, cycles: u64) -> Result<RunStatus, CoreError> {
    if let Some(fault) = &self.halted {
      return Err(CoreError::Halted(fault.clone()));
    }
    let horizon = self.cycle + cycles as f64;

    loop {
      let next = if self.simulation.get_messages().is_empty() {
        next_event_in(&mut self.simulation)
      } else {
        0.0
      };
      if next == INFINITY {
        self.cycle = self.cycle.max(self.simulation.get_global_time());
        return Ok(RunStatus::Idle);
      }
      if self.simulation.get_global_time() + next > horizon {
        self.cycle = horizon;
        return Ok(RunStatus::CycleLimit);
      }

      if let Err(err) = model_step(&mut self.simulation, &mut self.trace_writer) {
        return Err(self.on_step_error(err));
      }
    }
  }

  /// Run until idle, bounded by `max_cycles` from the configuration.
  pub fn run_to_completion(&mut self) -> Result<RunStatus, CoreError> {
    let remaining = self.config.simulation.max_cycles.saturating_sub(self.cycle());
    let status = self.run(remaining)?;
    if status == RunStatus::CycleLimit {
      log::warn!(
        "stopped at the cycle limit ({}) with work still in flight",
        self.config.simulation.max_cycles
      );
    }
    Ok(status)
  }

  /// A failed step leaves the fault in the status of the model that raised it.
  fn on_step_error(&mut self, err: CoreError) -> CoreError {
    let fault = self.simulation.models().iter().find_map(|model| {
      serde_json::from_str::<FaultStatus>(&model.status())
        .ok()
        .and_then(|status| status.fault)
    });
    match fault {
      Some(fault) => {
        log::error!("simulation halted at t={}: {}", self.simulation.get_global_time(), fault);
        self.halted = Some(fault.clone());
        CoreError::Fault(fault)
      },
      None => {
        self.halted = Some(Fault::invariant("kernel", err.to_string()));
        err
      },
    }
  }

  /// Raw status string of the model registered at `path`.
  pub fn status(&mut self, path: &str) -> Result<String, CoreError> {
    self
      .simulation
      .models()
      .iter()
      .find(|model| model.id() == path)
      .map(|model| model.status())
      .ok_or_else(|| CoreError::UnknownPath(path.to_string()))
  }

  pub fn query<T: DeserializeOwned>(&mut self, path: &str) -> Result<T, CoreError> {
    let status = self.status(path)?;
    Ok(serde_json::from_str(&status)?)
  }

  pub fn decode(&mut self, core: usize) -> Result<DecodeSnapshot, CoreError> {
    self.query(&decode_path(core))
  }

  pub fn issue_queue(&mut self, core: usize, name: &str) -> Result<IssueQueueSnapshot, CoreError> {
    self.query(&issue_queue_path(core, name))
  }

  pub fn rob(&mut self, core: usize) -> Result<RobSnapshot, CoreError> {
    self.query(&rob_path(core))
  }

  pub fn print_records(&mut self) {
    report::print_simulation_records(&mut self.simulation);
  }

  pub fn print_status(&mut self) {
    report::print_status(&mut self.simulation);
  }
}
