use serde::{Deserialize, Serialize};
use sim::models::model_trait::{DevsModel, Reportable, ReportableModel, SerializableModel};
use sim::models::{ModelMessage, ModelRecord};
use sim::simulator::Services;
use sim::utils::errors::SimulationError;
use std::collections::VecDeque;
use std::f64::INFINITY;

use crate::cpu::bundles::inst::{FetchedInst, InstRecord};
use crate::cpu::bundles::{decode, encode};
use crate::model_record;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchSnapshot {
  pub remaining: usize,
  pub fetched: u64,
  pub credits: u32,
}

/// Instruction source: holds the injected program and feeds decode at
/// `fetch_width` per cycle, bounded by decode queue credits.
#[derive(Debug, Clone)]
pub struct Fetch {
  ports_in: PortsIn,
  port_out: String,
  state: State,
  records: Vec<ModelRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PortsIn {
  trace: String,
  credits: String,
}

#[derive(Debug, Clone)]
struct State {
  until_next_event: f64,
  program: VecDeque<FetchedInst>,
  next_index: u64,
  fetch_width: u32,
  credits: u32,
  fetched: u64,
}

pub const TRACE_PORT: &str = "trace";

impl Fetch {
  pub fn new(fetch_width: u32, decode_queue_size: u32) -> Self {
    Self {
      ports_in: PortsIn {
        trace: TRACE_PORT.to_string(),
        credits: "decode_fetch_credit".to_string(),
      },
      port_out: "fetch_decode".to_string(),
      state: State {
        until_next_event: INFINITY,
        program: VecDeque::new(),
        next_index: 0,
        fetch_width,
        credits: decode_queue_size,
        fetched: 0,
      },
      records: Vec::new(),
    }
  }

  pub fn snapshot(&self) -> FetchSnapshot {
    FetchSnapshot {
      remaining: self.state.program.len(),
      fetched: self.state.fetched,
      credits: self.state.credits,
    }
  }

  fn can_fetch(&self) -> bool {
    self.state.credits > 0 && !self.state.program.is_empty()
  }
}

impl DevsModel for Fetch {
  fn events_ext(&mut self, msg_input: &ModelMessage, services: &mut Services) -> Result<(), SimulationError> {
    if msg_input.port_name == self.ports_in.trace {
      let records: Vec<InstRecord> = decode(&msg_input.content)?;
      model_record!(self, services, "load", "{} instructions", records.len());
      for record in records {
        let index = self.state.next_index;
        self.state.next_index += 1;
        self.state.program.push_back(FetchedInst { index, record });
      }
      // fetch in the cycle the program arrives
      if self.can_fetch() {
        self.state.until_next_event = self.state.until_next_event.min(0.0);
      }
    } else if msg_input.port_name == self.ports_in.credits {
      let credits: u32 = decode(&msg_input.content)?;
      self.state.credits += credits;
      if self.can_fetch() {
        self.state.until_next_event = self.state.until_next_event.min(1.0);
      }
    }
    Ok(())
  }

  fn events_int(&mut self, services: &mut Services) -> Result<Vec<ModelMessage>, SimulationError> {
    let count = self.state.fetch_width.min(self.state.credits) as usize;
    let count = count.min(self.state.program.len());
    let group: Vec<FetchedInst> = self.state.program.drain(..count).collect();

    let mut msg_output = Vec::new();
    if !group.is_empty() {
      self.state.credits -= group.len() as u32;
      self.state.fetched += group.len() as u64;
      model_record!(self, services, "fetch", "#{}..#{}", group[0].index, group[group.len() - 1].index);
      msg_output.push(ModelMessage {
        port_name: self.port_out.clone(),
        content: encode(&group)?,
      });
    }

    self.state.until_next_event = if self.can_fetch() { 1.0 } else { INFINITY };
    Ok(msg_output)
  }

  fn time_advance(&mut self, time_delta: f64) {
    self.state.until_next_event -= time_delta;
  }

  fn until_next_event(&self) -> f64 {
    self.state.until_next_event
  }
}

impl Reportable for Fetch {
  fn status(&self) -> String {
    serde_json::to_string(&self.snapshot()).unwrap_or_default()
  }

  fn records(&self) -> &Vec<ModelRecord> {
    &self.records
  }
}

impl ReportableModel for Fetch {}

impl SerializableModel for Fetch {
  fn get_type(&self) -> &'static str {
    "Fetch"
  }
}
