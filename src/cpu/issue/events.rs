use serde::{Deserialize, Serialize};
use sim::models::model_trait::{DevsModel, Reportable, ReportableModel, SerializableModel};
use sim::models::{ModelMessage, ModelRecord};
use sim::simulator::Services;
use sim::utils::errors::SimulationError;
use std::f64::INFINITY;

use super::unit::queue::IssueQueue;
use super::unit::scoreboard::{self, SharedScoreboard};
use crate::cpu::bundles::credit::IqCredit;
use crate::cpu::bundles::uop::MicroOp;
use crate::cpu::bundles::{decode, encode};
use crate::error::Fault;
use crate::model_record;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueQueueSnapshot {
  pub name: String,
  pub occupancy: usize,
  pub capacity: usize,
  pub total_insts_issued: u64,
  pub raw_stall_cycles: u64,
  pub fault: Option<Fault>,
}

/// Issue queue model: receives dispatched uops from the rob, issues ready
/// ones to its execution pipe and returns slots to decode.
#[derive(Debug, Clone)]
pub struct IssueQueueModel {
  ports_in: PortsIn,
  ports_out: PortsOut,
  state: State,
  records: Vec<ModelRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PortsIn {
  dispatch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PortsOut {
  to_pipe: String,
  credits: String,
}

#[derive(Debug, Clone)]
struct State {
  index: usize,
  until_next_event: f64,
  queue: IssueQueue,
  scoreboard: SharedScoreboard,
  fault: Option<Fault>,
}

impl IssueQueueModel {
  pub fn new(index: usize, name: &str, size: usize, issue_width: usize, scoreboard: SharedScoreboard) -> Self {
    Self {
      ports_in: PortsIn {
        dispatch: "rob_iq".to_string(),
      },
      ports_out: PortsOut {
        to_pipe: "iq_pipe".to_string(),
        credits: "iq_decode_credit".to_string(),
      },
      state: State {
        index,
        until_next_event: INFINITY,
        queue: IssueQueue::new(name, size, issue_width),
        scoreboard,
        fault: None,
      },
      records: Vec::new(),
    }
  }

  pub fn snapshot(&self) -> IssueQueueSnapshot {
    let queue = &self.state.queue;
    IssueQueueSnapshot {
      name: queue.name().to_string(),
      occupancy: queue.len(),
      capacity: queue.capacity(),
      total_insts_issued: queue.total_insts_issued(),
      raw_stall_cycles: queue.raw_stall_cycles(),
      fault: self.state.fault.clone(),
    }
  }
}

impl DevsModel for IssueQueueModel {
  fn events_ext(&mut self, msg_input: &ModelMessage, services: &mut Services) -> Result<(), SimulationError> {
    if msg_input.port_name == self.ports_in.dispatch {
      let uops: Vec<MicroOp> = decode(&msg_input.content)?;
      for uop in uops {
        let id = uop.id;
        if let Err(fault) = self.state.queue.offer(uop) {
          log::error!("{}: {}", self.state.queue.name(), fault);
          model_record!(self, services, "fault", fault);
          self.state.fault = Some(fault);
          self.state.until_next_event = INFINITY;
          return Err(SimulationError::InvalidModelState);
        }
        model_record!(self, services, "enqueue", "uop {}", id);
      }
      self.state.until_next_event = self.state.until_next_event.min(1.0);
    }
    Ok(())
  }

  fn events_int(&mut self, services: &mut Services) -> Result<Vec<ModelMessage>, SimulationError> {
    let issued = {
      let sb = scoreboard::lock(&self.state.scoreboard);
      self.state.queue.tick(&sb)
    };

    let mut msg_output = Vec::new();
    if !issued.is_empty() {
      for uop in &issued {
        log::trace!("{}: t={} issue uop {} ({})", self.state.queue.name(), services.global_time(), uop.id, uop.mnemonic);
        model_record!(self, services, "issue", "uop {} {}", uop.id, uop.mnemonic);
      }
      msg_output.push(ModelMessage {
        port_name: self.ports_out.to_pipe.clone(),
        content: encode(&issued)?,
      });
      msg_output.push(ModelMessage {
        port_name: self.ports_out.credits.clone(),
        content: encode(&IqCredit {
          iq: self.state.index,
          count: issued.len() as u32,
        })?,
      });
    }

    self.state.until_next_event = if self.state.queue.is_empty() { INFINITY } else { 1.0 };
    Ok(msg_output)
  }

  fn time_advance(&mut self, time_delta: f64) {
    self.state.until_next_event -= time_delta;
  }

  fn until_next_event(&self) -> f64 {
    self.state.until_next_event
  }
}

impl Reportable for IssueQueueModel {
  fn status(&self) -> String {
    serde_json::to_string(&self.snapshot()).unwrap_or_default()
  }

  fn records(&self) -> &Vec<ModelRecord> {
    &self.records
  }
}

impl ReportableModel for IssueQueueModel {}

impl SerializableModel for IssueQueueModel {
  fn get_type(&self) -> &'static str {
    "IssueQueue"
  }
}
