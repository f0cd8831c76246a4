use serde::{Deserialize, Serialize};
use sim::models::model_trait::{DevsModel, Reportable, ReportableModel, SerializableModel};
use sim::models::{ModelMessage, ModelRecord};
use sim::simulator::Services;
use sim::utils::errors::SimulationError;
use std::f64::INFINITY;

use super::unit::reorder_buffer::{ReorderBuffer, RobEntry};
use crate::cpu::bundles::uop::{InstId, MicroOp};
use crate::cpu::bundles::{decode, encode};
use crate::cpu::issue::unit::scoreboard::{self, SharedScoreboard};
use crate::error::Fault;
use crate::model_record;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobSnapshot {
  pub occupancy: usize,
  pub capacity: usize,
  pub retired_insts: u64,
  pub head: Option<InstId>,
  pub last_retired: Option<RobEntry>,
  pub fault: Option<Fault>,
}

/// ROB (Reorder Buffer): allocates decoded uops, dispatches them to their
/// issue queue one cycle later and retires completed uops in order.
#[derive(Debug, Clone)]
pub struct Rob {
  ports_in: PortsIn,
  ports_out: PortsOut,
  state: State,
  records: Vec<ModelRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PortsIn {
  decoded: String,
  complete: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PortsOut {
  /// One port per issue queue, indexed by queue number.
  dispatch: Vec<String>,
  credits: String,
}

#[derive(Debug, Clone)]
struct State {
  until_next_event: f64,
  buffer: ReorderBuffer,
  pending_dispatch: Vec<MicroOp>,
  retire_width: usize,
  scoreboard: SharedScoreboard,
  fault: Option<Fault>,
}

pub fn dispatch_port(iq: usize) -> String {
  format!("rob_iq{}", iq)
}

impl Rob {
  pub fn new(rob_size: usize, retire_width: usize, num_iqs: usize, scoreboard: SharedScoreboard) -> Self {
    Self {
      ports_in: PortsIn {
        decoded: "decode_rob".to_string(),
        complete: "pipe_rob".to_string(),
      },
      ports_out: PortsOut {
        dispatch: (0..num_iqs).map(dispatch_port).collect(),
        credits: "rob_decode_credit".to_string(),
      },
      state: State {
        until_next_event: INFINITY,
        buffer: ReorderBuffer::new(rob_size),
        pending_dispatch: Vec::new(),
        retire_width,
        scoreboard,
        fault: None,
      },
      records: Vec::new(),
    }
  }

  pub fn snapshot(&self) -> RobSnapshot {
    let buffer = &self.state.buffer;
    RobSnapshot {
      occupancy: buffer.len(),
      capacity: buffer.capacity(),
      retired_insts: buffer.retired_insts(),
      head: buffer.head().map(|e| e.id()),
      last_retired: buffer.last_retired().cloned(),
      fault: self.state.fault.clone(),
    }
  }

  fn fail(&mut self, services: &Services, fault: Fault) -> SimulationError {
    log::error!("rob: {}", fault);
    model_record!(self, services, "fault", fault);
    self.state.fault = Some(fault);
    self.state.until_next_event = INFINITY;
    SimulationError::InvalidModelState
  }

  fn complete(&mut self, id: InstId) -> Result<(), Fault> {
    let entry = self.state.buffer.complete(id)?;
    scoreboard::lock(&self.state.scoreboard).complete(id, &entry.uop.dests);
    Ok(())
  }
}

impl DevsModel for Rob {
  fn events_ext(&mut self, msg_input: &ModelMessage, services: &mut Services) -> Result<(), SimulationError> {
    // -----------------------------------------------------
    // EnterRob
    // -----------------------------------------------------
    if msg_input.port_name == self.ports_in.decoded {
      let uops: Vec<MicroOp> = decode(&msg_input.content)?;
      for uop in uops {
        if let Err(fault) = self.state.buffer.allocate(uop.clone()).map(|_| ()) {
          return Err(self.fail(services, fault));
        }
        model_record!(self, services, "allocate", "uop {} {}", uop.id, uop.mnemonic);
        self.state.pending_dispatch.push(uop);
      }
    // -----------------------------------------------------
    // Completion from an execution pipe
    // -----------------------------------------------------
    } else if msg_input.port_name == self.ports_in.complete {
      let ids: Vec<InstId> = decode(&msg_input.content)?;
      for id in ids {
        if let Err(fault) = self.complete(id) {
          return Err(self.fail(services, fault));
        }
        model_record!(self, services, "complete", "uop {}", id);
      }
    }
    self.state.until_next_event = self.state.until_next_event.min(1.0);
    Ok(())
  }

  fn events_int(&mut self, services: &mut Services) -> Result<Vec<ModelMessage>, SimulationError> {
    let mut msg_output = Vec::new();

    // -----------------------------------------------------
    // Dispatch last cycle's allocations
    // -----------------------------------------------------
    let mut per_iq: Vec<Vec<MicroOp>> = vec![Vec::new(); self.ports_out.dispatch.len()];
    let pending = std::mem::take(&mut self.state.pending_dispatch);
    for uop in pending {
      match per_iq.get_mut(uop.iq) {
        Some(batch) => batch.push(uop),
        None => {
          let fault = Fault::invariant("rob", format!("uop {} targets unknown issue queue {}", uop.id, uop.iq));
          return Err(self.fail(services, fault));
        },
      }
    }
    for (iq, batch) in per_iq.iter().enumerate() {
      if !batch.is_empty() {
        msg_output.push(ModelMessage {
          port_name: self.ports_out.dispatch[iq].clone(),
          content: encode(batch)?,
        });
      }
    }

    // -----------------------------------------------------
    // Retire
    // -----------------------------------------------------
    let mut retired = 0u32;
    while (retired as usize) < self.state.retire_width && self.state.buffer.retire_ready() {
      let entry = match self.state.buffer.retire() {
        Ok(entry) => entry,
        Err(fault) => return Err(self.fail(services, fault)),
      };
      log::debug!(
        "rob: t={} retire uop {} ({}, tail={})",
        services.global_time(),
        entry.id(),
        entry.uop.mnemonic,
        entry.has_tail()
      );
      model_record!(self, services, "retire", "uop {} {}", entry.id(), entry.uop.mnemonic);
      retired += 1;
    }
    if retired > 0 {
      msg_output.push(ModelMessage {
        port_name: self.ports_out.credits.clone(),
        content: encode(&retired)?,
      });
    }

    self.state.until_next_event = if self.state.buffer.retire_ready() { 1.0 } else { INFINITY };
    Ok(msg_output)
  }

  fn time_advance(&mut self, time_delta: f64) {
    self.state.until_next_event -= time_delta;
  }

  fn until_next_event(&self) -> f64 {
    self.state.until_next_event
  }
}

impl Reportable for Rob {
  fn status(&self) -> String {
    serde_json::to_string(&self.snapshot()).unwrap_or_default()
  }

  fn records(&self) -> &Vec<ModelRecord> {
    &self.records
  }
}

impl ReportableModel for Rob {}

impl SerializableModel for Rob {
  fn get_type(&self) -> &'static str {
    "Rob"
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cpu::isa::{ExecUnit, OpClass};

  fn uop(id: InstId) -> MicroOp {
    MicroOp {
      id,
      program_index: id,
      mnemonic: "addi".to_string(),
      class: OpClass::Scalar,
      unit: ExecUnit::Alu,
      expanded: false,
      uop_index: 0,
      uop_count: 1,
      srcs: Vec::new(),
      dests: Vec::new(),
      producers: Vec::new(),
      has_tail: false,
      iq: 0,
      vconfig: None,
    }
  }

  fn message(port: &str, content: String) -> ModelMessage {
    ModelMessage {
      port_name: port.to_string(),
      content,
    }
  }

  fn credits(out: &[ModelMessage]) -> Option<u32> {
    out
      .iter()
      .find(|msg| msg.port_name == "rob_decode_credit")
      .map(|msg| serde_json::from_str(&msg.content).unwrap())
  }

  #[test]
  fn test_retire_width_bounds_each_cycle() {
    let mut rob = Rob::new(8, 2, 1, scoreboard::shared());
    let mut services = Services::default();

    let uops: Vec<MicroOp> = (0..5).map(uop).collect();
    rob
      .events_ext(&message("decode_rob", serde_json::to_string(&uops).unwrap()), &mut services)
      .unwrap();
    let ids: Vec<InstId> = (0..5).collect();
    rob
      .events_ext(&message("pipe_rob", serde_json::to_string(&ids).unwrap()), &mut services)
      .unwrap();

    let out = rob.events_int(&mut services).unwrap();
    assert!(out.iter().any(|msg| msg.port_name == "rob_iq0"));
    assert_eq!(credits(&out), Some(2));
    assert_eq!(rob.snapshot().retired_insts, 2);
    assert_eq!(rob.until_next_event(), 1.0);

    let out = rob.events_int(&mut services).unwrap();
    assert_eq!(credits(&out), Some(2));
    assert_eq!(rob.snapshot().retired_insts, 4);

    let out = rob.events_int(&mut services).unwrap();
    assert_eq!(credits(&out), Some(1));
    let snap = rob.snapshot();
    assert_eq!((snap.retired_insts, snap.occupancy), (5, 0));
    assert_eq!(snap.last_retired.map(|e| e.id()), Some(4));
    assert_eq!(rob.until_next_event(), INFINITY);
  }
}
