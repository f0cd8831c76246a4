use serde::{Deserialize, Serialize};
use sim::models::model_trait::{DevsModel, Reportable, ReportableModel, SerializableModel};
use sim::models::{ModelMessage, ModelRecord};
use sim::simulator::Services;
use sim::utils::errors::SimulationError;
use std::collections::HashMap;
use std::f64::INFINITY;

use crate::cpu::bundles::uop::{InstId, MicroOp};
use crate::cpu::bundles::{decode, encode};
use crate::cpu::isa::ExecUnit;
use crate::error::Fault;
use crate::model_record;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipeSnapshot {
  pub in_flight: usize,
  pub completed: u64,
  pub fault: Option<Fault>,
}

/// Fully pipelined execution pipe behind one issue queue. Each uop completes
/// `latency[unit]` cycles after issue.
#[derive(Debug, Clone)]
pub struct ExecutePipe {
  port_in: String,
  port_out: String,
  until_next_event: f64,
  latency: HashMap<ExecUnit, u32>,
  in_flight: Vec<(InstId, f64)>,
  completed: u64,
  fault: Option<Fault>,
  records: Vec<ModelRecord>,
}

impl ExecutePipe {
  pub fn new(latency: HashMap<ExecUnit, u32>) -> Self {
    Self {
      port_in: "iq_pipe".to_string(),
      port_out: "pipe_rob".to_string(),
      until_next_event: INFINITY,
      latency,
      in_flight: Vec::new(),
      completed: 0,
      fault: None,
      records: Vec::new(),
    }
  }

  pub fn snapshot(&self) -> PipeSnapshot {
    PipeSnapshot {
      in_flight: self.in_flight.len(),
      completed: self.completed,
      fault: self.fault.clone(),
    }
  }

  fn latency_of(&self, uop: &MicroOp) -> Result<u32, Fault> {
    match self.latency.get(&uop.unit) {
      Some(&latency) if latency > 0 => Ok(latency),
      _ => Err(Fault::invariant(
        "execute",
        format!("no latency configured for {:?} (uop {})", uop.unit, uop.id),
      )),
    }
  }

  fn reschedule(&mut self, now: f64) {
    self.until_next_event = self
      .in_flight
      .iter()
      .map(|(_, done_at)| done_at - now)
      .fold(INFINITY, f64::min);
  }
}

impl DevsModel for ExecutePipe {
  fn events_ext(&mut self, msg_input: &ModelMessage, services: &mut Services) -> Result<(), SimulationError> {
    if msg_input.port_name == self.port_in {
      let now = services.global_time();
      let uops: Vec<MicroOp> = decode(&msg_input.content)?;
      for uop in uops {
        let latency = match self.latency_of(&uop) {
          Ok(latency) => latency,
          Err(fault) => {
            log::error!("execute: {}", fault);
            model_record!(self, services, "fault", fault);
            self.fault = Some(fault);
            self.until_next_event = INFINITY;
            return Err(SimulationError::InvalidModelState);
          },
        };
        model_record!(self, services, "execute", "uop {} {} ({} cycles)", uop.id, uop.mnemonic, latency);
        self.in_flight.push((uop.id, now + f64::from(latency)));
      }
      self.reschedule(now);
    }
    Ok(())
  }

  fn events_int(&mut self, services: &mut Services) -> Result<Vec<ModelMessage>, SimulationError> {
    let now = services.global_time();
    let (done, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.in_flight)
      .into_iter()
      .partition(|(_, done_at)| *done_at <= now);
    self.in_flight = pending;

    let mut msg_output = Vec::new();
    if !done.is_empty() {
      let ids: Vec<InstId> = done.iter().map(|(id, _)| *id).collect();
      self.completed += ids.len() as u64;
      model_record!(self, services, "complete", "uops {:?}", ids);
      msg_output.push(ModelMessage {
        port_name: self.port_out.clone(),
        content: encode(&ids)?,
      });
    }

    self.reschedule(now);
    Ok(msg_output)
  }

  fn time_advance(&mut self, time_delta: f64) {
    self.until_next_event -= time_delta;
  }

  fn until_next_event(&self) -> f64 {
    self.until_next_event
  }
}

impl Reportable for ExecutePipe {
  fn status(&self) -> String {
    serde_json::to_string(&self.snapshot()).unwrap_or_default()
  }

  fn records(&self) -> &Vec<ModelRecord> {
    &self.records
  }
}

impl ReportableModel for ExecutePipe {}

impl SerializableModel for ExecutePipe {
  fn get_type(&self) -> &'static str {
    "ExecutePipe"
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cpu::isa::OpClass;

  fn issued(unit: ExecUnit) -> ModelMessage {
    let uop = MicroOp {
      id: 7,
      program_index: 3,
      mnemonic: "vmul.vv".to_string(),
      class: OpClass::VectorOp,
      unit,
      expanded: false,
      uop_index: 0,
      uop_count: 1,
      srcs: Vec::new(),
      dests: Vec::new(),
      producers: Vec::new(),
      has_tail: false,
      iq: 1,
      vconfig: None,
    };
    ModelMessage {
      port_name: "iq_pipe".to_string(),
      content: serde_json::to_string(&vec![uop]).unwrap(),
    }
  }

  #[test]
  fn test_completes_after_latency() {
    let mut pipe = ExecutePipe::new(HashMap::from([(ExecUnit::Vmul, 4)]));
    let mut services = Services::default();
    pipe.events_ext(&issued(ExecUnit::Vmul), &mut services).unwrap();
    assert_eq!(pipe.until_next_event(), 4.0);
    assert_eq!(pipe.snapshot().in_flight, 1);
  }

  #[test]
  fn test_missing_latency_is_fatal() {
    let mut pipe = ExecutePipe::new(HashMap::from([(ExecUnit::Alu, 1)]));
    let mut services = Services::default();
    assert!(pipe.events_ext(&issued(ExecUnit::Vmul), &mut services).is_err());
    let snap = pipe.snapshot();
    assert!(matches!(snap.fault, Some(Fault::InvariantViolation { .. })));
    assert_eq!(snap.in_flight, 0);
    assert_eq!(pipe.until_next_event(), INFINITY);
  }
}
