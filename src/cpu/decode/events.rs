use serde::{Deserialize, Serialize};
use sim::models::model_trait::{DevsModel, Reportable, ReportableModel, SerializableModel};
use sim::models::{ModelMessage, ModelRecord};
use sim::simulator::Services;
use sim::utils::errors::SimulationError;
use std::collections::{HashMap, VecDeque};
use std::f64::INFINITY;
use std::sync::Arc;

use super::unit::expand::{self, Slice};
use super::unit::guard;
use super::unit::vcsr::{VectorConfig, VectorConfigState};
use super::unit::vset;
use crate::cpu::bundles::credit::IqCredit;
use crate::cpu::bundles::inst::FetchedInst;
use crate::cpu::bundles::uop::{InstId, MicroOp};
use crate::cpu::bundles::{decode, encode};
use crate::cpu::isa::{ExecUnit, OpClass, OpInfo};
use crate::cpu::issue::unit::scoreboard::{self, SharedScoreboard};
use crate::error::Fault;
use crate::model_record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeMode {
  Normal,
  /// A configuration instruction is held until its register operands resolve.
  WaitingOnVset,
}

/// Status snapshot served through `Reportable::status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodeSnapshot {
  pub vcsr: VectorConfig,
  pub mode: DecodeMode,
  pub waiting_on_vset: bool,
  pub decoded_insts: u64,
  pub uops_generated: u64,
  pub vset_stall_cycles: u64,
  pub fetch_queue: usize,
  pub fault: Option<Fault>,
}

/// Decode stage: vector configuration tracking, LMUL expansion and
/// producer capture. In-order; a held vset blocks everything behind it.
#[derive(Debug, Clone)]
pub struct Decode {
  ports_in: PortsIn,
  ports_out: PortsOut,
  state: State,
  records: Vec<ModelRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PortsIn {
  fetch: String,
  rob_credits: String,
  iq_credits: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PortsOut {
  to_rob: String,
  fetch_credits: String,
}

#[derive(Debug, Clone)]
struct State {
  until_next_event: f64,
  vcsr: VectorConfigState,
  mode: DecodeMode,
  fetch_queue: VecDeque<FetchedInst>,
  held_vset: Option<(FetchedInst, OpInfo)>,
  decode_width: usize,
  rob_credits: u32,
  iq_credits: Vec<u32>,
  routing: HashMap<ExecUnit, usize>,
  next_id: InstId,
  scoreboard: SharedScoreboard,
  decoded_insts: u64,
  uops_generated: u64,
  vset_stall_cycles: u64,
  fault: Option<Fault>,
}

impl Decode {
  pub fn new(
    vlen: u32,
    decode_width: usize,
    rob_size: u32,
    iq_sizes: Vec<u32>,
    routing: HashMap<ExecUnit, usize>,
    scoreboard: SharedScoreboard,
  ) -> Self {
    Self {
      ports_in: PortsIn {
        fetch: "fetch_decode".to_string(),
        rob_credits: "rob_decode_credit".to_string(),
        iq_credits: "iq_decode_credit".to_string(),
      },
      ports_out: PortsOut {
        to_rob: "decode_rob".to_string(),
        fetch_credits: "decode_fetch_credit".to_string(),
      },
      state: State {
        until_next_event: INFINITY,
        vcsr: VectorConfigState::new(vlen),
        mode: DecodeMode::Normal,
        fetch_queue: VecDeque::new(),
        held_vset: None,
        decode_width,
        rob_credits: rob_size,
        iq_credits: iq_sizes,
        routing,
        next_id: 0,
        scoreboard,
        decoded_insts: 0,
        uops_generated: 0,
        vset_stall_cycles: 0,
        fault: None,
      },
      records: Vec::new(),
    }
  }

  pub fn snapshot(&self) -> DecodeSnapshot {
    DecodeSnapshot {
      vcsr: *self.state.vcsr.current(),
      mode: self.state.mode,
      waiting_on_vset: self.state.mode == DecodeMode::WaitingOnVset,
      decoded_insts: self.state.decoded_insts,
      uops_generated: self.state.uops_generated,
      vset_stall_cycles: self.state.vset_stall_cycles,
      fetch_queue: self.state.fetch_queue.len(),
      fault: self.state.fault.clone(),
    }
  }

  fn has_work(&self) -> bool {
    self.state.held_vset.is_some() || !self.state.fetch_queue.is_empty()
  }

  fn schedule(&mut self) {
    if self.has_work() {
      self.state.until_next_event = self.state.until_next_event.min(1.0);
    }
  }

  fn fail(&mut self, services: &Services, fault: Fault) -> SimulationError {
    log::error!("decode: {}", fault);
    model_record!(self, services, "fault", fault);
    self.state.fault = Some(fault);
    self.state.until_next_event = INFINITY;
    SimulationError::InvalidModelState
  }

  fn route(&self, unit: ExecUnit) -> Result<usize, Fault> {
    self
      .state
      .routing
      .get(&unit)
      .copied()
      .ok_or_else(|| Fault::invariant("decode", format!("no issue queue serves {:?}", unit)))
  }

  /// Micro-ops the instruction will occupy under the current configuration.
  fn uop_count(&self, info: OpInfo) -> u32 {
    let cfg = self.state.vcsr.current();
    match info.class {
      OpClass::VectorOp if !cfg.vill => cfg.lmul.group_size(),
      _ => 1,
    }
  }

  /// Assign ids, capture producers, then reserve destinations, slice by slice.
  fn number(
    &mut self,
    inst: &FetchedInst,
    info: OpInfo,
    iq: usize,
    slices: Vec<Slice>,
    vconfig: Option<VectorConfig>,
  ) -> Vec<MicroOp> {
    let shared = Arc::clone(&self.state.scoreboard);
    let mut sb = scoreboard::lock(&shared);
    let uop_count = slices.len() as u32;
    let mut uops = Vec::with_capacity(slices.len());

    for (uop_index, slice) in slices.into_iter().enumerate() {
      let id = self.state.next_id;
      self.state.next_id += 1;
      let producers = sb.producers_of(&slice.srcs);
      sb.reserve(id, &slice.dests);
      uops.push(MicroOp {
        id,
        program_index: inst.index,
        mnemonic: inst.record.mnemonic.clone(),
        class: info.class,
        unit: info.unit,
        expanded: uop_count > 1,
        uop_index: uop_index as u32,
        uop_count,
        srcs: slice.srcs,
        dests: slice.dests,
        producers,
        has_tail: slice.has_tail,
        iq,
        vconfig,
      });
    }
    self.state.uops_generated += u64::from(uop_count);
    uops
  }

  /// Apply a configuration instruction. `None` means an operand is still
  /// being produced and the instruction must be held.
  fn try_vset(&mut self, inst: &FetchedInst, info: OpInfo, iq: usize) -> Result<Option<MicroOp>, Fault> {
    let slice = expand::config_slice(inst, info.form)?;
    let request = {
      let sb = scoreboard::lock(&self.state.scoreboard);
      vset::config_request(inst, info.form, |reg| sb.is_busy(reg))?
    };
    let outcome = self.state.vcsr.apply(&request)?;
    if outcome.stall_required {
      return Ok(None);
    }
    Ok(self.number(inst, info, iq, vec![slice], Some(outcome.state)).pop())
  }

  fn decode_cycle(&mut self, services: &Services) -> Result<(Vec<MicroOp>, u32), Fault> {
    let mut batch = Vec::new();
    let mut consumed = 0u32;
    let mut budget = self.state.decode_width;

    if let Some((held, info)) = self.state.held_vset.take() {
      let iq = self.route(info.unit)?;
      match self.try_vset(&held, info, iq)? {
        Some(uop) => {
          self.state.mode = DecodeMode::Normal;
          model_record!(self, services, "vset_resolved", "{} #{}", held.record.mnemonic, held.index);
          batch.push(uop);
          budget = budget.saturating_sub(1);
        },
        None => {
          self.state.held_vset = Some((held, info));
          self.state.vset_stall_cycles += 1;
          return Ok((batch, consumed));
        },
      }
    }

    while budget > 0 {
      let inst = match self.state.fetch_queue.front() {
        Some(inst) => inst.clone(),
        None => break,
      };
      let info = guard::check(&inst)?;
      let iq = self.route(info.unit)?;
      let needed = self.uop_count(info);
      if self.state.rob_credits < needed || self.state.iq_credits[iq] < needed {
        break;
      }

      self.state.fetch_queue.pop_front();
      self.state.rob_credits -= needed;
      self.state.iq_credits[iq] -= needed;
      self.state.decoded_insts += 1;
      consumed += 1;
      budget -= 1;

      match info.class {
        OpClass::VectorConfig => match self.try_vset(&inst, info, iq)? {
          Some(uop) => batch.push(uop),
          None => {
            log::debug!("decode: {} #{} waits on a register operand", inst.record.mnemonic, inst.index);
            model_record!(self, services, "vset_stall", "{} #{}", inst.record.mnemonic, inst.index);
            self.state.held_vset = Some((inst, info));
            self.state.mode = DecodeMode::WaitingOnVset;
            break;
          },
        },
        OpClass::Scalar => {
          let slice = expand::scalar_slice(&inst, info.form)?;
          batch.extend(self.number(&inst, info, iq, vec![slice], None));
        },
        OpClass::VectorOp => {
          if self.state.vcsr.current().vill {
            return Err(Fault::IllegalVectorConfig {
              mnemonic: inst.record.mnemonic.clone(),
              index: inst.index,
            });
          }
          let slices = expand::vector_slices(&inst, info.form, &self.state.vcsr)?;
          batch.extend(self.number(&inst, info, iq, slices, None));
        },
      }
    }

    Ok((batch, consumed))
  }
}

impl DevsModel for Decode {
  fn events_ext(&mut self, msg_input: &ModelMessage, _services: &mut Services) -> Result<(), SimulationError> {
    if msg_input.port_name == self.ports_in.fetch {
      let insts: Vec<FetchedInst> = decode(&msg_input.content)?;
      self.state.fetch_queue.extend(insts);
    } else if msg_input.port_name == self.ports_in.rob_credits {
      let credits: u32 = decode(&msg_input.content)?;
      self.state.rob_credits += credits;
    } else if msg_input.port_name == self.ports_in.iq_credits {
      let credit: IqCredit = decode(&msg_input.content)?;
      match self.state.iq_credits.get_mut(credit.iq) {
        Some(slot) => *slot += credit.count,
        None => {
          log::error!("decode: credit for unknown issue queue {}", credit.iq);
          return Err(SimulationError::InvalidModelState);
        },
      }
    }
    if self.state.fault.is_none() {
      self.schedule();
    }
    Ok(())
  }

  fn events_int(&mut self, services: &mut Services) -> Result<Vec<ModelMessage>, SimulationError> {
    let (batch, consumed) = match self.decode_cycle(services) {
      Ok(result) => result,
      Err(fault) => return Err(self.fail(services, fault)),
    };

    let mut msg_output = Vec::new();
    if !batch.is_empty() {
      log::debug!(
        "decode: t={} forwarding {} uops (ids {}..={})",
        services.global_time(),
        batch.len(),
        batch[0].id,
        batch[batch.len() - 1].id
      );
      msg_output.push(ModelMessage {
        port_name: self.ports_out.to_rob.clone(),
        content: encode(&batch)?,
      });
    }
    if consumed > 0 {
      msg_output.push(ModelMessage {
        port_name: self.ports_out.fetch_credits.clone(),
        content: encode(&consumed)?,
      });
    }

    self.state.until_next_event = if self.has_work() { 1.0 } else { INFINITY };
    Ok(msg_output)
  }

  fn time_advance(&mut self, time_delta: f64) {
    self.state.until_next_event -= time_delta;
  }

  fn until_next_event(&self) -> f64 {
    self.state.until_next_event
  }
}

impl Reportable for Decode {
  fn status(&self) -> String {
    serde_json::to_string(&self.snapshot()).unwrap_or_default()
  }

  fn records(&self) -> &Vec<ModelRecord> {
    &self.records
  }
}

impl ReportableModel for Decode {}

impl SerializableModel for Decode {
  fn get_type(&self) -> &'static str {
    "Decode"
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cpu::bundles::inst::InstRecord;
  use crate::cpu::isa::{Lmul, Reg, Vtype};

  fn decoder() -> (Decode, SharedScoreboard) {
    let sb = scoreboard::shared();
    let routing = ExecUnit::ALL
      .iter()
      .map(|unit| (*unit, if unit.is_vector() { 1 } else { 0 }))
      .collect();
    (Decode::new(1024, 4, 32, vec![16, 16], routing, Arc::clone(&sb)), sb)
  }

  fn feed(decoder: &mut Decode, records: Vec<InstRecord>) {
    for (index, record) in records.into_iter().enumerate() {
      decoder.state.fetch_queue.push_back(FetchedInst {
        index: index as u64,
        record,
      });
    }
  }

  fn vsetivli(avl: i64, sew: u32, lmul: Lmul, vta: bool) -> InstRecord {
    let mut record = InstRecord::new("vsetivli");
    record.rd = Some(0);
    record.imm = Some(avl);
    record.vtype = Some(Vtype { sew, lmul, vta, vma: false }.encode());
    record
  }

  fn vadd(vd: u8, vs2: u8, vs1: u8) -> InstRecord {
    let mut record = InstRecord::new("vadd.vv");
    record.vd = Some(vd);
    record.vs2 = Some(vs2);
    record.vs1 = Some(vs1);
    record
  }

  #[test]
  fn test_same_cycle_vset_drives_expansion() {
    let (mut decoder, _) = decoder();
    feed(&mut decoder, vec![vsetivli(512, 8, Lmul::M4, false), vadd(4, 8, 12)]);
    let services = Services::default();
    let (batch, consumed) = decoder.decode_cycle(&services).unwrap();
    assert_eq!(consumed, 2);
    assert_eq!(batch.len(), 5);
    assert_eq!(batch[0].vconfig.map(|c| c.lmul), Some(Lmul::M4));
    assert!(batch[1..].iter().all(|u| u.expanded && u.uop_count == 4 && u.parent() == Some(1)));
    let ids: Vec<InstId> = batch.iter().map(|u| u.id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);
  }

  #[test]
  fn test_busy_avl_register_holds_decode() {
    let (mut decoder, sb) = decoder();
    scoreboard::lock(&sb).reserve(100, &[Reg::X(5)]);

    let mut vsetvli = InstRecord::new("vsetvli");
    vsetvli.rd = Some(1);
    vsetvli.rs1 = Some(5);
    vsetvli.vtype = Some(Vtype { sew: 8, lmul: Lmul::M2, vta: true, vma: false }.encode());
    vsetvli.avl = Some(64);
    feed(&mut decoder, vec![vsetvli, vadd(2, 4, 6)]);

    let services = Services::default();
    let (batch, _) = decoder.decode_cycle(&services).unwrap();
    assert!(batch.is_empty());
    assert!(decoder.snapshot().waiting_on_vset);
    assert_eq!(decoder.snapshot().fetch_queue, 1);

    let (batch, _) = decoder.decode_cycle(&services).unwrap();
    assert!(batch.is_empty());
    assert_eq!(decoder.snapshot().vset_stall_cycles, 1);

    scoreboard::lock(&sb).complete(100, &[Reg::X(5)]);
    let (batch, _) = decoder.decode_cycle(&services).unwrap();
    assert_eq!(batch.len(), 3);
    let snap = decoder.snapshot();
    assert_eq!(snap.mode, DecodeMode::Normal);
    assert_eq!((snap.vcsr.vl, snap.vcsr.lmul), (64, Lmul::M2));
  }

  #[test]
  fn test_iq_credits_bound_expansion() {
    let (mut decoder, _) = decoder();
    decoder.state.iq_credits[1] = 3;
    feed(&mut decoder, vec![vsetivli(512, 8, Lmul::M4, false), vadd(4, 8, 12)]);
    let services = Services::default();
    let (batch, consumed) = decoder.decode_cycle(&services).unwrap();
    assert_eq!((batch.len(), consumed), (1, 1));
    assert_eq!(decoder.snapshot().fetch_queue, 1);
  }

  #[test]
  fn test_producers_captured_before_reservation() {
    let (mut decoder, _) = decoder();
    feed(&mut decoder, vec![vadd(1, 2, 3), vadd(4, 1, 1)]);
    let services = Services::default();
    let (batch, _) = decoder.decode_cycle(&services).unwrap();
    assert!(batch[0].producers.is_empty());
    assert_eq!(batch[1].producers, vec![0]);
  }

  #[test]
  fn test_vector_op_under_vill_is_fatal() {
    let (mut decoder, _) = decoder();
    let mut bad = InstRecord::new("vsetivli");
    bad.imm = Some(4);
    bad.vtype = Some(0b100);
    feed(&mut decoder, vec![bad, vadd(1, 2, 3)]);
    let services = Services::default();
    let err = decoder.decode_cycle(&services).unwrap_err();
    assert!(matches!(err, Fault::IllegalVectorConfig { index: 1, .. }));
  }
}
