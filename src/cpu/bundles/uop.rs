use serde::{Deserialize, Serialize};

use crate::cpu::decode::unit::vcsr::VectorConfig;
use crate::cpu::isa::{ExecUnit, OpClass, Reg};

/// Sequence number assigned by decode; doubles as the ROB order.
pub type InstId = u64;

/// Unit of work that flows decode -> rob -> issue queue -> execute.
///
/// A vector instruction expanded under LMUL > 1 produces several of these that
/// share `program_index`; `uop_index`/`uop_count` locate each slice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicroOp {
  pub id: InstId,
  pub program_index: u64,
  pub mnemonic: String,
  pub class: OpClass,
  pub unit: ExecUnit,
  pub expanded: bool,
  pub uop_index: u32,
  pub uop_count: u32,
  pub srcs: Vec<Reg>,
  pub dests: Vec<Reg>,
  /// In-flight writers of `srcs` captured at decode.
  pub producers: Vec<InstId>,
  pub has_tail: bool,
  pub iq: usize,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub vconfig: Option<VectorConfig>,
}

impl MicroOp {
  /// Program index of the macro-instruction this op was expanded from.
  pub fn parent(&self) -> Option<u64> {
    if self.expanded {
      Some(self.program_index)
    } else {
      None
    }
  }
}
