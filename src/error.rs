use serde::{Deserialize, Serialize};
use sim::utils::errors::SimulationError;
use thiserror::Error;

/// Fatal condition raised inside a pipeline model.
///
/// The failing model keeps the fault in its state (it shows up in the status
/// snapshot) and hands `InvalidModelState` to the kernel; the driver then
/// turns it back into a [`CoreError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fault {
  #[error("unsupported operation '{mnemonic}' at program index {index}")]
  UnsupportedOperation { mnemonic: String, index: u64 },

  #[error("'{mnemonic}' at program index {index} decoded while vtype is illegal (vill)")]
  IllegalVectorConfig { mnemonic: String, index: u64 },

  #[error("malformed '{mnemonic}' at program index {index}: {detail}")]
  MalformedInstruction { mnemonic: String, index: u64, detail: String },

  #[error("{unit}: invariant violated: {detail}")]
  InvariantViolation { unit: String, detail: String },
}

impl Fault {
  pub fn invariant(unit: &str, detail: impl Into<String>) -> Self {
    Fault::InvariantViolation {
      unit: unit.to_string(),
      detail: detail.into(),
    }
  }

  pub fn malformed(mnemonic: &str, index: u64, detail: impl Into<String>) -> Self {
    Fault::MalformedInstruction {
      mnemonic: mnemonic.to_string(),
      index,
      detail: detail.into(),
    }
  }
}

#[derive(Debug, Error)]
pub enum CoreError {
  #[error(transparent)]
  Fault(#[from] Fault),

  #[error("simulation halted by an earlier fatal error: {0}")]
  Halted(Fault),

  #[error("no model registered at '{0}'")]
  UnknownPath(String),

  #[error("simulation kernel error: {0}")]
  Kernel(#[from] SimulationError),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("configuration error: {0}")]
  Config(std::io::Error),

  #[error(transparent)]
  Io(#[from] std::io::Error),
}

impl CoreError {
  /// The pipeline fault behind this error, if it came from a model.
  pub fn fault(&self) -> Option<&Fault> {
    match self {
      CoreError::Fault(fault) | CoreError::Halted(fault) => Some(fault),
      _ => None,
    }
  }
}
