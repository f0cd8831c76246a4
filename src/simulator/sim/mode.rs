use serde::{Deserialize, Serialize};

/// Why a bounded run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
  /// The requested number of cycles elapsed.
  CycleLimit,
  /// No model has a pending event; the program has drained.
  Idle,
}
