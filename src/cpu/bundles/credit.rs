use serde::{Deserialize, Serialize};

/// Issue-queue slots released back to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IqCredit {
  pub iq: usize,
  pub count: u32,
}
