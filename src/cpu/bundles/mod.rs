pub mod credit;
pub mod inst;
pub mod uop;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sim::utils::errors::SimulationError;

/// Message payload encoding shared by every pipeline model.
pub fn encode<T: Serialize>(value: &T) -> Result<String, SimulationError> {
  serde_json::to_string(value).map_err(|e| {
    log::error!("message encoding failed: {}", e);
    SimulationError::InvalidModelState
  })
}

pub fn decode<T: DeserializeOwned>(content: &str) -> Result<T, SimulationError> {
  serde_json::from_str(content).map_err(|e| {
    log::error!("malformed message '{}': {}", content, e);
    SimulationError::InvalidModelState
  })
}
