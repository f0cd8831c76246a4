use sim::models::model_trait::DevsModel;
use sim::simulator::Simulation;
use std::f64::INFINITY;
use std::fs::File;
use std::io::{BufWriter, Write};

use crate::error::CoreError;

/// Time until the earliest scheduled internal event, `INFINITY` when idle.
pub fn next_event_in(simulation: &mut Simulation) -> f64 {
  simulation
    .models()
    .iter()
    .fold(INFINITY, |min, model| f64::min(min, model.until_next_event()))
}

/// One kernel step. Pending messages are logged and written to the trace
/// file (one JSON object per line) before they are delivered.
pub fn model_step(simulation: &mut Simulation, trace_writer: &mut Option<BufWriter<File>>) -> Result<(), CoreError> {
  let messages = simulation.get_messages().clone();

  if log::log_enabled!(log::Level::Trace) {
    for msg in messages.iter() {
      log::trace!(
        "[MSG] t={:.1} {}:{} -> {}:{} | {}",
        msg.time(),
        msg.source_id(),
        msg.source_port(),
        msg.target_id(),
        msg.target_port(),
        msg.content()
      );
    }
  }

  if let Some(writer) = trace_writer {
    for msg in messages.iter() {
      let trace_entry = serde_json::json!({
        "time": msg.time(),
        "source": msg.source_id(),
        "source_port": msg.source_port(),
        "target": msg.target_id(),
        "target_port": msg.target_port(),
        "content": msg.content()
      });
      writeln!(writer, "{}", trace_entry)?;
    }
    writer.flush()?;
  }

  simulation.step()?;
  Ok(())
}
