use sim::simulator::{Message, Simulation};

/// Inject a message into `target_model` at the current simulation time.
///
/// `source_id` and `source_port` default to "host" and "default".
pub fn inject_message(
  simulation: &mut Simulation,
  target_model: &str,
  source_id: Option<&str>,
  source_port: Option<&str>,
  target_port: &str,
  content: &str,
) {
  let msg = Message::new(
    source_id.unwrap_or("host").to_string(),
    source_port.unwrap_or("default").to_string(),
    target_model.to_string(),
    target_port.to_string(),
    simulation.get_global_time(),
    content.to_string(),
  );
  simulation.inject_input(msg);
}
