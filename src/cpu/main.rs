use sim::models::Model;
use sim::simulator::{Connector, Simulation};

use super::decode::Decode;
use super::execute::ExecutePipe;
use super::fetch::Fetch;
use super::issue::unit::scoreboard;
use super::issue::IssueQueueModel;
use super::rob::events::dispatch_port;
use super::rob::Rob;
use crate::simulator::config::config::AppConfig;

/// Resource-tree ids of one core's models.
pub fn core_path(core: usize) -> String {
  format!("cpu.core{}", core)
}

pub fn fetch_path(core: usize) -> String {
  format!("{}.fetch", core_path(core))
}

pub fn decode_path(core: usize) -> String {
  format!("{}.decode", core_path(core))
}

pub fn rob_path(core: usize) -> String {
  format!("{}.rob", core_path(core))
}

pub fn issue_queue_path(core: usize, name: &str) -> String {
  format!("{}.execute.{}", core_path(core), name)
}

pub fn pipe_path(core: usize, iq: usize) -> String {
  format!("{}.execute.pipe{}", core_path(core), iq)
}

fn connect(
  connectors: &mut Vec<Connector>,
  source_id: &str,
  target_id: &str,
  source_port: &str,
  target_port: &str,
) {
  connectors.push(Connector::new(
    format!("{}:{}->{}:{}", source_id, source_port, target_id, target_port),
    source_id.to_string(),   // source_id: sending model
    target_id.to_string(),   // target_id: receiving model
    source_port.to_string(), // source_port: output port of the sender
    target_port.to_string(), // target_port: input port of the receiver
  ));
}

/// Models and connectors of one core.
///
/// fetch -> decode -> rob -> iq<N> -> pipe<N> -> rob, with credits flowing
/// back to fetch (decode queue) and decode (rob and issue queue slots).
pub fn create_core(core: usize, config: &AppConfig) -> (Vec<Model>, Vec<Connector>) {
  let scoreboard = scoreboard::shared();
  let core_cfg = &config.core;
  let iq_sizes = config.issue_queues.iter().map(|iq| iq.size as u32).collect();

  let fetch = fetch_path(core);
  let decode = decode_path(core);
  let rob = rob_path(core);

  let mut models = vec![
    Model::new(
      fetch.clone(),
      Box::new(Fetch::new(core_cfg.fetch_width, core_cfg.decode_queue_size)),
    ),
    Model::new(
      decode.clone(),
      Box::new(Decode::new(
        core_cfg.vlen,
        core_cfg.decode_width,
        core_cfg.rob_size as u32,
        iq_sizes,
        config.routing(),
        scoreboard.clone(),
      )),
    ),
    Model::new(
      rob.clone(),
      Box::new(Rob::new(
        core_cfg.rob_size,
        core_cfg.retire_width,
        config.issue_queues.len(),
        scoreboard.clone(),
      )),
    ),
  ];

  let mut connectors = Vec::new();
  connect(&mut connectors, &fetch, &decode, "fetch_decode", "fetch_decode");
  connect(&mut connectors, &decode, &fetch, "decode_fetch_credit", "decode_fetch_credit");
  connect(&mut connectors, &decode, &rob, "decode_rob", "decode_rob");
  connect(&mut connectors, &rob, &decode, "rob_decode_credit", "rob_decode_credit");

  for (index, iq_cfg) in config.issue_queues.iter().enumerate() {
    let iq = issue_queue_path(core, &iq_cfg.name);
    let pipe = pipe_path(core, index);
    models.push(Model::new(
      iq.clone(),
      Box::new(IssueQueueModel::new(
        index,
        &iq_cfg.name,
        iq_cfg.size,
        iq_cfg.issue_width,
        scoreboard.clone(),
      )),
    ));
    models.push(Model::new(pipe.clone(), Box::new(ExecutePipe::new(config.latency.table()))));

    connect(&mut connectors, &rob, &iq, &dispatch_port(index), "rob_iq");
    connect(&mut connectors, &iq, &pipe, "iq_pipe", "iq_pipe");
    connect(&mut connectors, &iq, &decode, "iq_decode_credit", "iq_decode_credit");
    connect(&mut connectors, &pipe, &rob, "pipe_rob", "pipe_rob");
  }

  (models, connectors)
}

pub fn create_simulation(config: &AppConfig) -> Simulation {
  let mut models = Vec::new();
  let mut connectors = Vec::new();
  for core in 0..config.simulation.num_cores {
    let (core_models, core_connectors) = create_core(core, config);
    models.extend(core_models);
    connectors.extend(core_connectors);
  }
  Simulation::post(models, connectors)
}
