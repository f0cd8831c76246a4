use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::cpu::isa::ExecUnit;

/// Simulation run settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationSection {
  pub num_cores: usize,
  pub max_cycles: u64,
  pub quiet: bool,
  pub step_mode: bool,
  /// JSON-lines message trace, empty = disabled.
  pub trace_file: String,
}

impl Default for SimulationSection {
  fn default() -> Self {
    Self {
      num_cores: 1,
      max_cycles: 100_000,
      quiet: false,
      step_mode: false,
      trace_file: String::new(),
    }
  }
}

/// Per-core pipeline geometry.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CoreSection {
  /// Vector register length in bits.
  pub vlen: u32,
  pub fetch_width: u32,
  pub decode_width: usize,
  pub decode_queue_size: u32,
  pub rob_size: usize,
  pub retire_width: usize,
}

impl Default for CoreSection {
  fn default() -> Self {
    Self {
      vlen: 1024,
      fetch_width: 4,
      decode_width: 4,
      decode_queue_size: 8,
      rob_size: 32,
      retire_width: 4,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct IssueQueueSection {
  pub name: String,
  pub size: usize,
  pub issue_width: usize,
  pub units: Vec<ExecUnit>,
}

/// Execution latency in cycles per unit class.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LatencySection {
  pub alu: u32,
  pub mul: u32,
  pub div: u32,
  pub vset: u32,
  pub valu: u32,
  pub vmul: u32,
  pub vdiv: u32,
}

impl Default for LatencySection {
  fn default() -> Self {
    Self {
      alu: 1,
      mul: 3,
      div: 20,
      vset: 1,
      valu: 1,
      vmul: 3,
      vdiv: 20,
    }
  }
}

impl LatencySection {
  pub fn get(&self, unit: ExecUnit) -> u32 {
    match unit {
      ExecUnit::Alu => self.alu,
      ExecUnit::Mul => self.mul,
      ExecUnit::Div => self.div,
      ExecUnit::Vset => self.vset,
      ExecUnit::Valu => self.valu,
      ExecUnit::Vmul => self.vmul,
      ExecUnit::Vdiv => self.vdiv,
    }
  }

  pub fn table(&self) -> HashMap<ExecUnit, u32> {
    ExecUnit::ALL.iter().map(|unit| (*unit, self.get(*unit))).collect()
  }
}

fn default_issue_queues() -> Vec<IssueQueueSection> {
  vec![
    IssueQueueSection {
      name: "iq0".to_string(),
      size: 16,
      issue_width: 2,
      units: vec![ExecUnit::Alu, ExecUnit::Mul, ExecUnit::Div],
    },
    IssueQueueSection {
      name: "iq1".to_string(),
      size: 16,
      issue_width: 1,
      units: vec![ExecUnit::Vset, ExecUnit::Valu, ExecUnit::Vmul, ExecUnit::Vdiv],
    },
  ]
}

/// Unified application configuration; mirrors `default.toml`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
  #[serde(default)]
  pub simulation: SimulationSection,
  #[serde(default)]
  pub core: CoreSection,
  #[serde(default = "default_issue_queues")]
  pub issue_queues: Vec<IssueQueueSection>,
  #[serde(default)]
  pub latency: LatencySection,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      simulation: SimulationSection::default(),
      core: CoreSection::default(),
      issue_queues: default_issue_queues(),
      latency: LatencySection::default(),
    }
  }
}

impl AppConfig {
  /// Execution unit -> issue queue index.
  pub fn routing(&self) -> HashMap<ExecUnit, usize> {
    let mut routing = HashMap::new();
    for (index, iq) in self.issue_queues.iter().enumerate() {
      for unit in &iq.units {
        routing.insert(*unit, index);
      }
    }
    routing
  }
}

/// Values taken from the command line; `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
  pub quiet: bool,
  pub step: bool,
  pub trace_file: Option<String>,
  pub vlen: Option<u32>,
  pub rob_size: Option<usize>,
  pub max_cycles: Option<u64>,
}

fn default_config_path() -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("src")
    .join("simulator")
    .join("config")
    .join("default.toml")
}

fn read_table(path: &Path) -> io::Result<toml::Value> {
  let content = fs::read_to_string(path)
    .map_err(|e| io::Error::new(io::ErrorKind::NotFound, format!("cannot read config file {:?}: {}", path, e)))?;
  toml::from_str::<toml::Value>(&content)
    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("failed to parse TOML in {:?}: {}", path, e)))
}

fn from_table(value: toml::Value) -> io::Result<AppConfig> {
  value
    .try_into()
    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("invalid configuration: {}", e)))
}

/// Load the built-in `default.toml`.
pub fn load_default_config() -> io::Result<AppConfig> {
  load_config_file(&default_config_path())
}

pub fn load_config_file(path: &Path) -> io::Result<AppConfig> {
  from_table(read_table(path)?)
}

/// Merge `overlay` into `base`: tables merge key by key, anything else
/// (scalars, arrays) is replaced.
pub fn merge_config(base: &mut toml::Value, overlay: toml::Value) {
  match (base, overlay) {
    (toml::Value::Table(base), toml::Value::Table(overlay)) => {
      for (key, value) in overlay {
        match base.get_mut(&key) {
          Some(slot) => merge_config(slot, value),
          None => {
            base.insert(key, value);
          },
        }
      }
    },
    (slot, value) => *slot = value,
  }
}

pub fn apply_cli_overrides(config: &mut AppConfig, cli: &CliOverrides) {
  if cli.quiet {
    config.simulation.quiet = true;
  }
  if cli.step {
    config.simulation.step_mode = true;
  }
  if let Some(file) = &cli.trace_file {
    config.simulation.trace_file = file.clone();
  }
  if let Some(vlen) = cli.vlen {
    config.core.vlen = vlen;
  }
  if let Some(rob_size) = cli.rob_size {
    config.core.rob_size = rob_size;
  }
  if let Some(max_cycles) = cli.max_cycles {
    config.simulation.max_cycles = max_cycles;
  }
}

fn invalid(msg: String) -> io::Error {
  io::Error::new(io::ErrorKind::InvalidData, msg)
}

/// Architectural bounds on VLEN.
pub const MIN_VLEN: u32 = 64;
pub const MAX_VLEN: u32 = 65536;

pub fn validate_config(config: &AppConfig) -> io::Result<()> {
  let core = &config.core;
  if !(MIN_VLEN..=MAX_VLEN).contains(&core.vlen) || !core.vlen.is_power_of_two() {
    return Err(invalid(format!(
      "vlen must be a power of two in {}..={}, got {}",
      MIN_VLEN, MAX_VLEN, core.vlen
    )));
  }
  if core.fetch_width == 0 || core.decode_width == 0 || core.retire_width == 0 {
    return Err(invalid("fetch, decode and retire widths must be at least 1".to_string()));
  }
  if core.decode_queue_size == 0 {
    return Err(invalid("decode_queue_size must be at least 1".to_string()));
  }
  // An LMUL=8 instruction needs eight entries at once.
  if core.rob_size < 8 {
    return Err(invalid(format!("rob_size must be at least 8, got {}", core.rob_size)));
  }
  if config.simulation.num_cores == 0 {
    return Err(invalid("num_cores must be at least 1".to_string()));
  }

  let mut names = HashSet::new();
  let mut routed = HashSet::new();
  for iq in &config.issue_queues {
    if !names.insert(iq.name.as_str()) {
      return Err(invalid(format!("duplicate issue queue name '{}'", iq.name)));
    }
    if iq.issue_width == 0 || iq.size == 0 {
      return Err(invalid(format!("issue queue '{}' needs a non-zero size and width", iq.name)));
    }
    for unit in &iq.units {
      if !routed.insert(*unit) {
        return Err(invalid(format!("unit {:?} is routed to more than one issue queue", unit)));
      }
      if unit.is_vector() && iq.size < 8 {
        return Err(invalid(format!(
          "issue queue '{}' serves vector units and needs at least 8 entries",
          iq.name
        )));
      }
    }
  }
  for unit in ExecUnit::ALL {
    if !routed.contains(&unit) {
      return Err(invalid(format!("no issue queue serves unit {:?}", unit)));
    }
    if config.latency.get(unit) == 0 {
      return Err(invalid(format!("latency of {:?} must be at least 1", unit)));
    }
  }

  Ok(())
}

/// Resolve a relative path against `root`.
fn resolve_single_path(path_str: &str, root: &Path) -> String {
  let path = Path::new(path_str);
  if path_str.is_empty() || path.is_absolute() {
    return path_str.to_string();
  }
  root.join(path).to_string_lossy().to_string()
}

/// Load and merge configuration.
///
/// 1. load `default.toml`
/// 2. merge the custom file over it, if given
/// 3. apply CLI overrides
/// 4. resolve relative paths against `root`
/// 5. validate
pub fn load_and_merge_configs(custom_config_path: Option<&str>, root: &Path, cli: &CliOverrides) -> io::Result<AppConfig> {
  let mut table = read_table(&default_config_path())?;

  if let Some(custom_path) = custom_config_path {
    let custom = PathBuf::from(resolve_single_path(custom_path, root));
    merge_config(&mut table, read_table(&custom)?);
  }

  let mut config = from_table(table)?;
  apply_cli_overrides(&mut config, cli);
  config.simulation.trace_file = resolve_single_path(&config.simulation.trace_file, root);
  validate_config(&config)?;
  Ok(config)
}
