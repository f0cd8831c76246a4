pub mod cpu;
pub mod error;
pub mod simulator;

pub use cpu::bundles::inst::{load_trace, parse_trace, InstRecord};
pub use cpu::decode::events::DecodeSnapshot;
pub use cpu::decode::unit::vcsr::{VectorConfig, VectorConfigState};
pub use cpu::issue::events::IssueQueueSnapshot;
pub use cpu::isa::Lmul;
pub use cpu::rob::events::RobSnapshot;
pub use cpu::rob::unit::reorder_buffer::RobEntry;
pub use error::{CoreError, Fault};
pub use simulator::config::config::AppConfig;
pub use simulator::sim::mode::RunStatus;
pub use simulator::Simulator;
