pub mod events;
pub mod unit;

pub use events::{IssueQueueModel, IssueQueueSnapshot};
