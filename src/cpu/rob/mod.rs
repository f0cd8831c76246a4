pub mod events;
pub mod unit;

pub use events::{Rob, RobSnapshot};
