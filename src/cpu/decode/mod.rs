pub mod events;
pub mod unit;

pub use events::{Decode, DecodeMode, DecodeSnapshot};
