pub mod queue;
pub mod scoreboard;
