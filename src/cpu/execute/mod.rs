pub mod events;

pub use events::ExecutePipe;
