pub mod bundles;
pub mod decode;
pub mod execute;
pub mod fetch;
pub mod isa;
pub mod issue;
pub mod main;
pub mod rob;

pub use main::{create_core, create_simulation};
