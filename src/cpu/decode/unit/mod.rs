pub mod expand;
pub mod guard;
pub mod vcsr;
pub mod vset;
