use crate::cpu::bundles::inst::FetchedInst;
use crate::cpu::isa::{self, OpInfo};
use crate::error::Fault;

/// Resolve the operation of a fetched instruction, failing the run for any
/// mnemonic the core does not model. Nothing is approximated.
pub fn check(inst: &FetchedInst) -> Result<OpInfo, Fault> {
  isa::lookup(&inst.record.mnemonic).ok_or_else(|| {
    log::error!(
      "decode: '{}' at program index {} is not implemented",
      inst.record.mnemonic,
      inst.index
    );
    Fault::UnsupportedOperation {
      mnemonic: inst.record.mnemonic.clone(),
      index: inst.index,
    }
  })
}
