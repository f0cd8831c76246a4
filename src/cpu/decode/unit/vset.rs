use super::vcsr::{AvlSource, ConfigRequest, Pending};
use crate::cpu::bundles::inst::FetchedInst;
use crate::cpu::isa::{Form, Reg};
use crate::error::Fault;

/// Build the configuration request of a vset* instruction.
///
/// `busy` reports whether a register still has an in-flight writer; such an
/// operand is not resolvable at decode and comes back as `Pending::Waiting`.
pub fn config_request<F>(inst: &FetchedInst, form: Form, busy: F) -> Result<ConfigRequest, Fault>
where
  F: Fn(Reg) -> bool,
{
  let record = &inst.record;
  let missing = |what: &str| Fault::malformed(&record.mnemonic, inst.index, format!("missing {}", what));

  match form {
    Form::Vsetivli => {
      let vtype = record.vtype.ok_or_else(|| missing("vtype"))?;
      let imm = record.imm.ok_or_else(|| missing("immediate avl"))?;
      let avl = u64::try_from(imm)
        .map_err(|_| Fault::malformed(&record.mnemonic, inst.index, format!("negative avl {}", imm)))?;
      Ok(ConfigRequest {
        vtype: Pending::Ready(vtype),
        avl: AvlSource::Immediate(avl),
      })
    },
    Form::Vsetvli => {
      let vtype = record.vtype.ok_or_else(|| missing("vtype"))?;
      Ok(ConfigRequest {
        vtype: Pending::Ready(vtype),
        avl: avl_from_rs1(inst, &busy)?,
      })
    },
    Form::Vsetvl => {
      let rs2 = Reg::X(record.rs2.ok_or_else(|| missing("rs2"))?);
      // x0 reads as zero: e8, m1, tail and mask undisturbed.
      let vtype = if rs2.is_zero() {
        Pending::Ready(0)
      } else if busy(rs2) {
        Pending::Waiting(rs2)
      } else {
        Pending::Ready(record.vtype.ok_or_else(|| missing("runtime vtype value"))?)
      };
      Ok(ConfigRequest {
        vtype,
        avl: avl_from_rs1(inst, &busy)?,
      })
    },
    _ => Err(Fault::invariant(
      "decode",
      format!("'{}' is not a configuration instruction", record.mnemonic),
    )),
  }
}

fn avl_from_rs1<F>(inst: &FetchedInst, busy: &F) -> Result<AvlSource, Fault>
where
  F: Fn(Reg) -> bool,
{
  let record = &inst.record;
  let rs1 = record.rs1.unwrap_or(0);
  if rs1 == 0 {
    return Ok(if record.rd.unwrap_or(0) != 0 {
      AvlSource::VlMax
    } else {
      AvlSource::KeepVl
    });
  }
  let reg = Reg::X(rs1);
  if busy(reg) {
    return Ok(AvlSource::Register(Pending::Waiting(reg)));
  }
  let avl = record
    .avl
    .ok_or_else(|| Fault::malformed(&record.mnemonic, inst.index, "missing runtime avl value"))?;
  Ok(AvlSource::Register(Pending::Ready(avl)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cpu::bundles::inst::InstRecord;

  fn vset(mnemonic: &str, rd: u8, rs1: Option<u8>) -> FetchedInst {
    let mut record = InstRecord::new(mnemonic);
    record.rd = Some(rd);
    record.rs1 = rs1;
    record.vtype = Some(0x2);
    record.avl = Some(1024);
    FetchedInst { index: 0, record }
  }

  #[test]
  fn test_vsetivli_uses_immediate() {
    let mut inst = vset("vsetivli", 1, None);
    inst.record.imm = Some(16);
    let req = config_request(&inst, Form::Vsetivli, |_| true).unwrap();
    assert_eq!(req.avl, AvlSource::Immediate(16));
    assert_eq!(req.vtype, Pending::Ready(0x2));
  }

  #[test]
  fn test_vsetvli_x0_forms() {
    let req = config_request(&vset("vsetvli", 1, Some(0)), Form::Vsetvli, |_| true).unwrap();
    assert_eq!(req.avl, AvlSource::VlMax);
    let req = config_request(&vset("vsetvli", 0, None), Form::Vsetvli, |_| true).unwrap();
    assert_eq!(req.avl, AvlSource::KeepVl);
  }

  #[test]
  fn test_busy_register_is_pending() {
    let inst = vset("vsetvli", 1, Some(5));
    let req = config_request(&inst, Form::Vsetvli, |reg| reg == Reg::X(5)).unwrap();
    assert_eq!(req.avl, AvlSource::Register(Pending::Waiting(Reg::X(5))));
    let req = config_request(&inst, Form::Vsetvli, |_| false).unwrap();
    assert_eq!(req.avl, AvlSource::Register(Pending::Ready(1024)));
  }

  #[test]
  fn test_vsetvl_vtype_register() {
    let mut inst = vset("vsetvl", 1, Some(5));
    inst.record.rs2 = Some(6);
    let req = config_request(&inst, Form::Vsetvl, |reg| reg == Reg::X(6)).unwrap();
    assert_eq!(req.vtype, Pending::Waiting(Reg::X(6)));
    assert_eq!(req.avl, AvlSource::Register(Pending::Ready(1024)));
  }

  #[test]
  fn test_vsetvl_x0_vtype_reads_zero() {
    let mut inst = vset("vsetvl", 1, Some(5));
    inst.record.rs2 = Some(0);
    inst.record.vtype = None;
    let req = config_request(&inst, Form::Vsetvl, |_| false).unwrap();
    assert_eq!(req.vtype, Pending::Ready(0));
    assert_eq!(req.avl, AvlSource::Register(Pending::Ready(1024)));
  }

  #[test]
  fn test_missing_fields_are_malformed() {
    let mut inst = vset("vsetivli", 1, None);
    inst.record.imm = Some(-1);
    assert!(matches!(
      config_request(&inst, Form::Vsetivli, |_| false),
      Err(Fault::MalformedInstruction { .. })
    ));
    let mut inst = vset("vsetvli", 1, Some(5));
    inst.record.avl = None;
    assert!(config_request(&inst, Form::Vsetvli, |_| false).is_err());
  }
}
