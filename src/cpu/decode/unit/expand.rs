use super::vcsr::VectorConfigState;
use crate::cpu::bundles::inst::FetchedInst;
use crate::cpu::isa::{Form, Reg};
use crate::error::Fault;

const NUM_REGS: u8 = 32;

/// Register footprint of one micro-op before decode numbers it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slice {
  pub srcs: Vec<Reg>,
  pub dests: Vec<Reg>,
  pub has_tail: bool,
}

fn field(inst: &FetchedInst, value: Option<u8>, name: &str) -> Result<u8, Fault> {
  let value = value.ok_or_else(|| Fault::malformed(&inst.record.mnemonic, inst.index, format!("missing {}", name)))?;
  if value >= NUM_REGS {
    return Err(Fault::malformed(
      &inst.record.mnemonic,
      inst.index,
      format!("{} = {} is out of range", name, value),
    ));
  }
  Ok(value)
}

fn xdest(rd: u8) -> Vec<Reg> {
  if rd == 0 {
    Vec::new()
  } else {
    vec![Reg::X(rd)]
  }
}

pub fn scalar_slice(inst: &FetchedInst, form: Form) -> Result<Slice, Fault> {
  let record = &inst.record;
  let (srcs, dests) = match form {
    Form::RegReg => (
      vec![Reg::X(field(inst, record.rs1, "rs1")?), Reg::X(field(inst, record.rs2, "rs2")?)],
      xdest(field(inst, record.rd, "rd")?),
    ),
    Form::RegImm => (vec![Reg::X(field(inst, record.rs1, "rs1")?)], xdest(field(inst, record.rd, "rd")?)),
    Form::Upper => (Vec::new(), xdest(field(inst, record.rd, "rd")?)),
    Form::Nop => (Vec::new(), Vec::new()),
    _ => return Err(Fault::invariant("decode", format!("'{}' is not a scalar form", record.mnemonic))),
  };
  Ok(Slice {
    srcs,
    dests,
    has_tail: false,
  })
}

/// Footprint of a vset* instruction: its scalar register operands.
pub fn config_slice(inst: &FetchedInst, form: Form) -> Result<Slice, Fault> {
  let record = &inst.record;
  let rd = field(inst, Some(record.rd.unwrap_or(0)), "rd")?;
  let rs1 = field(inst, Some(record.rs1.unwrap_or(0)), "rs1")?;
  let mut srcs = Vec::new();
  match form {
    Form::Vsetivli => {},
    Form::Vsetvli => srcs.push(Reg::X(rs1)),
    Form::Vsetvl => {
      srcs.push(Reg::X(rs1));
      srcs.push(Reg::X(field(inst, record.rs2, "rs2")?));
    },
    _ => return Err(Fault::invariant("decode", format!("'{}' is not a vset form", record.mnemonic))),
  }
  srcs.retain(|reg| !reg.is_zero());
  Ok(Slice {
    srcs,
    dests: xdest(rd),
    has_tail: false,
  })
}

/// Base register of a vector operand group; must be aligned to the group size.
fn vgroup(inst: &FetchedInst, value: Option<u8>, name: &str, group: u32) -> Result<u8, Fault> {
  let base = field(inst, value, name)?;
  if u32::from(base) % group != 0 || u32::from(base) + group > u32::from(NUM_REGS) {
    return Err(Fault::malformed(
      &inst.record.mnemonic,
      inst.index,
      format!("{} = v{} is not a valid group for lmul {}", name, base, group),
    ));
  }
  Ok(base)
}

/// Split a vector instruction into one slice per register of the LMUL group.
///
/// Slice `i` covers elements `[i * E, min((i + 1) * E, vlmax))` where `E` is the
/// element count of one register; it has a tail when `vl` stops short of that
/// end and the tail policy is undisturbed. Undisturbed tail or inactive
/// elements keep the old destination value, so the destination is read too.
pub fn vector_slices(inst: &FetchedInst, form: Form, vcsr: &VectorConfigState) -> Result<Vec<Slice>, Fault> {
  let record = &inst.record;
  let cfg = vcsr.current();
  let group = cfg.lmul.group_size();
  let per_reg = vcsr.elements_per_register();
  let masked = !record.vm;

  let vd = vgroup(inst, record.vd, "vd", group)?;
  let vs2 = match form {
    Form::VecVec | Form::VecScalar | Form::VecImm => Some(vgroup(inst, record.vs2, "vs2", group)?),
    _ => None,
  };
  let vs1 = match form {
    Form::VecVec | Form::MoveVec => Some(vgroup(inst, record.vs1, "vs1", group)?),
    Form::VecScalar | Form::VecImm | Form::MoveScalar | Form::MoveImm => None,
    _ => return Err(Fault::invariant("decode", format!("'{}' is not a vector form", record.mnemonic))),
  };
  let rs1 = match form {
    Form::VecScalar | Form::MoveScalar => Some(field(inst, record.rs1, "rs1")?),
    _ => None,
  };

  let slices = (0..group)
    .map(|i| {
      let offset = i as u8;
      let end = ((i + 1) * per_reg).min(cfg.vlmax);
      let has_tail = !cfg.vta && cfg.vl < end;

      let mut srcs = Vec::new();
      if let Some(vs2) = vs2 {
        srcs.push(Reg::V(vs2 + offset));
      }
      if let Some(vs1) = vs1 {
        srcs.push(Reg::V(vs1 + offset));
      }
      if let Some(rs1) = rs1 {
        srcs.push(Reg::X(rs1));
      }
      if masked {
        srcs.push(Reg::V(0));
      }
      if has_tail || (masked && !cfg.vma) {
        srcs.push(Reg::V(vd + offset));
      }

      Slice {
        srcs,
        dests: vec![Reg::V(vd + offset)],
        has_tail,
      }
    })
    .collect();
  Ok(slices)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cpu::bundles::inst::InstRecord;
  use crate::cpu::decode::unit::vcsr::{AvlSource, ConfigRequest, Pending};
  use crate::cpu::isa::{Lmul, Vtype};

  fn configured(vlen: u32, sew: u32, lmul: Lmul, vta: bool, avl: u64) -> VectorConfigState {
    let mut state = VectorConfigState::new(vlen);
    state
      .apply(&ConfigRequest {
        vtype: Pending::Ready(Vtype { sew, lmul, vta, vma: false }.encode()),
        avl: AvlSource::Immediate(avl),
      })
      .unwrap();
    state
  }

  fn vadd_vv(vd: u8, vs2: u8, vs1: u8) -> FetchedInst {
    let mut record = InstRecord::new("vadd.vv");
    record.vd = Some(vd);
    record.vs2 = Some(vs2);
    record.vs1 = Some(vs1);
    FetchedInst { index: 3, record }
  }

  #[test]
  fn test_lmul4_expands_to_four_slices() {
    let vcsr = configured(1024, 8, Lmul::M4, true, 512);
    let slices = vector_slices(&vadd_vv(4, 8, 12), Form::VecVec, &vcsr).unwrap();
    assert_eq!(slices.len(), 4);
    for (i, slice) in slices.iter().enumerate() {
      let i = i as u8;
      assert_eq!(slice.dests, vec![Reg::V(4 + i)]);
      assert_eq!(slice.srcs, vec![Reg::V(8 + i), Reg::V(12 + i)]);
      assert!(!slice.has_tail);
    }
  }

  #[test]
  fn test_lmul1_single_slice() {
    let vcsr = VectorConfigState::new(1024);
    let slices = vector_slices(&vadd_vv(1, 2, 3), Form::VecVec, &vcsr).unwrap();
    assert_eq!(slices.len(), 1);
  }

  #[test]
  fn test_tail_undisturbed_marks_partial_slices() {
    // e8, m4, vlen 1024: 128 elements per register, vl = 200
    let vcsr = configured(1024, 8, Lmul::M4, false, 200);
    let slices = vector_slices(&vadd_vv(4, 8, 12), Form::VecVec, &vcsr).unwrap();
    let tails: Vec<bool> = slices.iter().map(|s| s.has_tail).collect();
    assert_eq!(tails, vec![false, true, true, true]);
    assert!(slices[1].srcs.contains(&Reg::V(5)));
    assert!(!slices[0].srcs.contains(&Reg::V(4)));
  }

  #[test]
  fn test_fractional_lmul_tail_ends_at_vlmax() {
    // e16, mf4, vlen 1024: one register holds 64 elements but vlmax is 16
    let tail = |vta: bool, vl: u64| {
      let vcsr = configured(1024, 16, Lmul::Mf4, vta, vl);
      let slices = vector_slices(&vadd_vv(1, 2, 3), Form::VecVec, &vcsr).unwrap();
      assert_eq!(slices.len(), 1);
      slices[0].has_tail
    };
    assert!(tail(false, 10));
    assert!(!tail(false, 16));
    assert!(!tail(true, 10));
  }

  #[test]
  fn test_tail_agnostic_has_no_tail() {
    let vcsr = configured(1024, 8, Lmul::M1, true, 10);
    let slices = vector_slices(&vadd_vv(1, 2, 3), Form::VecVec, &vcsr).unwrap();
    assert!(!slices[0].has_tail);
  }

  #[test]
  fn test_vector_scalar_reads_rs1_and_mask() {
    let vcsr = configured(1024, 32, Lmul::M2, true, 64);
    let mut record = InstRecord::new("vmul.vx");
    record.vd = Some(2);
    record.vs2 = Some(6);
    record.rs1 = Some(3);
    record.vm = false;
    let inst = FetchedInst { index: 0, record };
    let slices = vector_slices(&inst, Form::VecScalar, &vcsr).unwrap();
    assert_eq!(slices.len(), 2);
    assert_eq!(slices[1].srcs, vec![Reg::V(7), Reg::X(3), Reg::V(0), Reg::V(3)]);
  }

  #[test]
  fn test_misaligned_group_is_malformed() {
    let vcsr = configured(1024, 8, Lmul::M4, true, 16);
    let err = vector_slices(&vadd_vv(2, 8, 12), Form::VecVec, &vcsr).unwrap_err();
    assert!(matches!(err, Fault::MalformedInstruction { .. }));
  }

  #[test]
  fn test_scalar_footprints() {
    let mut record = InstRecord::new("add");
    record.rd = Some(0);
    record.rs1 = Some(1);
    record.rs2 = Some(2);
    let slice = scalar_slice(&FetchedInst { index: 0, record }, Form::RegReg).unwrap();
    assert_eq!(slice.srcs, vec![Reg::X(1), Reg::X(2)]);
    assert!(slice.dests.is_empty());
  }

  #[test]
  fn test_config_footprints() {
    let mut record = InstRecord::new("vsetvl");
    record.rd = Some(1);
    record.rs1 = Some(5);
    record.rs2 = Some(6);
    let slice = config_slice(&FetchedInst { index: 0, record }, Form::Vsetvl).unwrap();
    assert_eq!(slice.srcs, vec![Reg::X(5), Reg::X(6)]);
    assert_eq!(slice.dests, vec![Reg::X(1)]);
  }
}
