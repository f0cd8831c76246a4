use serde::{Deserialize, Serialize};

use crate::cpu::isa::{Lmul, Reg, Vtype};
use crate::error::Fault;

/// Observable vector CSR values (vl, vtype fields and derived vlmax).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorConfig {
  pub sew: u32,
  pub lmul: Lmul,
  pub vl: u32,
  pub vlmax: u32,
  pub vta: bool,
  pub vma: bool,
  pub vill: bool,
}

impl VectorConfig {
  /// Reset value: e8, m1, tail/mask undisturbed, vl = vlmax.
  pub fn reset(vlen: u32) -> Self {
    let vlmax = vlen / 8;
    Self {
      sew: 8,
      lmul: Lmul::M1,
      vl: vlmax,
      vlmax,
      vta: false,
      vma: false,
      vill: false,
    }
  }

  fn illegal(&self) -> Self {
    Self {
      vl: 0,
      vlmax: 0,
      vta: false,
      vma: false,
      vill: true,
      ..*self
    }
  }
}

/// Operand that may still be waiting on an in-flight producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pending<T> {
  Ready(T),
  Waiting(Reg),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvlSource {
  Immediate(u64),
  Register(Pending<u64>),
  /// rs1 = x0, rd != x0
  VlMax,
  /// rs1 = x0, rd = x0
  KeepVl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigRequest {
  pub vtype: Pending<u64>,
  pub avl: AvlSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOutcome {
  pub state: VectorConfig,
  pub stall_required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfigState {
  vlen: u32,
  current: VectorConfig,
}

impl VectorConfigState {
  pub fn new(vlen: u32) -> Self {
    Self {
      vlen,
      current: VectorConfig::reset(vlen),
    }
  }

  pub fn current(&self) -> &VectorConfig {
    &self.current
  }

  /// vlmax = vlen / sew * lmul, never larger than vlen.
  pub fn vlmax_for(&self, sew: u32, lmul: Lmul) -> u32 {
    let (num, den) = lmul.ratio();
    let vlmax = u64::from(self.vlen) * u64::from(num) / (u64::from(sew) * u64::from(den));
    u32::try_from(vlmax).unwrap_or(u32::MAX)
  }

  /// Elements held by one vector register at the current SEW.
  pub fn elements_per_register(&self) -> u32 {
    self.vlen / self.current.sew
  }

  /// Apply a configuration request. Unresolved operands leave the state
  /// untouched and report `stall_required`.
  pub fn apply(&mut self, request: &ConfigRequest) -> Result<ApplyOutcome, Fault> {
    let stall = ApplyOutcome {
      state: self.current,
      stall_required: true,
    };

    let raw_vtype = match request.vtype {
      Pending::Ready(raw) => raw,
      Pending::Waiting(_) => return Ok(stall),
    };
    let avl = match request.avl {
      AvlSource::Immediate(avl) | AvlSource::Register(Pending::Ready(avl)) => Some(avl),
      AvlSource::Register(Pending::Waiting(_)) => return Ok(stall),
      AvlSource::VlMax => None,
      AvlSource::KeepVl => Some(u64::from(self.current.vl)),
    };

    let vlmax = Vtype::decode(raw_vtype).map(|vt| (vt, self.vlmax_for(vt.sew, vt.lmul)));
    self.current = match vlmax {
      Some((vtype, vlmax)) if vlmax > 0 => {
        let vl = avl.map_or(vlmax, |avl| avl.min(u64::from(vlmax)) as u32);
        VectorConfig {
          sew: vtype.sew,
          lmul: vtype.lmul,
          vl,
          vlmax,
          vta: vtype.vta,
          vma: vtype.vma,
          vill: false,
        }
      },
      _ => {
        log::warn!("vtype {:#x} is illegal for vlen {}, setting vill", raw_vtype, self.vlen);
        self.current.illegal()
      },
    };

    if self.current.vl > self.current.vlmax {
      return Err(Fault::invariant(
        "vcsr",
        format!("vl {} exceeds vlmax {} after clamping", self.current.vl, self.current.vlmax),
      ));
    }

    Ok(ApplyOutcome {
      state: self.current,
      stall_required: false,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn vtype(sew: u32, lmul: Lmul, vta: bool) -> u64 {
    Vtype { sew, lmul, vta, vma: false }.encode()
  }

  fn request(vtype: u64, avl: AvlSource) -> ConfigRequest {
    ConfigRequest {
      vtype: Pending::Ready(vtype),
      avl,
    }
  }

  #[test]
  fn test_reset_state() {
    let state = VectorConfigState::new(1024);
    let cfg = state.current();
    assert_eq!((cfg.sew, cfg.lmul, cfg.vl, cfg.vlmax, cfg.vta), (8, Lmul::M1, 128, 128, false));
  }

  #[test]
  fn test_immediate_applies_without_stall() {
    let mut state = VectorConfigState::new(1024);
    let out = state.apply(&request(vtype(32, Lmul::M1, true), AvlSource::Immediate(16))).unwrap();
    assert!(!out.stall_required);
    assert_eq!((out.state.sew, out.state.vl, out.state.vlmax, out.state.vta), (32, 16, 32, true));
    assert_eq!(state.current(), &out.state);
  }

  #[test]
  fn test_vl_clamped_to_vlmax() {
    let mut state = VectorConfigState::new(1024);
    let out = state.apply(&request(vtype(8, Lmul::M4, false), AvlSource::Immediate(1024))).unwrap();
    assert_eq!((out.state.vl, out.state.vlmax), (512, 512));
  }

  #[test]
  fn test_vlmax_source() {
    let mut state = VectorConfigState::new(1024);
    let out = state.apply(&request(vtype(16, Lmul::M8, true), AvlSource::VlMax)).unwrap();
    assert_eq!((out.state.vl, out.state.vlmax, out.state.lmul), (512, 512, Lmul::M8));
  }

  #[test]
  fn test_keep_vl_clamps_to_new_vlmax() {
    let mut state = VectorConfigState::new(1024);
    state.apply(&request(vtype(8, Lmul::M2, false), AvlSource::VlMax)).unwrap();
    assert_eq!(state.current().vl, 256);
    let out = state.apply(&request(vtype(32, Lmul::M1, false), AvlSource::KeepVl)).unwrap();
    assert_eq!((out.state.vl, out.state.vlmax), (32, 32));
  }

  #[test]
  fn test_unresolved_operand_stalls() {
    let mut state = VectorConfigState::new(1024);
    let before = *state.current();

    let out = state
      .apply(&request(vtype(8, Lmul::M4, false), AvlSource::Register(Pending::Waiting(Reg::X(5)))))
      .unwrap();
    assert!(out.stall_required);
    assert_eq!(state.current(), &before);

    let out = state
      .apply(&ConfigRequest {
        vtype: Pending::Waiting(Reg::X(6)),
        avl: AvlSource::Immediate(4),
      })
      .unwrap();
    assert!(out.stall_required);
    assert_eq!(state.current(), &before);
  }

  #[test]
  fn test_fractional_lmul() {
    let mut state = VectorConfigState::new(1024);
    let out = state.apply(&request(vtype(16, Lmul::Mf4, false), AvlSource::Immediate(100))).unwrap();
    assert_eq!((out.state.vl, out.state.vlmax), (16, 16));
  }

  #[test]
  fn test_vlmax_does_not_overflow() {
    let mut state = VectorConfigState::new(1 << 30);
    let out = state.apply(&request(vtype(8, Lmul::M8, true), AvlSource::VlMax)).unwrap();
    assert_eq!((out.state.vl, out.state.vlmax), (1 << 30, 1 << 30));

    let mut state = VectorConfigState::new(65536);
    let out = state.apply(&request(vtype(8, Lmul::M8, false), AvlSource::VlMax)).unwrap();
    assert_eq!(out.state.vlmax, 65536);
  }

  #[test]
  fn test_illegal_vtype_sets_vill() {
    let mut state = VectorConfigState::new(64);
    // e64 with mf8 leaves no element in a 64-bit register.
    let out = state.apply(&request(vtype(64, Lmul::Mf8, false), AvlSource::Immediate(1))).unwrap();
    assert!(out.state.vill);
    assert_eq!((out.state.vl, out.state.vlmax), (0, 0));

    let out = state.apply(&request(0b100, AvlSource::Immediate(1))).unwrap();
    assert!(out.state.vill);
  }

  #[test]
  fn test_vl_never_exceeds_vlmax() {
    let lmuls = [Lmul::Mf8, Lmul::Mf4, Lmul::Mf2, Lmul::M1, Lmul::M2, Lmul::M4, Lmul::M8];
    for vlen in [128u32, 1024, 2048] {
      let mut state = VectorConfigState::new(vlen);
      for sew in [8u32, 16, 32, 64] {
        for lmul in lmuls {
          for avl in [0u64, 1, 7, 31, 128, 1000, 4096, u64::MAX] {
            let out = state.apply(&request(vtype(sew, lmul, avl % 2 == 0), AvlSource::Immediate(avl))).unwrap();
            let cfg = out.state;
            assert!(cfg.vl <= cfg.vlmax);
            if !cfg.vill {
              assert_eq!(cfg.vlmax, state.vlmax_for(sew, lmul));
              assert_eq!((cfg.sew, cfg.lmul), (sew, lmul));
              assert_eq!(u64::from(cfg.vl), avl.min(u64::from(cfg.vlmax)));
            }
          }
        }
      }
    }
  }
}
