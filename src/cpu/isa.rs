use serde::{Deserialize, Serialize};
use std::fmt;

/// Architectural register name. `X(0)` is hard-wired zero and never tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Reg {
  X(u8),
  V(u8),
}

impl Reg {
  pub fn is_zero(&self) -> bool {
    matches!(self, Reg::X(0))
  }
}

impl fmt::Display for Reg {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Reg::X(n) => write!(f, "x{}", n),
      Reg::V(n) => write!(f, "v{}", n),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpClass {
  Scalar,
  VectorConfig,
  VectorOp,
}

/// Execution unit class; selects the issue queue and the latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecUnit {
  Alu,
  Mul,
  Div,
  Vset,
  Valu,
  Vmul,
  Vdiv,
}

impl ExecUnit {
  pub const ALL: [ExecUnit; 7] = [
    ExecUnit::Alu,
    ExecUnit::Mul,
    ExecUnit::Div,
    ExecUnit::Vset,
    ExecUnit::Valu,
    ExecUnit::Vmul,
    ExecUnit::Vdiv,
  ];

  pub fn is_vector(&self) -> bool {
    matches!(self, ExecUnit::Vset | ExecUnit::Valu | ExecUnit::Vmul | ExecUnit::Vdiv)
  }
}

/// Operand layout of an implemented mnemonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Form {
  /// rd, rs1, rs2
  RegReg,
  /// rd, rs1, imm
  RegImm,
  /// rd, imm
  Upper,
  Nop,
  /// rd, rs1 (avl), vtype immediate
  Vsetvli,
  /// rd, uimm (avl), vtype immediate
  Vsetivli,
  /// rd, rs1 (avl), rs2 (vtype)
  Vsetvl,
  /// vd, vs2, vs1
  VecVec,
  /// vd, vs2, rs1
  VecScalar,
  /// vd, vs2, imm
  VecImm,
  /// vd, vs1
  MoveVec,
  /// vd, rs1
  MoveScalar,
  /// vd, imm
  MoveImm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpInfo {
  pub class: OpClass,
  pub unit: ExecUnit,
  pub form: Form,
}

impl OpInfo {
  const fn new(class: OpClass, unit: ExecUnit, form: Form) -> Self {
    Self { class, unit, form }
  }
}

/// Look up an implemented mnemonic. `None` means the core has no model for it.
pub fn lookup(mnemonic: &str) -> Option<OpInfo> {
  use ExecUnit::*;
  use Form::*;
  use OpClass::*;

  let info = match mnemonic {
    "add" | "sub" | "and" | "or" | "xor" | "sll" | "srl" | "sra" => OpInfo::new(Scalar, Alu, RegReg),
    "addi" | "andi" | "ori" | "xori" | "slli" | "srli" | "srai" => OpInfo::new(Scalar, Alu, RegImm),
    "lui" => OpInfo::new(Scalar, Alu, Upper),
    "nop" => OpInfo::new(Scalar, Alu, Nop),
    "mul" | "mulh" => OpInfo::new(Scalar, Mul, RegReg),
    "div" | "divu" | "rem" | "remu" => OpInfo::new(Scalar, Div, RegReg),

    "vsetvli" => OpInfo::new(VectorConfig, Vset, Vsetvli),
    "vsetivli" => OpInfo::new(VectorConfig, Vset, Vsetivli),
    "vsetvl" => OpInfo::new(VectorConfig, Vset, Vsetvl),

    "vmv.v.v" => OpInfo::new(VectorOp, Valu, MoveVec),
    "vmv.v.x" => OpInfo::new(VectorOp, Valu, MoveScalar),
    "vmv.v.i" => OpInfo::new(VectorOp, Valu, MoveImm),

    _ => return lookup_vector_arith(mnemonic),
  };
  Some(info)
}

fn lookup_vector_arith(mnemonic: &str) -> Option<OpInfo> {
  let (base, suffix) = mnemonic.rsplit_once('.')?;
  let (unit, suffixes): (ExecUnit, &[&str]) = match base {
    "vadd" | "vand" | "vor" | "vxor" | "vsll" | "vsrl" | "vsra" => (ExecUnit::Valu, &["vv", "vx", "vi"]),
    "vsub" | "vmin" | "vminu" | "vmax" | "vmaxu" => (ExecUnit::Valu, &["vv", "vx"]),
    "vrsub" => (ExecUnit::Valu, &["vx", "vi"]),
    "vmul" | "vmulh" => (ExecUnit::Vmul, &["vv", "vx"]),
    "vdiv" | "vdivu" | "vrem" | "vremu" => (ExecUnit::Vdiv, &["vv", "vx"]),
    _ => return None,
  };
  if !suffixes.contains(&suffix) {
    return None;
  }
  let form = match suffix {
    "vv" => Form::VecVec,
    "vx" => Form::VecScalar,
    _ => Form::VecImm,
  };
  Some(OpInfo::new(OpClass::VectorOp, unit, form))
}

/// Vector register group multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lmul {
  Mf8,
  Mf4,
  Mf2,
  M1,
  M2,
  M4,
  M8,
}

impl Lmul {
  /// Decode the `vlmul` field of vtype. Encoding 4 is reserved.
  pub fn from_vlmul(bits: u64) -> Option<Self> {
    match bits & 0x7 {
      0 => Some(Lmul::M1),
      1 => Some(Lmul::M2),
      2 => Some(Lmul::M4),
      3 => Some(Lmul::M8),
      5 => Some(Lmul::Mf8),
      6 => Some(Lmul::Mf4),
      7 => Some(Lmul::Mf2),
      _ => None,
    }
  }

  pub fn vlmul(&self) -> u64 {
    match self {
      Lmul::M1 => 0,
      Lmul::M2 => 1,
      Lmul::M4 => 2,
      Lmul::M8 => 3,
      Lmul::Mf8 => 5,
      Lmul::Mf4 => 6,
      Lmul::Mf2 => 7,
    }
  }

  /// (numerator, denominator)
  pub fn ratio(&self) -> (u32, u32) {
    match self {
      Lmul::Mf8 => (1, 8),
      Lmul::Mf4 => (1, 4),
      Lmul::Mf2 => (1, 2),
      Lmul::M1 => (1, 1),
      Lmul::M2 => (2, 1),
      Lmul::M4 => (4, 1),
      Lmul::M8 => (8, 1),
    }
  }

  /// Number of vector registers in a group; fractional LMUL still occupies one.
  pub fn group_size(&self) -> u32 {
    self.ratio().0
  }
}

impl fmt::Display for Lmul {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.ratio() {
      (n, 1) => write!(f, "{}", n),
      (n, d) => write!(f, "{}/{}", n, d),
    }
  }
}

/// Decoded vtype CSR value (RVV 1.0 layout).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vtype {
  pub sew: u32,
  pub lmul: Lmul,
  pub vta: bool,
  pub vma: bool,
}

impl Vtype {
  /// Returns `None` for encodings that set vill: bit XLEN-1, reserved
  /// vsew/vlmul values or any nonzero reserved bit.
  pub fn decode(raw: u64) -> Option<Self> {
    if raw >> 8 != 0 {
      return None;
    }
    let sew = match (raw >> 3) & 0x7 {
      0 => 8,
      1 => 16,
      2 => 32,
      3 => 64,
      _ => return None,
    };
    Some(Vtype {
      sew,
      lmul: Lmul::from_vlmul(raw)?,
      vta: (raw >> 6) & 1 != 0,
      vma: (raw >> 7) & 1 != 0,
    })
  }

  pub fn encode(&self) -> u64 {
    let vsew = match self.sew {
      16 => 1,
      32 => 2,
      64 => 3,
      _ => 0,
    };
    self.lmul.vlmul() | (vsew << 3) | ((self.vta as u64) << 6) | ((self.vma as u64) << 7)
  }
}
