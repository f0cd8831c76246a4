use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::CoreError;

/// One instruction of the input stream, already split into fields.
///
/// `avl` and `vtype` carry the runtime register values a configuration
/// instruction observes when its operands come from registers; the model does
/// not track data values itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstRecord {
  pub mnemonic: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub rd: Option<u8>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub rs1: Option<u8>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub rs2: Option<u8>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub vd: Option<u8>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub vs1: Option<u8>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub vs2: Option<u8>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub imm: Option<i64>,
  #[serde(default, deserialize_with = "de_u64_or_hex", skip_serializing_if = "Option::is_none")]
  pub vtype: Option<u64>,
  #[serde(default, deserialize_with = "de_u64_or_hex", skip_serializing_if = "Option::is_none")]
  pub avl: Option<u64>,
  /// RVV `vm` bit: false means the operation is masked by v0.
  #[serde(default = "unmasked")]
  pub vm: bool,
}

impl InstRecord {
  pub fn new(mnemonic: &str) -> Self {
    Self {
      mnemonic: mnemonic.to_string(),
      vm: true,
      ..Default::default()
    }
  }
}

/// An instruction tagged with its position in the program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedInst {
  pub index: u64,
  pub record: InstRecord,
}

fn unmasked() -> bool {
  true
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumOrText {
  Num(u64),
  Text(String),
}

fn de_u64_or_hex<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
  D: Deserializer<'de>,
{
  match Option::<NumOrText>::deserialize(deserializer)? {
    None => Ok(None),
    Some(NumOrText::Num(n)) => Ok(Some(n)),
    Some(NumOrText::Text(text)) => {
      let text = text.trim();
      let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse::<u64>(),
      };
      parsed.map(Some).map_err(|e| de::Error::custom(format!("invalid number '{}': {}", text, e)))
    },
  }
}

/// Parse a JSON instruction stream (an array of records).
pub fn parse_trace(content: &str) -> Result<Vec<InstRecord>, CoreError> {
  Ok(serde_json::from_str(content)?)
}

pub fn load_trace(path: &Path) -> Result<Vec<InstRecord>, CoreError> {
  let content = fs::read_to_string(path)?;
  parse_trace(&content)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_trace_fields() {
    let trace = parse_trace(
      r#"[
        {"mnemonic": "vsetvli", "rd": 1, "rs1": 5, "vtype": "0x12", "avl": 1024},
        {"mnemonic": "vadd.vv", "vd": 4, "vs1": 8, "vs2": 12, "vm": false},
        {"mnemonic": "addi", "rd": 3, "rs1": 0, "imm": -4}
      ]"#,
    )
    .unwrap();

    assert_eq!(trace.len(), 3);
    assert_eq!(trace[0].vtype, Some(0x12));
    assert_eq!(trace[0].avl, Some(1024));
    assert!(trace[0].vm);
    assert!(!trace[1].vm);
    assert_eq!(trace[1].vs2, Some(12));
    assert_eq!(trace[2].imm, Some(-4));
    assert_eq!(trace[2].vtype, None);
  }

  #[test]
  fn test_parse_trace_numeric_vtype() {
    let trace = parse_trace(r#"[{"mnemonic": "vsetivli", "imm": 16, "vtype": 210}]"#).unwrap();
    assert_eq!(trace[0].vtype, Some(210));
  }

  #[test]
  fn test_parse_trace_rejects_bad_hex() {
    assert!(parse_trace(r#"[{"mnemonic": "vsetvl", "vtype": "0xzz"}]"#).is_err());
  }

  #[test]
  fn test_record_survives_message_encoding() {
    let mut record = InstRecord::new("vsetvl");
    record.rs1 = Some(5);
    record.vtype = Some(0x2);
    let content = serde_json::to_string(&record).unwrap();
    let back: InstRecord = serde_json::from_str(&content).unwrap();
    assert_eq!(back, record);
  }
}
