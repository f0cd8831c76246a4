use serde::{Deserialize, Serialize};

use super::ring_buffer::RingBuffer;
use crate::cpu::bundles::uop::{InstId, MicroOp};
use crate::error::Fault;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobEntry {
  pub uop: MicroOp,
  pub completed: bool,
}

impl RobEntry {
  pub fn id(&self) -> InstId {
    self.uop.id
  }

  /// Tail status captured when the uop was decoded.
  pub fn has_tail(&self) -> bool {
    self.uop.has_tail
  }
}

/// In-flight uops in program order; retirement strictly from the head.
#[derive(Debug, Clone)]
pub struct ReorderBuffer {
  entries: RingBuffer<RobEntry>,
  last_retired: Option<RobEntry>,
  retired_insts: u64,
}

impl ReorderBuffer {
  pub fn new(capacity: usize) -> Self {
    Self {
      entries: RingBuffer::new(capacity),
      last_retired: None,
      retired_insts: 0,
    }
  }

  pub fn allocate(&mut self, uop: MicroOp) -> Result<&RobEntry, Fault> {
    if let Some(back) = self.entries.back() {
      if uop.id <= back.id() {
        return Err(Fault::invariant(
          "rob",
          format!("uop {} allocated after younger uop {}", uop.id, back.id()),
        ));
      }
    }
    let id = uop.id;
    self
      .entries
      .push(RobEntry { uop, completed: false })
      .map_err(|_| Fault::invariant("rob", format!("allocation of uop {} overflows the rob", id)))?;
    self
      .entries
      .back()
      .ok_or_else(|| Fault::invariant("rob", "allocated entry missing"))
  }

  /// Mark `id` complete and return its entry.
  pub fn complete(&mut self, id: InstId) -> Result<&RobEntry, Fault> {
    let entry = self
      .entries
      .find_mut(|e| e.id() == id)
      .ok_or_else(|| Fault::invariant("rob", format!("completion of unknown uop {}", id)))?;
    if entry.completed {
      return Err(Fault::invariant("rob", format!("uop {} completed twice", id)));
    }
    entry.completed = true;
    Ok(&*entry)
  }

  pub fn retire_ready(&self) -> bool {
    self.entries.peek().map_or(false, |e| e.completed)
  }

  pub fn retire(&mut self) -> Result<RobEntry, Fault> {
    if !self.retire_ready() {
      return Err(Fault::invariant("rob", "retirement attempted out of order"));
    }
    let entry = self
      .entries
      .pop()
      .ok_or_else(|| Fault::invariant("rob", "retirement from an empty rob"))?;
    self.retired_insts += 1;
    self.last_retired = Some(entry.clone());
    Ok(entry)
  }

  pub fn head(&self) -> Option<&RobEntry> {
    self.entries.peek()
  }

  pub fn last_retired(&self) -> Option<&RobEntry> {
    self.last_retired.as_ref()
  }

  pub fn retired_insts(&self) -> u64 {
    self.retired_insts
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn capacity(&self) -> usize {
    self.entries.capacity()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cpu::isa::{ExecUnit, OpClass};

  fn uop(id: InstId, has_tail: bool) -> MicroOp {
    MicroOp {
      id,
      program_index: id,
      mnemonic: "vadd.vv".to_string(),
      class: OpClass::VectorOp,
      unit: ExecUnit::Valu,
      expanded: false,
      uop_index: 0,
      uop_count: 1,
      srcs: Vec::new(),
      dests: Vec::new(),
      producers: Vec::new(),
      has_tail,
      iq: 1,
      vconfig: None,
    }
  }

  #[test]
  fn test_in_order_retirement() {
    let mut rob = ReorderBuffer::new(8);
    rob.allocate(uop(0, false)).unwrap();
    rob.allocate(uop(1, true)).unwrap();

    rob.complete(1).unwrap();
    assert!(!rob.retire_ready());
    assert!(matches!(rob.retire(), Err(Fault::InvariantViolation { .. })));

    rob.complete(0).unwrap();
    assert_eq!(rob.retire().unwrap().id(), 0);
    assert_eq!(rob.retire().unwrap().id(), 1);
    assert!(rob.last_retired().unwrap().has_tail());
    assert_eq!(rob.retired_insts(), 2);
    assert!(rob.is_empty());
  }

  #[test]
  fn test_allocation_limits() {
    let mut rob = ReorderBuffer::new(2);
    rob.allocate(uop(3, false)).unwrap();
    assert!(rob.allocate(uop(3, false)).is_err());
    rob.allocate(uop(4, false)).unwrap();
    assert!(rob.allocate(uop(5, false)).is_err());
  }

  #[test]
  fn test_bad_completions() {
    let mut rob = ReorderBuffer::new(4);
    rob.allocate(uop(0, false)).unwrap();
    assert!(rob.complete(7).is_err());
    rob.complete(0).unwrap();
    assert!(rob.complete(0).is_err());
  }

  #[test]
  fn test_last_retired_never_regresses() {
    let mut rob = ReorderBuffer::new(4);
    for id in 0..4 {
      rob.allocate(uop(id, id % 2 == 1)).unwrap();
      rob.complete(id).unwrap();
    }
    let mut last = None;
    while rob.retire_ready() {
      let id = rob.retire().unwrap().id();
      assert!(last.map_or(true, |prev| id > prev));
      last = Some(id);
      assert_eq!(rob.last_retired().map(|e| e.id()), last);
    }
  }
}
