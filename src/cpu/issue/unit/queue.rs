use serde::{Deserialize, Serialize};

use super::scoreboard::Scoreboard;
use crate::cpu::bundles::uop::MicroOp;
use crate::error::Fault;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueQueueEntry {
  pub uop: MicroOp,
  /// Result of the last readiness check.
  pub ready: bool,
}

/// Holding buffer in front of one execution pipe. Entries stay sorted by id,
/// which is also arrival order since the ROB dispatches in program order.
#[derive(Debug, Clone)]
pub struct IssueQueue {
  name: String,
  entries: Vec<IssueQueueEntry>,
  capacity: usize,
  issue_width: usize,
  total_insts_issued: u64,
  raw_stall_cycles: u64,
}

impl IssueQueue {
  pub fn new(name: &str, capacity: usize, issue_width: usize) -> Self {
    Self {
      name: name.to_string(),
      entries: Vec::with_capacity(capacity),
      capacity,
      issue_width,
      total_insts_issued: 0,
      raw_stall_cycles: 0,
    }
  }

  pub fn offer(&mut self, uop: MicroOp) -> Result<(), Fault> {
    if self.entries.len() >= self.capacity {
      return Err(Fault::invariant(
        &self.name,
        format!("uop {} offered to a full queue ({} entries)", uop.id, self.capacity),
      ));
    }
    let pos = self.entries.partition_point(|e| e.uop.id < uop.id);
    self.entries.insert(pos, IssueQueueEntry { uop, ready: false });
    Ok(())
  }

  /// One issue cycle: oldest eligible entries first, at most `issue_width`.
  pub fn tick(&mut self, scoreboard: &Scoreboard) -> Vec<MicroOp> {
    if self.entries.is_empty() {
      return Vec::new();
    }
    for entry in self.entries.iter_mut() {
      entry.ready = scoreboard.is_ready(&entry.uop.producers);
    }

    let mut issued = Vec::new();
    let mut i = 0;
    while i < self.entries.len() && issued.len() < self.issue_width {
      if self.entries[i].ready {
        issued.push(self.entries.remove(i).uop);
      } else {
        i += 1;
      }
    }

    if issued.is_empty() {
      self.raw_stall_cycles += 1;
    }
    self.total_insts_issued += issued.len() as u64;
    issued
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn entries(&self) -> &[IssueQueueEntry] {
    &self.entries
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn total_insts_issued(&self) -> u64 {
    self.total_insts_issued
  }

  pub fn raw_stall_cycles(&self) -> u64 {
    self.raw_stall_cycles
  }
}
