use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::cpu::bundles::uop::InstId;
use crate::cpu::isa::Reg;

/// Register -> youngest in-flight writer, plus the set of micro-ops whose
/// results are not yet available.
///
/// Decode reserves destinations and captures producers, issue queues check
/// readiness, the ROB releases entries on completion.
#[derive(Debug, Default)]
pub struct Scoreboard {
  writers: HashMap<Reg, InstId>,
  pending: BTreeSet<InstId>,
}

/// One scoreboard per core, shared by its decode, issue and rob models.
pub type SharedScoreboard = Arc<Mutex<Scoreboard>>;

pub fn shared() -> SharedScoreboard {
  Arc::new(Mutex::new(Scoreboard::default()))
}

/// Models run on one thread; a poisoned lock still holds consistent data.
pub fn lock(scoreboard: &SharedScoreboard) -> MutexGuard<'_, Scoreboard> {
  scoreboard.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Scoreboard {
  /// In-flight writers of `srcs`, deduplicated and in ascending order.
  pub fn producers_of(&self, srcs: &[Reg]) -> Vec<InstId> {
    let producers: BTreeSet<InstId> = srcs
      .iter()
      .filter(|reg| !reg.is_zero())
      .filter_map(|reg| self.writers.get(reg).copied())
      .filter(|id| self.pending.contains(id))
      .collect();
    producers.into_iter().collect()
  }

  pub fn reserve(&mut self, id: InstId, dests: &[Reg]) {
    self.pending.insert(id);
    for reg in dests.iter().filter(|reg| !reg.is_zero()) {
      self.writers.insert(*reg, id);
    }
  }

  /// Mark `id` complete. Writer entries already taken over by a younger
  /// producer are left alone.
  pub fn complete(&mut self, id: InstId, dests: &[Reg]) {
    self.pending.remove(&id);
    for reg in dests {
      if self.writers.get(reg) == Some(&id) {
        self.writers.remove(reg);
      }
    }
  }

  pub fn is_busy(&self, reg: Reg) -> bool {
    !reg.is_zero() && self.writers.get(&reg).map_or(false, |id| self.pending.contains(id))
  }

  pub fn is_ready(&self, producers: &[InstId]) -> bool {
    producers.iter().all(|id| !self.pending.contains(id))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_raw_tracking() {
    let mut sb = Scoreboard::default();
    sb.reserve(1, &[Reg::X(3)]);
    assert!(sb.is_busy(Reg::X(3)));
    let producers = sb.producers_of(&[Reg::X(3), Reg::X(4)]);
    assert_eq!(producers, vec![1]);
    assert!(!sb.is_ready(&producers));

    sb.complete(1, &[Reg::X(3)]);
    assert!(!sb.is_busy(Reg::X(3)));
    assert!(sb.is_ready(&producers));
    assert!(sb.pending.is_empty());
  }

  #[test]
  fn test_x0_never_tracked() {
    let mut sb = Scoreboard::default();
    sb.reserve(1, &[Reg::X(0)]);
    assert!(!sb.is_busy(Reg::X(0)));
    assert!(sb.producers_of(&[Reg::X(0)]).is_empty());
  }

  #[test]
  fn test_younger_writer_survives_older_completion() {
    let mut sb = Scoreboard::default();
    sb.reserve(1, &[Reg::V(4)]);
    sb.reserve(2, &[Reg::V(4)]);
    sb.complete(1, &[Reg::V(4)]);
    assert!(sb.is_busy(Reg::V(4)));
    assert_eq!(sb.producers_of(&[Reg::V(4)]), vec![2]);
  }

  #[test]
  fn test_producers_deduplicated() {
    let mut sb = Scoreboard::default();
    sb.reserve(7, &[Reg::V(1), Reg::V(2)]);
    assert_eq!(sb.producers_of(&[Reg::V(1), Reg::V(2), Reg::V(1)]), vec![7]);
  }
}
