//! Periodic motion recheck scheduling.
//!
//! Every cell with moving residents owns one recurring task that fires
//! every `interval` ticks. The task exists exactly while the cell's moving
//! list is non-empty: it is started when the first mover appears and
//! cancelled the instant the last one leaves. Due cells are returned in
//! key order so replicas migrate entities in the same sequence.

use std::collections::BTreeMap;

use crate::cell::CellKey;

/// Tick-driven scheduler for per-cell motion rechecks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotionScheduler {
    interval: u64,
    due: BTreeMap<CellKey, u64>,
}

impl MotionScheduler {
    /// Create a scheduler firing every `interval` ticks (minimum 1).
    #[must_use]
    pub fn new(interval: u32) -> Self {
        Self {
            interval: u64::from(interval.max(1)),
            due: BTreeMap::new(),
        }
    }

    /// Ticks between rechecks.
    #[must_use]
    pub const fn interval(&self) -> u64 {
        self.interval
    }

    /// Start the task for `cell` if it is not already running.
    pub fn start(&mut self, cell: CellKey, now: u64) {
        if !self.due.contains_key(&cell) {
            tracing::trace!(cell = ?cell, "Motion recheck started");
            self.due.insert(cell, now + self.interval);
        }
    }

    /// Cancel the task for `cell`.
    pub fn cancel(&mut self, cell: CellKey) {
        if self.due.remove(&cell).is_some() {
            tracing::trace!(cell = ?cell, "Motion recheck cancelled");
        }
    }

    /// Whether `cell` has a running task.
    #[must_use]
    pub fn is_scheduled(&self, cell: CellKey) -> bool {
        self.due.contains_key(&cell)
    }

    /// Number of running tasks.
    #[must_use]
    pub fn active(&self) -> usize {
        self.due.len()
    }

    /// Collect cells due at `now` and schedule their next run.
    pub fn take_due(&mut self, now: u64) -> Vec<CellKey> {
        let mut fired = Vec::new();
        for (cell, due) in &mut self.due {
            if *due <= now {
                fired.push(*cell);
                *due = now + self.interval;
            }
        }
        fired
    }
}
