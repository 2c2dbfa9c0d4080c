use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A captured game state.
///
/// Two snapshots are equal when their values are equal; the capture time is
/// informational.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub value: Value,
    pub captured_at: DateTime<Utc>,
}

impl StateSnapshot {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            captured_at: Utc::now(),
        }
    }
}

impl PartialEq for StateSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

/// Bounded linear history with a cursor.
///
/// `entries[cursor]` is the current snapshot. Everything after the cursor is
/// the redo tail, discarded on the next push.
#[derive(Debug, Clone)]
pub struct SnapshotHistory {
    entries: VecDeque<StateSnapshot>,
    cursor: usize,
    max_len: usize,
}

impl SnapshotHistory {
    pub fn new(max_len: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cursor: 0,
            max_len: max_len.max(1),
        }
    }

    pub fn push(&mut self, snapshot: StateSnapshot) {
        if !self.entries.is_empty() {
            self.entries.truncate(self.cursor + 1);
        }
        self.entries.push_back(snapshot);
        while self.entries.len() > self.max_len {
            self.entries.pop_front();
        }
        self.cursor = self.entries.len() - 1;
    }

    pub fn current(&self) -> Option<&StateSnapshot> {
        self.entries.get(self.cursor)
    }

    pub fn latest(&self) -> Option<&StateSnapshot> {
        self.entries.back()
    }

    pub fn undo(&mut self) -> Option<&StateSnapshot> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        self.current()
    }

    pub fn redo(&mut self) -> Option<&StateSnapshot> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        self.current()
    }

    pub fn can_undo(&self) -> bool {
        !self.entries.is_empty() && self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
