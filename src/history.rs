use std::collections::VecDeque;

use crate::instrument::Instrument;
use crate::song::Pattern;
use crate::wavestore::WavetableEntry;

/// State captured right before an edit mutates it.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Wave { index: usize, entry: WavetableEntry },
    Pattern { index: usize, pattern: Pattern },
    Instrument { index: usize, instrument: Instrument },
}

/// Record-before-mutate hook injected into the engine. Called exactly once per
/// user-visible edit.
pub trait History: Send {
    fn record(&mut self, snapshot: Snapshot);
    fn pop(&mut self) -> Option<Snapshot>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&mut self) {
        while self.pop().is_some() {}
    }
}

pub struct UndoStack {
    depth: usize,
    entries: VecDeque<Snapshot>,
}

impl UndoStack {
    pub fn new(depth: usize) -> Self {
        UndoStack {
            depth: depth.max(1),
            entries: VecDeque::new(),
        }
    }
}

impl History for UndoStack {
    fn record(&mut self, snapshot: Snapshot) {
        if self.entries.len() == self.depth {
            self.entries.pop_front();
        }
        self.entries.push_back(snapshot);
    }

    fn pop(&mut self) -> Option<Snapshot> {
        self.entries.pop_back()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Discards everything; for hosts that keep their own undo.
pub struct NoHistory;

impl History for NoHistory {
    fn record(&mut self, _snapshot: Snapshot) {}

    fn pop(&mut self) -> Option<Snapshot> {
        None
    }

    fn len(&self) -> usize {
        0
    }
}
