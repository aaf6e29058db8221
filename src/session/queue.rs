//! FIFO of names awaiting forward resolution.
//!
//! The queue itself does no I/O. It owns the Idle/Draining state machine that
//! guarantees a single worker: `push` reports the one Idle→Draining edge that
//! should spawn it, and `next` flips back to Idle under the same lock the
//! moment the queue runs dry.

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueState {
    #[default]
    Idle,
    Draining,
}

#[derive(Debug, Default)]
pub struct ResolutionQueue {
    names: VecDeque<String>,
    state: QueueState,
}

impl ResolutionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a name. Returns true when the caller must start the worker.
    #[must_use]
    pub fn push(&mut self, name: impl Into<String>) -> bool {
        self.names.push_back(name.into());
        match self.state {
            QueueState::Idle => {
                self.state = QueueState::Draining;
                true
            }
            QueueState::Draining => false,
        }
    }

    /// Next name for the worker. `None` ends the worker and returns the
    /// queue to Idle.
    pub fn next(&mut self) -> Option<String> {
        let name = self.names.pop_front();
        if name.is_none() {
            self.state = QueueState::Idle;
        }
        name
    }

    pub fn has_pending(&self) -> bool {
        !self.names.is_empty()
    }

    pub fn state(&self) -> QueueState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
