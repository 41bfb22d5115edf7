//! Resume ordering for staggered release

use deathmatch_core::AgentId;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Agents waiting to be resumed, one every `spacing`, in registry order.
#[derive(Debug)]
pub(crate) struct ResumeSchedule {
    queue: VecDeque<AgentId>,
    next_at: Option<Instant>,
    spacing: Duration,
}

impl ResumeSchedule {
    pub(crate) fn new(spacing: Duration) -> Self {
        Self {
            queue: VecDeque::new(),
            next_at: None,
            spacing,
        }
    }

    /// The first agent is due one `spacing` after `now`, so every pause has
    /// landed before anyone is resumed.
    pub(crate) fn start(&mut self, ids: Vec<AgentId>, now: Instant) {
        self.queue = ids.into();
        self.next_at = if self.queue.is_empty() {
            None
        } else {
            Some(now + self.spacing)
        };
    }

    pub(crate) fn due_at(&self) -> Option<Instant> {
        self.next_at
    }

    /// Take the agent due at `now`, if any, and schedule the next one.
    pub(crate) fn pop_due(&mut self, now: Instant) -> Option<AgentId> {
        match self.next_at {
            Some(at) if at <= now => {}
            _ => return None,
        }
        let id = self.queue.pop_front();
        self.next_at = if self.queue.is_empty() {
            None
        } else {
            Some(now + self.spacing)
        };
        id
    }

    pub(crate) fn clear(&mut self) {
        self.queue.clear();
        self.next_at = None;
    }
}
