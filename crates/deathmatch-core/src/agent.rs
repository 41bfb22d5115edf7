//! Agent types

use crate::protocol::LineBuffer;
use serde::{Deserialize, Serialize};

/// Process id for piped agents, connection id for socket agents.
pub type AgentId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Waiting,
    Active,
    Dead,
}

impl AgentStatus {
    /// Status only moves forward: `waiting -> active -> dead`.
    pub fn can_advance_to(self, next: AgentStatus) -> bool {
        matches!(
            (self, next),
            (AgentStatus::Waiting, AgentStatus::Active)
                | (AgentStatus::Waiting, AgentStatus::Dead)
                | (AgentStatus::Active, AgentStatus::Dead)
        )
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            AgentStatus::Waiting => "waiting",
            AgentStatus::Active => "active",
            AgentStatus::Dead => "dead",
        };
        f.write_str(label)
    }
}

/// One roster entry as it appears in the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    #[serde(default)]
    pub ornament: String,
    #[serde(default)]
    pub command: Vec<String>,
}

impl AgentConfig {
    pub fn new(name: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            name: name.into(),
            ornament: String::new(),
            command,
        }
    }
}

/// A launched population member.
///
/// `T` is the transport handle. The record owns it exclusively and gives it
/// up exactly once through [`Agent::close_transport`].
#[derive(Debug)]
pub struct Agent<T> {
    pub(crate) id: AgentId,
    pub(crate) name: String,
    pub(crate) ornament: String,
    pub(crate) status: AgentStatus,
    pub(crate) ready_counted: bool,
    pub(crate) ever_active: bool,
    pub(crate) excluded: bool,
    pub(crate) terminate_issued: bool,
    pub(crate) transport: Option<T>,
    pub(crate) inbound: LineBuffer,
}

impl<T> Agent<T> {
    pub fn new(id: AgentId, name: impl Into<String>, ornament: impl Into<String>, transport: T) -> Self {
        Self {
            id,
            name: name.into(),
            ornament: ornament.into(),
            status: AgentStatus::Waiting,
            ready_counted: false,
            ever_active: false,
            excluded: false,
            terminate_issued: false,
            transport: Some(transport),
            inbound: LineBuffer::new(),
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ornament(&self) -> &str {
        &self.ornament
    }

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == AgentStatus::Active
    }

    /// True once the agent has been released into the match at least once.
    pub fn ever_active(&self) -> bool {
        self.ever_active
    }

    /// Dropped from the expected population before the release.
    pub fn is_excluded(&self) -> bool {
        self.excluded
    }

    pub fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    /// Hands the transport out for closing. Returns `None` on every call after the first.
    pub fn close_transport(&mut self) -> Option<T> {
        self.transport.take()
    }

    pub fn inbound(&self) -> &LineBuffer {
        &self.inbound
    }

    /// Monotonic status change. Returns false when the move is not allowed.
    pub(crate) fn advance(&mut self, next: AgentStatus) -> bool {
        if !self.status.can_advance_to(next) {
            return false;
        }
        if next == AgentStatus::Active {
            self.ever_active = true;
        }
        self.status = next;
        true
    }
}
