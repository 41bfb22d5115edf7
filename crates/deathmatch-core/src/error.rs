//! Error types for the Deathmatch orchestrator

use crate::agent::AgentId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DeathmatchError>;

#[derive(Error, Debug)]
pub enum DeathmatchError {
    #[error("Launch failed for agent {agent}: {reason}")]
    Launch { agent: String, reason: String },

    #[error("Protocol violation: {line:?}")]
    ProtocolViolation { line: String },

    #[error("Target not found: {target}")]
    TargetNotFound { target: AgentId },

    #[error("Transport failure for agent {agent_id}: {reason}")]
    Transport { agent_id: AgentId, reason: String },

    #[error("Termination failed for agent {agent_id}: {reason}")]
    Termination { agent_id: AgentId, reason: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Agent not found: {agent_id}")]
    UnknownAgent { agent_id: AgentId },

    #[error("Agent already registered: {agent_id}")]
    DuplicateAgent { agent_id: AgentId },

    #[error("No agents could be launched")]
    NoAgentsLaunched,

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Configuration parse error: {source}")]
    Toml {
        #[from]
        source: toml::de::Error,
    },

    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
}

impl DeathmatchError {
    /// Errors the match absorbs locally. Only setup failures end the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DeathmatchError::Launch { .. }
                | DeathmatchError::ProtocolViolation { .. }
                | DeathmatchError::TargetNotFound { .. }
                | DeathmatchError::Transport { .. }
                | DeathmatchError::Termination { .. }
        )
    }
}
