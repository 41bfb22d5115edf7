//! # Deathmatch Core
//!
//! Core types for the Deathmatch orchestrator: the agent registry, the line
//! protocol spoken with agents, and the referee that moves agents through
//! `waiting -> active -> dead` and decides the winner.
//!
//! Everything here is synchronous and runtime-agnostic. The event loop in
//! `match-engine` feeds transport events in and executes the returned
//! [`Effect`]s.

pub mod agent;
pub mod config;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod referee;
pub mod registry;

pub use agent::{Agent, AgentConfig, AgentId, AgentStatus};
pub use config::{MatchConfig, PauseMethod, ReleaseMode, TransportKind};
pub use error::{DeathmatchError, Result};
pub use protocol::{Inbound, LineBuffer, Outbound};
pub use referee::{Effect, MatchOutcome, RefereeEvent, TerminationMode, Winner};
pub use registry::{AgentSnapshot, Match, MatchId, MatchPhase, MatchSnapshot};

/// Current Deathmatch version for compatibility checks
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build information for logs and the status surface
pub const BUILD_INFO: &str = concat!(
    "Deathmatch ",
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("CARGO_PKG_NAME"),
    ")"
);

/// Status API routes served by the orchestrator
pub mod endpoints {
    pub const HEALTH: &str = "/health";
    pub const METRICS: &str = "/metrics";
    pub const API_V1_MATCH: &str = "/api/v1/match";
    pub const API_V1_AGENTS: &str = "/api/v1/agents";
}
