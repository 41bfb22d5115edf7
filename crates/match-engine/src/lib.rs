//! # Match Engine
//!
//! Runs one Deathmatch: applies transport events to the registry through the
//! referee, executes the resulting effects against live agent links, and
//! publishes a snapshot after every step for the status surface.

pub mod engine;
mod release;

pub use engine::{EngineSettings, Orchestrator};

use deathmatch_core::MatchSnapshot;
use parking_lot::RwLock;
use std::sync::Arc;

/// Latest match state, shared with readers outside the event loop.
pub type SharedSnapshot = Arc<RwLock<MatchSnapshot>>;

pub fn shared_snapshot() -> SharedSnapshot {
    Arc::new(RwLock::new(MatchSnapshot::empty()))
}
