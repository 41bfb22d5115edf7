//! Match counters
//!
//! Written by the event loop, read concurrently by the status surface.

use dashmap::DashMap;
use deathmatch_core::{AgentId, Effect, Outbound};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentCounters {
    pub name: String,
    pub bytes_received: u64,
    pub log_lines: u64,
    pub begins_sent: u64,
    pub opponents_sent: u64,
    pub terminations: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub bytes_received: u64,
    pub log_lines: u64,
    pub protocol_violations: u64,
    pub begins_sent: u64,
    pub opponents_sent: u64,
    pub terminations: u64,
    pub exits: u64,
    pub agents: Vec<(AgentId, AgentCounters)>,
}

#[derive(Debug, Default)]
pub struct MatchMetrics {
    bytes_received: AtomicU64,
    log_lines: AtomicU64,
    protocol_violations: AtomicU64,
    begins_sent: AtomicU64,
    opponents_sent: AtomicU64,
    terminations: AtomicU64,
    exits: AtomicU64,
    per_agent: DashMap<AgentId, AgentCounters>,
}

impl MatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_agent(&self, id: AgentId, name: &str) {
        self.per_agent.insert(
            id,
            AgentCounters {
                name: name.to_string(),
                ..AgentCounters::default()
            },
        );
    }

    pub fn record_bytes(&self, id: AgentId, count: usize) {
        self.bytes_received.fetch_add(count as u64, Ordering::Relaxed);
        self.with_agent(id, |counters| counters.bytes_received += count as u64);
    }

    pub fn record_exit(&self) {
        self.exits.fetch_add(1, Ordering::Relaxed);
    }

    /// Count what the referee asked for.
    pub fn record_effect(&self, effect: &Effect) {
        match effect {
            Effect::Release(ids) => {
                self.begins_sent.fetch_add(ids.len() as u64, Ordering::Relaxed);
                for id in ids {
                    self.with_agent(*id, |counters| counters.begins_sent += 1);
                }
            }
            Effect::Send { to, message } => {
                if let Outbound::Opponent { .. } = message {
                    self.opponents_sent.fetch_add(1, Ordering::Relaxed);
                    self.with_agent(*to, |counters| counters.opponents_sent += 1);
                }
            }
            Effect::Display { from, .. } => {
                self.log_lines.fetch_add(1, Ordering::Relaxed);
                self.with_agent(*from, |counters| counters.log_lines += 1);
            }
            Effect::Violation { from, .. } => {
                self.protocol_violations.fetch_add(1, Ordering::Relaxed);
                self.log_lines.fetch_add(1, Ordering::Relaxed);
                self.with_agent(*from, |counters| counters.log_lines += 1);
            }
            Effect::Terminate { id, .. } => {
                self.terminations.fetch_add(1, Ordering::Relaxed);
                self.with_agent(*id, |counters| counters.terminations += 1);
            }
            Effect::Finished(_) => {}
        }
    }

    fn with_agent(&self, id: AgentId, update: impl FnOnce(&mut AgentCounters)) {
        match self.per_agent.get_mut(&id) {
            Some(mut counters) => update(counters.value_mut()),
            None => debug!(agent_id = id, "Counter update for unregistered agent"),
        }
    }

    pub fn report(&self) -> MetricsReport {
        let mut agents: Vec<(AgentId, AgentCounters)> = self
            .per_agent
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        agents.sort_by_key(|(id, _)| *id);

        MetricsReport {
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            log_lines: self.log_lines.load(Ordering::Relaxed),
            protocol_violations: self.protocol_violations.load(Ordering::Relaxed),
            begins_sent: self.begins_sent.load(Ordering::Relaxed),
            opponents_sent: self.opponents_sent.load(Ordering::Relaxed),
            terminations: self.terminations.load(Ordering::Relaxed),
            exits: self.exits.load(Ordering::Relaxed),
            agents,
        }
    }

    pub fn report_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.report())
    }
}
