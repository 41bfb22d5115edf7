//! Protocol handler
//!
//! Turns raw transport bytes into protocol events for one agent and routes
//! sightings back to the agent that made them.

use crate::agent::{AgentId, AgentStatus};
use crate::error::{DeathmatchError, Result};
use crate::protocol::{Inbound, Outbound};
use crate::referee::{Effect, RefereeEvent};
use crate::registry::Match;
use tracing::{debug, info, warn};

impl<T> Match<T> {
    /// Feed bytes read from agent `id`'s transport.
    pub fn receive(&mut self, id: AgentId, chunk: &[u8]) -> Vec<Effect> {
        let Some(agent) = self.get_mut(id) else {
            debug!(agent_id = id, "Output from unknown agent dropped");
            return Vec::new();
        };
        if agent.status == AgentStatus::Dead {
            return Vec::new();
        }

        let lines = agent.inbound.push(chunk);
        let mut effects = Vec::new();
        for line in lines {
            effects.extend(self.handle_line(id, &line));
        }
        effects
    }

    /// The transport reached end of stream: process any unterminated tail.
    pub fn receive_eof(&mut self, id: AgentId) -> Vec<Effect> {
        let Some(agent) = self.get_mut(id) else {
            return Vec::new();
        };
        if agent.status == AgentStatus::Dead {
            return Vec::new();
        }
        match agent.inbound.finish() {
            Some(tail) => self.handle_line(id, &tail),
            None => Vec::new(),
        }
    }

    /// Handle one complete line from agent `id`.
    pub fn handle_line(&mut self, id: AgentId, line: &str) -> Vec<Effect> {
        match Inbound::parse(line) {
            Ok(None) => Vec::new(),
            Ok(Some(Inbound::Ready)) => self.apply(RefereeEvent::Ready(id)),
            Ok(Some(Inbound::Sighting(target))) => self.handle_sighting(id, target),
            Ok(Some(Inbound::Log(line))) => vec![Effect::Display { from: id, line }],
            Err(err) => {
                warn!(agent_id = id, error = %err, "Treating malformed line as log output");
                vec![Effect::Violation {
                    from: id,
                    line: line.trim().to_string(),
                }]
            }
        }
    }

    fn handle_sighting(&mut self, from: AgentId, target: AgentId) -> Vec<Effect> {
        if !self.released || self.terminal {
            debug!(agent_id = from, target, "Sighting outside the running match ignored");
            return Vec::new();
        }
        if !self.get(from).is_some_and(|agent| agent.is_active()) {
            return Vec::new();
        }

        match self.route_sighting(from, target) {
            Ok(message) => {
                if let (Some(hunter), Outbound::Opponent { name, .. }) = (self.name_of(from), &message) {
                    info!(agent = %hunter, target = %name, "{hunter} sighted {name}");
                }
                vec![Effect::Send { to: from, message }]
            }
            Err(err) => {
                debug!(agent_id = from, error = %err, "Sighting dropped");
                Vec::new()
            }
        }
    }

    /// Resolve a `PID:<target>` report from `from` into the reply it gets.
    pub fn route_sighting(&self, from: AgentId, target: AgentId) -> Result<Outbound> {
        self.find_active_target(target, from)
            .map(|agent| Outbound::Opponent {
                id: agent.id(),
                name: agent.name().to_string(),
            })
            .ok_or(DeathmatchError::TargetNotFound { target })
    }
}
