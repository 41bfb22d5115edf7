//! Agent registry and match state

use crate::agent::{Agent, AgentId, AgentStatus};
use crate::error::{DeathmatchError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type MatchId = Uuid;

/// The whole-population session.
///
/// Owns every [`Agent`] record in launch order. Status only changes through
/// [`Match::apply`](crate::referee) and the protocol handler, both of which
/// run on the caller's single thread of control.
#[derive(Debug)]
pub struct Match<T> {
    pub(crate) id: MatchId,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) agents: Vec<Agent<T>>,
    pub(crate) sealed: bool,
    pub(crate) released: bool,
    pub(crate) alive: usize,
    pub(crate) terminal: bool,
    pub(crate) winner: Option<AgentId>,
    pub(crate) eliminations: usize,
}

impl<T> Match<T> {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            agents: Vec::new(),
            sealed: false,
            released: false,
            alive: 0,
            terminal: false,
            winner: None,
            eliminations: 0,
        }
    }

    /// Add a freshly launched agent. Only valid until launch completes.
    pub fn register(&mut self, agent: Agent<T>) -> Result<()> {
        if self.sealed {
            return Err(DeathmatchError::Launch {
                agent: agent.name,
                reason: "launch already complete".to_string(),
            });
        }
        if self.get(agent.id).is_some() {
            return Err(DeathmatchError::DuplicateAgent { agent_id: agent.id });
        }
        self.agents.push(agent);
        Ok(())
    }

    pub fn id(&self) -> MatchId {
        self.id
    }

    pub fn agents(&self) -> &[Agent<T>] {
        &self.agents
    }

    pub fn get(&self, id: AgentId) -> Option<&Agent<T>> {
        self.agents.iter().find(|agent| agent.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: AgentId) -> Option<&mut Agent<T>> {
        self.agents.iter_mut().find(|agent| agent.id == id)
    }

    pub fn name_of(&self, id: AgentId) -> Option<&str> {
        self.get(id).map(Agent::name)
    }

    /// Population size the readiness gate waits for.
    pub fn expected(&self) -> usize {
        self.agents.iter().filter(|agent| !agent.excluded).count()
    }

    pub fn ready_count(&self) -> usize {
        self.agents
            .iter()
            .filter(|agent| agent.ready_counted && !agent.excluded)
            .count()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Agents that reached `active` and have not died since.
    pub fn alive_count(&self) -> usize {
        self.alive
    }

    /// Recompute the alive counter from the records.
    pub fn recount_alive(&self) -> usize {
        self.agents
            .iter()
            .filter(|agent| agent.ever_active && agent.status == AgentStatus::Active)
            .count()
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn winner(&self) -> Option<&Agent<T>> {
        self.winner.and_then(|id| self.get(id))
    }

    pub fn eliminations(&self) -> usize {
        self.eliminations
    }

    /// Look up an active agent by id, never the requester itself.
    pub fn find_active_target(&self, target: AgentId, requester: AgentId) -> Option<&Agent<T>> {
        if target == requester {
            return None;
        }
        self.get(target).filter(|agent| agent.is_active())
    }

    /// Agents whose transport has not been closed yet.
    pub fn with_transport(&self) -> impl Iterator<Item = &Agent<T>> {
        self.agents.iter().filter(|agent| agent.has_transport())
    }

    /// Close an agent's transport. `None` when it was already closed.
    pub fn close_transport(&mut self, id: AgentId) -> Option<T> {
        self.get_mut(id).and_then(Agent::close_transport)
    }

    pub fn phase(&self) -> MatchPhase {
        if self.terminal {
            MatchPhase::Finished
        } else if self.released {
            MatchPhase::Running
        } else if self.sealed {
            MatchPhase::Gathering
        } else {
            MatchPhase::Launching
        }
    }

    pub fn snapshot(&self) -> MatchSnapshot {
        MatchSnapshot {
            match_id: self.id,
            started_at: self.started_at,
            phase: self.phase(),
            expected: self.expected(),
            ready: self.ready_count(),
            alive: self.alive,
            eliminations: self.eliminations,
            winner: self.winner().map(AgentSnapshot::from_agent),
            agents: self.agents.iter().map(AgentSnapshot::from_agent).collect(),
        }
    }
}

impl<T> Default for Match<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPhase {
    Launching,
    Gathering,
    Running,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: AgentId,
    pub name: String,
    pub status: AgentStatus,
    pub excluded: bool,
}

impl AgentSnapshot {
    fn from_agent<T>(agent: &Agent<T>) -> Self {
        Self {
            id: agent.id,
            name: agent.name.clone(),
            status: agent.status,
            excluded: agent.excluded,
        }
    }
}

/// Read-only view of a match for status reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub match_id: MatchId,
    pub started_at: DateTime<Utc>,
    pub phase: MatchPhase,
    pub expected: usize,
    pub ready: usize,
    pub alive: usize,
    pub eliminations: usize,
    pub winner: Option<AgentSnapshot>,
    pub agents: Vec<AgentSnapshot>,
}

impl MatchSnapshot {
    /// Snapshot of a match that has not launched anything yet.
    pub fn empty() -> Self {
        Match::<()>::new().snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_rejects_duplicate_ids() {
        let mut state = Match::new();
        state.register(Agent::new(10, "NodeAlpha", "", ())).unwrap();
        let err = state
            .register(Agent::new(10, "NodeBeta", "", ()))
            .unwrap_err();
        assert!(matches!(err, DeathmatchError::DuplicateAgent { agent_id: 10 }));
        assert_eq!(state.agents().len(), 1);
    }

    #[test]
    fn test_register_after_seal_fails() {
        let mut state = Match::new();
        state.sealed = true;
        assert!(state.register(Agent::new(1, "late", "", ())).is_err());
    }

    #[test]
    fn test_find_active_target_skips_self_and_waiting() {
        let mut state = Match::new();
        state.register(Agent::new(1, "A", "", ())).unwrap();
        state.register(Agent::new(2, "B", "", ())).unwrap();
        assert!(state.find_active_target(2, 1).is_none());

        state.get_mut(2).unwrap().advance(AgentStatus::Active);
        state.get_mut(1).unwrap().advance(AgentStatus::Active);
        assert_eq!(state.find_active_target(2, 1).unwrap().name(), "B");
        assert!(state.find_active_target(1, 1).is_none());
        assert!(state.find_active_target(99, 1).is_none());
    }

    #[test]
    fn test_snapshot_lists_agents_in_launch_order() {
        let mut state = Match::new();
        for (id, name) in [(30, "C"), (10, "A"), (20, "B")] {
            state.register(Agent::new(id, name, "", ())).unwrap();
        }
        let snapshot = state.snapshot();
        let names: Vec<_> = snapshot.agents.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["C", "A", "B"]);
        assert_eq!(snapshot.phase, MatchPhase::Launching);
        assert_eq!(snapshot.expected, 3);
        assert!(snapshot.winner.is_none());
    }
}
