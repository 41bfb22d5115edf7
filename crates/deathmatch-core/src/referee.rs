//! Match referee
//!
//! The only place agent status changes. Each call to [`Match::apply`] performs
//! the mutation together with its consequences (release broadcast, winner
//! check) and returns the side effects for the caller to carry out in order.

use crate::agent::{AgentId, AgentStatus};
use crate::protocol::Outbound;
use crate::registry::{Match, MatchId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Facts reported to the referee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefereeEvent {
    /// The agent sent `Ready!`.
    Ready(AgentId),
    /// The agent's process or connection is gone.
    Exited(AgentId),
    /// Every configured agent has been launched or has failed to launch.
    LaunchComplete,
    /// The readiness wait ran out.
    ReadyTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminationMode {
    Graceful,
    Forced,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Winner {
    pub id: AgentId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub match_id: MatchId,
    pub winner: Option<Winner>,
    pub launched: usize,
    pub released: bool,
    pub eliminations: usize,
}

/// Work the caller performs after a transition, in the order given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Send `Begin!` to each agent, in this order.
    Release(Vec<AgentId>),
    Send { to: AgentId, message: Outbound },
    /// A non-protocol line to surface for observability.
    Display { from: AgentId, line: String },
    /// A malformed protocol line, surfaced like a log line.
    Violation { from: AgentId, line: String },
    Terminate { id: AgentId, mode: TerminationMode },
    Finished(MatchOutcome),
}

impl<T> Match<T> {
    /// Apply one event. Nothing changes once the match is terminal.
    pub fn apply(&mut self, event: RefereeEvent) -> Vec<Effect> {
        if let RefereeEvent::Exited(id) = event {
            return self.apply_exits(&[id]);
        }
        if self.terminal {
            debug!(?event, "Match already finished, ignoring event");
            return Vec::new();
        }

        match event {
            RefereeEvent::Ready(id) => self.on_ready(id),
            RefereeEvent::LaunchComplete => {
                self.sealed = true;
                info!(
                    launched = self.agents.len(),
                    expected = self.expected(),
                    "Launch complete"
                );
                self.check_gate()
            }
            RefereeEvent::ReadyTimeout => self.on_ready_timeout(),
            RefereeEvent::Exited(_) => Vec::new(),
        }
    }

    /// Apply exits observed together as one transition.
    ///
    /// The winner check runs once, after every listed agent is dead, so two
    /// last agents leaving together end the match with no winner.
    pub fn apply_exits(&mut self, ids: &[AgentId]) -> Vec<Effect> {
        if self.terminal {
            for id in ids {
                drop(self.close_transport(*id));
            }
            return Vec::new();
        }

        let mut changed = false;
        for id in ids {
            changed |= self.mark_exited(*id);
        }
        if !changed {
            return Vec::new();
        }

        if self.released {
            self.check_winner()
        } else {
            self.check_gate()
        }
    }

    fn on_ready(&mut self, id: AgentId) -> Vec<Effect> {
        let Some(agent) = self.get_mut(id) else {
            debug!(agent_id = id, "Ready from unknown agent");
            return Vec::new();
        };
        if agent.status != AgentStatus::Waiting {
            debug!(agent = %agent.name, status = %agent.status, "Duplicate Ready! ignored");
            return Vec::new();
        }

        agent.advance(AgentStatus::Active);
        agent.ready_counted = true;
        info!(agent = %agent.name, agent_id = id, "Agent ready");
        self.alive += 1;

        self.check_gate()
    }

    fn mark_exited(&mut self, id: AgentId) -> bool {
        let released = self.released;
        let Some(agent) = self.get_mut(id) else {
            debug!(agent_id = id, "Exit reported for unknown agent");
            return false;
        };
        drop(agent.close_transport());

        let was = agent.status;
        if !agent.advance(AgentStatus::Dead) {
            return false;
        }

        match (was, released) {
            (AgentStatus::Active, true) => {
                info!(agent = %agent.name, agent_id = id, "Agent eliminated");
                self.alive = self.alive.saturating_sub(1);
                self.eliminations += 1;
            }
            (AgentStatus::Active, false) => {
                agent.excluded = true;
                info!(agent = %agent.name, agent_id = id, "Agent exited before release, excluded");
                self.alive = self.alive.saturating_sub(1);
            }
            _ => {
                agent.excluded = true;
                info!(agent = %agent.name, agent_id = id, "Agent exited while waiting, excluded");
            }
        }
        true
    }

    fn on_ready_timeout(&mut self) -> Vec<Effect> {
        if self.released || !self.sealed {
            return Vec::new();
        }

        let mut effects = Vec::new();
        for agent in self.agents.iter_mut() {
            if agent.status != AgentStatus::Waiting {
                continue;
            }
            agent.advance(AgentStatus::Dead);
            agent.excluded = true;
            info!(agent = %agent.name, agent_id = agent.id, "Never became ready, excluded");
            if agent.has_transport() && !agent.terminate_issued {
                agent.terminate_issued = true;
                effects.push(Effect::Terminate {
                    id: agent.id,
                    mode: TerminationMode::Forced,
                });
            }
        }
        effects.extend(self.check_gate());
        effects
    }

    /// Release everyone once every expected agent is ready.
    fn check_gate(&mut self) -> Vec<Effect> {
        if !self.sealed || self.released || self.terminal {
            return Vec::new();
        }

        let expected = self.expected();
        if expected == 0 {
            info!("No agents left in the population");
            return self.finish(None);
        }
        if self.ready_count() < expected {
            return Vec::new();
        }

        self.released = true;
        let gated: Vec<AgentId> = self
            .agents
            .iter()
            .filter(|agent| agent.is_active())
            .map(|agent| agent.id)
            .collect();
        info!(agents = gated.len(), "All agents ready, unleashing");

        let mut effects = vec![Effect::Release(gated)];
        effects.extend(self.check_winner());
        effects
    }

    fn check_winner(&mut self) -> Vec<Effect> {
        if !self.released || self.terminal {
            return Vec::new();
        }
        match self.alive {
            0 => self.finish(None),
            1 => {
                let winner = self
                    .agents
                    .iter()
                    .find(|agent| agent.is_active())
                    .map(|agent| agent.id);
                self.finish(winner)
            }
            _ => Vec::new(),
        }
    }

    fn finish(&mut self, winner: Option<AgentId>) -> Vec<Effect> {
        self.terminal = true;
        self.winner = winner;

        let mut effects = Vec::new();
        for agent in self.agents.iter_mut() {
            if agent.has_transport() && !agent.terminate_issued {
                agent.terminate_issued = true;
                effects.push(Effect::Terminate {
                    id: agent.id,
                    mode: TerminationMode::Forced,
                });
            }
        }

        let winner = self.winner().map(|agent| Winner {
            id: agent.id,
            name: agent.name.clone(),
        });
        match &winner {
            Some(winner) => info!(winner = %winner.name, "{} wins!", winner.name),
            None => info!("No winner, all agents are dead."),
        }

        effects.push(Effect::Finished(MatchOutcome {
            match_id: self.id,
            winner,
            launched: self.agents.len(),
            released: self.released,
            eliminations: self.eliminations,
        }));
        effects
    }
}
