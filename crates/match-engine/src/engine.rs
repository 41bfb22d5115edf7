//! The match event loop
//!
//! Every transport event arrives on one channel and is applied here, one at a
//! time, so registry mutations never race. Timers (readiness deadline and
//! staggered resumes) are folded into the same loop.

use crate::release::ResumeSchedule;
use crate::{shared_snapshot, SharedSnapshot};
use agent_transport::{AgentEvent, AgentLink, EventReceiver, Launched, Pauser};
use deathmatch_core::{
    Agent, AgentId, AgentStatus, Effect, Match, MatchConfig, MatchOutcome, Outbound,
    RefereeEvent, ReleaseMode, Result, Winner,
};
use match_metrics::MatchMetrics;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub ready_timeout: Duration,
    pub shutdown_grace: Duration,
    pub release: ReleaseMode,
    pub stagger: Duration,
}

impl EngineSettings {
    pub fn from_config(config: &MatchConfig) -> Self {
        Self {
            ready_timeout: config.settings.ready_timeout(),
            shutdown_grace: config.settings.shutdown_grace(),
            release: config.release.mode,
            stagger: config.release.stagger(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&MatchConfig::default())
    }
}

pub struct Orchestrator {
    state: Match<AgentLink>,
    events: EventReceiver,
    backlog: VecDeque<AgentEvent>,
    settings: EngineSettings,
    pauser: Box<dyn Pauser>,
    resumes: ResumeSchedule,
    metrics: Arc<MatchMetrics>,
    snapshot: SharedSnapshot,
    outcome: Option<MatchOutcome>,
}

impl Orchestrator {
    pub fn new(events: EventReceiver, settings: EngineSettings, pauser: Box<dyn Pauser>) -> Self {
        let resumes = ResumeSchedule::new(settings.stagger);
        Self {
            state: Match::new(),
            events,
            backlog: VecDeque::new(),
            settings,
            pauser,
            resumes,
            metrics: Arc::new(MatchMetrics::new()),
            snapshot: shared_snapshot(),
            outcome: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MatchMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_snapshot(mut self, snapshot: SharedSnapshot) -> Self {
        self.snapshot = snapshot;
        self.publish();
        self
    }

    pub fn metrics(&self) -> Arc<MatchMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn snapshot(&self) -> SharedSnapshot {
        Arc::clone(&self.snapshot)
    }

    pub fn register(&mut self, name: &str, ornament: &str, link: AgentLink) -> Result<AgentId> {
        let id = link.id();
        self.state.register(Agent::new(id, name, ornament, link))?;
        self.metrics.register_agent(id, name);
        Ok(id)
    }

    /// Register everything the launcher brought up. Returns how many joined.
    pub fn admit(&mut self, launched: Launched) -> usize {
        let mut admitted = 0;
        for agent in launched.agents {
            let id = agent.link.id();
            match self.register(&agent.name, &agent.ornament, agent.link) {
                Ok(_) => admitted += 1,
                Err(err) => warn!(agent = %agent.name, agent_id = id, error = %err, "Agent not admitted"),
            }
        }
        self.publish();
        admitted
    }

    /// Seal the population and run until a winner is decided or everyone is dead.
    pub async fn run(mut self) -> MatchOutcome {
        info!(
            match_id = %self.state.id(),
            agents = self.state.agents().len(),
            release = ?self.settings.release,
            "Match starting"
        );
        let effects = self.state.apply(RefereeEvent::LaunchComplete);
        self.execute(effects);
        self.publish();

        let ready_deadline = Instant::now() + self.settings.ready_timeout;
        let mut ready_timer_armed = true;

        while self.outcome.is_none() {
            if let Some(event) = self.backlog.pop_front() {
                self.dispatch(event);
                self.publish();
                continue;
            }

            let resume_at = self.resumes.due_at();
            let gathering = ready_timer_armed && !self.state.is_released();
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => self.transports_gone(),
                },
                _ = sleep_until(ready_deadline), if gathering => {
                    ready_timer_armed = false;
                    warn!(
                        ready = self.state.ready_count(),
                        expected = self.state.expected(),
                        "Readiness timeout expired"
                    );
                    let effects = self.state.apply(RefereeEvent::ReadyTimeout);
                    self.execute(effects);
                }
                _ = sleep_until(resume_at.unwrap_or(ready_deadline)), if resume_at.is_some() => {
                    self.resume_due();
                }
            }
            self.publish();
        }

        self.resumes.clear();
        self.drain().await;
        self.publish();

        let outcome = match self.outcome.take() {
            Some(outcome) => outcome,
            None => self.current_outcome(),
        };
        if let Ok(report) = self.metrics.report_json() {
            debug!(%report, "Match metrics");
        }
        outcome
    }

    fn dispatch(&mut self, event: AgentEvent) {
        match event {
            AgentEvent::Output { id, bytes } => {
                self.metrics.record_bytes(id, bytes.len());
                let effects = self.state.receive(id, &bytes);
                self.execute(effects);
            }
            AgentEvent::Closed { id } => {
                let effects = self.state.receive_eof(id);
                self.execute(effects);
            }
            AgentEvent::Exited { id, detail } => {
                let mut exited = vec![(id, detail)];
                // Exits already queued behind this one count as simultaneous.
                while let Ok(next) = self.events.try_recv() {
                    match next {
                        AgentEvent::Exited { id, detail } => exited.push((id, detail)),
                        other => self.backlog.push_back(other),
                    }
                }

                let ids: Vec<AgentId> = exited.iter().map(|(id, _)| *id).collect();
                for (id, detail) in &exited {
                    self.metrics.record_exit();
                    let name = self.state.name_of(*id).unwrap_or("unknown");
                    info!(agent = %name, agent_id = id, %detail, "Agent exited");
                }
                let effects = self.state.apply_exits(&ids);
                self.execute(effects);
            }
        }
    }

    fn execute(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            self.metrics.record_effect(&effect);
            match effect {
                Effect::Release(ids) => self.release(ids),
                Effect::Send { to, message } => {
                    if let Some(link) = self.link(to) {
                        link.send(message);
                    }
                }
                Effect::Display { from, line } | Effect::Violation { from, line } => {
                    let name = self.state.name_of(from).unwrap_or("unknown");
                    info!(target: "deathmatch::agent", agent = %name, agent_id = from, "{line}");
                }
                Effect::Terminate { id, mode } => match self.link(id) {
                    Some(link) => {
                        debug!(agent_id = id, ?mode, "Terminating agent");
                        link.terminate(mode);
                    }
                    None => debug!(agent_id = id, "Agent already gone"),
                },
                Effect::Finished(outcome) => self.outcome = Some(outcome),
            }
        }
    }

    fn link(&self, id: AgentId) -> Option<&AgentLink> {
        self.state.get(id).and_then(Agent::transport)
    }

    fn release(&mut self, ids: Vec<AgentId>) {
        match self.settings.release {
            ReleaseMode::Broadcast => {
                for id in &ids {
                    if let Some(link) = self.link(*id) {
                        link.send(Outbound::Begin);
                    }
                }
            }
            ReleaseMode::Staggered => {
                for id in &ids {
                    if let Some(link) = self.link(*id) {
                        if !self.pauser.pause(link) {
                            warn!(agent_id = id, "Could not pause agent before release");
                        }
                    }
                }
                for id in &ids {
                    if let Some(link) = self.link(*id) {
                        link.send(Outbound::Begin);
                    }
                }
                info!(
                    agents = ids.len(),
                    stagger_ms = self.settings.stagger.as_millis() as u64,
                    "Staggered release"
                );
                self.resumes.start(ids, Instant::now());
            }
        }
    }

    fn resume_due(&mut self) {
        let Some(id) = self.resumes.pop_due(Instant::now()) else {
            return;
        };
        let Some(link) = self.state.get(id).filter(|agent| agent.is_active()).and_then(Agent::transport) else {
            return;
        };
        if self.pauser.resume(link) {
            debug!(agent_id = id, "Agent resumed");
        }
    }

    /// Every sender is gone, so no further exits can be observed.
    fn transports_gone(&mut self) {
        warn!("All agent transports closed");
        let remaining: Vec<AgentId> = self
            .state
            .agents()
            .iter()
            .filter(|agent| agent.status() != AgentStatus::Dead)
            .map(Agent::id)
            .collect();
        let effects = self.state.apply_exits(&remaining);
        self.execute(effects);
        if self.outcome.is_none() {
            self.outcome = Some(self.current_outcome());
        }
    }

    /// Wait for terminated agents to be reaped, up to the shutdown grace.
    async fn drain(&mut self) {
        let deadline = Instant::now() + self.settings.shutdown_grace;
        while self.state.with_transport().next().is_some() {
            let event = match self.backlog.pop_front() {
                Some(event) => Some(event),
                None => match timeout_at(deadline, self.events.recv()).await {
                    Ok(event) => event,
                    Err(_) => {
                        let stuck = self.state.with_transport().count();
                        warn!(agents = stuck, "Agents still running after shutdown grace");
                        break;
                    }
                },
            };
            match event {
                Some(AgentEvent::Exited { id, .. }) => {
                    self.metrics.record_exit();
                    self.state.apply_exits(&[id]);
                }
                Some(_) => {}
                None => break,
            }
        }
    }

    fn current_outcome(&self) -> MatchOutcome {
        MatchOutcome {
            match_id: self.state.id(),
            winner: self.state.winner().map(|agent| Winner {
                id: agent.id(),
                name: agent.name().to_string(),
            }),
            launched: self.state.agents().len(),
            released: self.state.is_released(),
            eliminations: self.state.eliminations(),
        }
    }

    fn publish(&self) {
        *self.snapshot.write() = self.state.snapshot();
    }
}
