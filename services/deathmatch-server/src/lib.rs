//! # Deathmatch Server
//!
//! Loads a roster, launches the agents, runs the match and optionally serves
//! the read-only status API while it runs.

pub mod status;

use agent_transport::{event_channel, launch, pauser_for};
use anyhow::Context;
use clap::Parser;
use deathmatch_core::{DeathmatchError, MatchConfig, MatchOutcome};
use match_engine::{shared_snapshot, EngineSettings, Orchestrator};
use match_metrics::MatchMetrics;
use status::StatusState;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug, Clone)]
#[command(name = "deathmatch-server", version, about = "Launch agents and referee a deathmatch")]
pub struct ServerArgs {
    /// Roster file (TOML)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Serve the status API on this address
    #[arg(long)]
    pub status_addr: Option<String>,

    /// Override the readiness timeout
    #[arg(long)]
    pub ready_timeout_ms: Option<u64>,
}

impl ServerArgs {
    pub fn load_config(&self) -> anyhow::Result<MatchConfig> {
        let mut config = MatchConfig::from_file(&self.config)
            .with_context(|| format!("loading roster {}", self.config.display()))?;
        self.apply_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&self, config: &mut MatchConfig) {
        if let Some(addr) = &self.status_addr {
            config.status.addr = Some(addr.clone());
        }
        if let Some(timeout) = self.ready_timeout_ms {
            config.settings.ready_timeout_ms = timeout;
        }
    }
}

/// Run one complete match. Errors are setup failures only.
pub async fn run(config: MatchConfig) -> anyhow::Result<MatchOutcome> {
    let metrics = Arc::new(MatchMetrics::new());
    let snapshot = shared_snapshot();

    let status_server = match &config.status.addr {
        Some(addr) => {
            let state = StatusState {
                snapshot: Arc::clone(&snapshot),
                metrics: Arc::clone(&metrics),
            };
            let (_, handle) = status::serve(addr, state)
                .await
                .with_context(|| format!("binding status API on {addr}"))?;
            Some(handle)
        }
        None => None,
    };

    let (events, rx) = event_channel();
    let launched = launch(&config, &events)
        .await
        .with_context(|| format!("opening coordination endpoint {}", config.settings.endpoint))?;
    drop(events);

    for failure in &launched.failures {
        warn!(error = %failure, "Launch failure");
    }
    if launched.agents.is_empty() {
        return Err(DeathmatchError::NoAgentsLaunched.into());
    }

    let mut orchestrator = Orchestrator::new(
        rx,
        EngineSettings::from_config(&config),
        pauser_for(config.effective_pause()),
    )
    .with_metrics(metrics)
    .with_snapshot(snapshot);
    let admitted = orchestrator.admit(launched);
    info!(admitted, roster = config.agents.len(), "Population launched");

    let outcome = orchestrator.run().await;

    if let Some(handle) = status_server {
        handle.abort();
    }
    Ok(outcome)
}
