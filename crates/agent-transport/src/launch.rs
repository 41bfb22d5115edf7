//! Bringing up the whole roster

use crate::event::EventSender;
use crate::link::AgentLink;
use crate::process::ProcessLauncher;
use crate::socket::SocketAcceptor;
use deathmatch_core::{AgentConfig, DeathmatchError, MatchConfig, Result, TransportKind};
use std::net::SocketAddr;
use tokio::time::{timeout_at, Instant};
use tracing::{info, warn};

/// A roster entry that made it to a live transport.
#[derive(Debug)]
pub struct LaunchedAgent {
    pub name: String,
    pub ornament: String,
    pub link: AgentLink,
}

#[derive(Debug, Default)]
pub struct Launched {
    pub agents: Vec<LaunchedAgent>,
    /// One launch error per roster entry that never came up.
    pub failures: Vec<DeathmatchError>,
    pub local_addr: Option<SocketAddr>,
}

impl Launched {
    fn admit(&mut self, entry: &AgentConfig, link: AgentLink) {
        self.agents.push(LaunchedAgent {
            name: entry.name.clone(),
            ornament: entry.ornament.clone(),
            link,
        });
    }
}

/// Launch every roster entry. Individual failures are collected, not fatal;
/// only a socket endpoint that cannot be bound aborts the launch.
pub async fn launch(config: &MatchConfig, events: &EventSender) -> Result<Launched> {
    let launched = match config.settings.transport {
        TransportKind::Pipe => launch_processes(config, events),
        TransportKind::Socket => accept_connections(config, events).await?,
    };

    info!(
        launched = launched.agents.len(),
        failed = launched.failures.len(),
        "Launch complete"
    );
    Ok(launched)
}

fn launch_processes(config: &MatchConfig, events: &EventSender) -> Launched {
    let launcher = ProcessLauncher::new(events.clone(), &config.settings.endpoint);
    let mut launched = Launched::default();

    for entry in &config.agents {
        match launcher.spawn(entry) {
            Ok(link) => launched.admit(entry, link),
            Err(err) => {
                warn!(agent = %entry.name, error = %err, "Agent failed to launch");
                launched.failures.push(err);
            }
        }
    }
    launched
}

/// The i-th accepted connection takes the i-th roster name.
async fn accept_connections(config: &MatchConfig, events: &EventSender) -> Result<Launched> {
    let mut acceptor = SocketAcceptor::bind(&config.settings.endpoint, events.clone()).await?;
    let mut launched = Launched {
        local_addr: Some(acceptor.local_addr()?),
        ..Launched::default()
    };
    let deadline = Instant::now() + config.settings.launch_timeout();

    let mut roster = config.agents.iter();
    for entry in roster.by_ref() {
        match timeout_at(deadline, acceptor.accept()).await {
            Ok(Ok(link)) => {
                info!(agent = %entry.name, agent_id = link.id(), "Connection assigned");
                launched.admit(entry, link);
            }
            Ok(Err(err)) => {
                warn!(agent = %entry.name, error = %err, "Accept failed");
                launched.failures.push(DeathmatchError::Launch {
                    agent: entry.name.clone(),
                    reason: err.to_string(),
                });
            }
            Err(_) => {
                launched.failures.push(no_connection(entry));
                break;
            }
        }
    }
    for entry in roster {
        launched.failures.push(no_connection(entry));
    }
    if !launched.failures.is_empty() {
        warn!(missing = launched.failures.len(), "Not every agent connected");
    }
    Ok(launched)
}

fn no_connection(entry: &AgentConfig) -> DeathmatchError {
    DeathmatchError::Launch {
        agent: entry.name.clone(),
        reason: "no connection before launch timeout".to_string(),
    }
}
