//! Roster and match settings loaded from TOML

use crate::agent::AgentConfig;
use crate::error::{DeathmatchError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    #[serde(rename = "match")]
    pub settings: MatchSettings,
    pub release: ReleaseConfig,
    pub status: StatusConfig,
    pub agents: Vec<AgentConfig>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Spawn each agent with piped stdin/stdout.
    #[default]
    Pipe,
    /// Accept one TCP connection per roster entry.
    Socket,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchSettings {
    pub transport: TransportKind,
    /// Passed to every spawned agent; bind address for socket transport.
    pub endpoint: String,
    pub ready_timeout_ms: u64,
    pub launch_timeout_ms: u64,
    pub shutdown_grace_ms: u64,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            transport: TransportKind::Pipe,
            endpoint: "127.0.0.1:8080".to_string(),
            ready_timeout_ms: 10_000,
            launch_timeout_ms: 10_000,
            shutdown_grace_ms: 2_000,
        }
    }
}

impl MatchSettings {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn launch_timeout(&self) -> Duration {
        Duration::from_millis(self.launch_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseMode {
    /// `Begin!` to everyone at once.
    #[default]
    Broadcast,
    /// Pause all, send `Begin!`, resume one by one.
    Staggered,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PauseMethod {
    /// SIGTSTP / SIGCONT to the agent process.
    #[default]
    Signal,
    /// `Pause!` / `Resume!` protocol lines.
    Message,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseConfig {
    pub mode: ReleaseMode,
    pub stagger_ms: u64,
    pub pause: PauseMethod,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            mode: ReleaseMode::Broadcast,
            stagger_ms: 500,
            pause: PauseMethod::Signal,
        }
    }
}

impl ReleaseConfig {
    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Serve the read-only status API here when set.
    pub addr: Option<String>,
}

impl MatchConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: MatchConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.agents.is_empty() {
            return Err(invalid("roster has no agents"));
        }

        let mut names = HashSet::new();
        for agent in &self.agents {
            if agent.name.trim().is_empty() {
                return Err(invalid("agent name must not be empty"));
            }
            if !names.insert(agent.name.as_str()) {
                return Err(invalid(format!("duplicate agent name '{}'", agent.name)));
            }
            if self.settings.transport == TransportKind::Pipe && agent.command.is_empty() {
                return Err(invalid(format!(
                    "agent '{}' needs a command for pipe transport",
                    agent.name
                )));
            }
        }

        if self.release.mode == ReleaseMode::Staggered && self.release.stagger_ms == 0 {
            return Err(invalid("stagger_ms must be positive for staggered release"));
        }
        Ok(())
    }

    /// Socket agents can only be paused over the protocol.
    pub fn effective_pause(&self) -> PauseMethod {
        match self.settings.transport {
            TransportKind::Socket => PauseMethod::Message,
            TransportKind::Pipe => self.release.pause,
        }
    }
}

fn invalid(reason: impl Into<String>) -> DeathmatchError {
    DeathmatchError::InvalidConfig {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROSTER: &str = r#"
[match]
ready_timeout_ms = 2500

[release]
mode = "staggered"
stagger_ms = 250

[[agents]]
name = "NodeAlpha"
ornament = "\u001b[32m"
command = ["node", "deathmatch.ts"]

[[agents]]
name = "BunAlpha"
command = ["bun", "deathmatch.ts"]
"#;

    #[test]
    fn test_parse_roster_with_defaults() {
        let config = MatchConfig::from_toml_str(ROSTER).unwrap();
        assert_eq!(config.agents.len(), 2);
        assert_eq!(config.agents[0].ornament, "\u{1b}[32m");
        assert_eq!(config.agents[1].ornament, "");
        assert_eq!(config.settings.ready_timeout(), Duration::from_millis(2500));
        assert_eq!(config.settings.transport, TransportKind::Pipe);
        assert_eq!(config.settings.shutdown_grace_ms, 2_000);
        assert_eq!(config.release.mode, ReleaseMode::Staggered);
        assert_eq!(config.effective_pause(), PauseMethod::Signal);
        assert!(config.status.addr.is_none());
    }

    #[test]
    fn test_rejects_empty_roster() {
        let err = MatchConfig::from_toml_str("[match]\n").unwrap_err();
        assert!(err.to_string().contains("no agents"));
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let toml = r#"
[[agents]]
name = "C"
command = ["./c"]
[[agents]]
name = "C"
command = ["./c"]
"#;
        let err = MatchConfig::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("duplicate agent name 'C'"));
    }

    #[test]
    fn test_socket_roster_needs_no_commands() {
        let toml = r#"
[match]
transport = "socket"
endpoint = "127.0.0.1:0"

[[agents]]
name = "Perl"

[[agents]]
name = "Java"
"#;
        let config = MatchConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.settings.transport, TransportKind::Socket);
        assert_eq!(config.effective_pause(), PauseMethod::Message);
    }

    #[test]
    fn test_pipe_roster_needs_commands() {
        let toml = "[[agents]]\nname = \"Rust\"\n";
        assert!(matches!(
            MatchConfig::from_toml_str(toml),
            Err(DeathmatchError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_malformed_toml_is_reported() {
        assert!(matches!(
            MatchConfig::from_toml_str("[[agents]\nname ="),
            Err(DeathmatchError::Toml { .. })
        ));
    }
}
