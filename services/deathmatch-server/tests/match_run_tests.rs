//! Whole matches against real child processes
#![cfg(unix)]

use deathmatch_core::{AgentConfig, MatchConfig};
use std::time::Duration;
use tokio::time::timeout;

fn sh_agent(name: &str, script: &str) -> AgentConfig {
    AgentConfig::new(name, vec!["sh".to_string(), "-c".to_string(), script.to_string()])
}

fn roster(agents: Vec<AgentConfig>) -> MatchConfig {
    let mut config = MatchConfig::default();
    config.settings.ready_timeout_ms = 5_000;
    config.settings.shutdown_grace_ms = 2_000;
    config.agents = agents;
    config
}

const STAYS: &str = "echo Activated; echo Ready!; read go; exec sleep 30";
const QUITS: &str = "echo Ready!; read go; echo leaving; exit 0";

#[tokio::test]
async fn test_survivor_wins_and_is_killed() {
    let config = roster(vec![sh_agent("Stayer", STAYS), sh_agent("Quitter", QUITS)]);

    let outcome = timeout(Duration::from_secs(20), deathmatch_server::run(config))
        .await
        .expect("match finished in time")
        .unwrap();

    assert_eq!(outcome.winner.map(|w| w.name), Some("Stayer".to_string()));
    assert_eq!(outcome.launched, 2);
    assert_eq!(outcome.eliminations, 1);
}

#[tokio::test]
async fn test_broken_entry_does_not_stop_the_match() {
    let config = roster(vec![
        sh_agent("Stayer", STAYS),
        AgentConfig::new("Broken", vec!["/nonexistent/deathmatch-agent".to_string()]),
        sh_agent("Quitter", QUITS),
    ]);

    let outcome = timeout(Duration::from_secs(20), deathmatch_server::run(config))
        .await
        .expect("match finished in time")
        .unwrap();

    assert_eq!(outcome.winner.map(|w| w.name), Some("Stayer".to_string()));
    assert_eq!(outcome.launched, 2);
}

#[tokio::test]
async fn test_agent_that_never_readies_is_excluded() {
    let mut config = roster(vec![
        sh_agent("Stayer", STAYS),
        sh_agent("Mute", "exec sleep 30"),
        sh_agent("Quitter", QUITS),
    ]);
    config.settings.ready_timeout_ms = 500;

    let outcome = timeout(Duration::from_secs(20), deathmatch_server::run(config))
        .await
        .expect("match finished in time")
        .unwrap();

    assert_eq!(outcome.winner.map(|w| w.name), Some("Stayer".to_string()));
    assert!(outcome.released);
}
