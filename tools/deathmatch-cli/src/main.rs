use anyhow::Context;
use clap::{Parser, Subcommand};
use deathmatch_core::{endpoints, AgentSnapshot, MatchConfig, MatchSnapshot};
use serde::Deserialize;
use std::path::PathBuf;

const DEFAULT_URL: &str = "http://127.0.0.1:9090";

#[derive(Parser)]
#[command(name = "deathmatch")]
#[command(about = "Deathmatch CLI - roster validation and match status")]
#[command(version = deathmatch_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a roster file and print its agents
    Roster { config: PathBuf },
    /// Show the running match
    Status {
        #[arg(long, default_value = DEFAULT_URL)]
        url: String,
    },
    /// List the agents of the running match
    Agents {
        #[arg(long, default_value = DEFAULT_URL)]
        url: String,
    },
}

#[derive(Debug, Deserialize)]
struct AgentList {
    agents: Vec<AgentSnapshot>,
    total: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Roster { config } => handle_roster(config),
        Commands::Status { url } => handle_status(&url).await,
        Commands::Agents { url } => handle_agents(&url).await,
    }
}

fn handle_roster(path: PathBuf) -> anyhow::Result<()> {
    let config = MatchConfig::from_file(&path)
        .with_context(|| format!("invalid roster {}", path.display()))?;
    print!("{}", render_roster(&config));
    Ok(())
}

async fn handle_status(url: &str) -> anyhow::Result<()> {
    let snapshot: MatchSnapshot = fetch(url, endpoints::API_V1_MATCH).await?;
    print!("{}", render_status(&snapshot));
    Ok(())
}

async fn handle_agents(url: &str) -> anyhow::Result<()> {
    let list: AgentList = fetch(url, endpoints::API_V1_AGENTS).await?;
    print!("{}", render_agents(&list));
    Ok(())
}

async fn fetch<T: serde::de::DeserializeOwned>(url: &str, path: &str) -> anyhow::Result<T> {
    let target = format!("{}{}", url.trim_end_matches('/'), path);
    let response = reqwest::get(&target)
        .await
        .with_context(|| format!("cannot reach {target}"))?
        .error_for_status()?;
    Ok(response.json().await?)
}

fn render_roster(config: &MatchConfig) -> String {
    let mut out = format!(
        "📋 Roster: {} agents over {:?} transport ({:?} release)\n",
        config.agents.len(),
        config.settings.transport,
        config.release.mode
    );
    for agent in &config.agents {
        let command = if agent.command.is_empty() {
            "(connects)".to_string()
        } else {
            agent.command.join(" ")
        };
        out.push_str(&format!("  {:<16} {}\n", agent.name, command));
    }
    out
}

fn render_status(snapshot: &MatchSnapshot) -> String {
    let mut out = format!(
        "📊 Match {} ({:?})\n  expected {}  ready {}  alive {}  eliminations {}\n",
        snapshot.match_id,
        snapshot.phase,
        snapshot.expected,
        snapshot.ready,
        snapshot.alive,
        snapshot.eliminations
    );
    if let Some(winner) = &snapshot.winner {
        out.push_str(&format!("🏆 {} wins!\n", winner.name));
    }
    out
}

fn render_agents(list: &AgentList) -> String {
    let mut out = format!("🤖 {} agents\n", list.total);
    for agent in &list.agents {
        let note = if agent.excluded { " (excluded)" } else { "" };
        out.push_str(&format!(
            "  {:>8}  {:<16} {}{}\n",
            agent.id, agent.name, agent.status, note
        ));
    }
    out
}
