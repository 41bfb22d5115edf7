use clap::Parser;
use deathmatch_core::BUILD_INFO;
use deathmatch_server::ServerArgs;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = ServerArgs::parse();
    info!("Starting {}", BUILD_INFO);

    let config = args.load_config()?;
    let outcome = deathmatch_server::run(config).await?;

    match &outcome.winner {
        Some(winner) => info!(winner = %winner.name, eliminations = outcome.eliminations, "Match over"),
        None => info!(eliminations = outcome.eliminations, "Match over without a survivor"),
    }
    Ok(())
}
