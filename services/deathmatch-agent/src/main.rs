//! Reference agent executable
//!
//! Launched as `deathmatch-agent <name> <ornament> <endpoint>`. Talks over
//! stdin/stdout unless `--connect` is given, in which case it dials the
//! endpoint. Diagnostics go to stderr.

use anyhow::Context;
use clap::Parser;
use deathmatch_agent::{scan, ExitNotice, Hunter};
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "deathmatch-agent", version, about = "Reference deathmatch agent")]
struct Args {
    name: String,

    #[arg(default_value = "")]
    ornament: String,

    #[arg(default_value = "")]
    endpoint: String,

    /// Dial the endpoint instead of using stdin/stdout
    #[arg(long)]
    connect: bool,

    #[arg(long, default_value_t = 1000)]
    scan_interval_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let _exit = ExitNotice::new(&args.name);
    let own_pid = std::process::id();
    info!(agent = %args.name, pid = own_pid, "Agent starting");

    // Handlers must be in place before `Ready!` goes out.
    let (held_tx, held) = watch::channel(false);
    forward_job_control(held_tx)?;

    let needle = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.file_name().map(|name| name.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "deathmatch-agent".to_string());
    let scanner = move || scan::rivals(&needle, own_pid);

    let hunter = Hunter::new(&args.name, Duration::from_millis(args.scan_interval_ms));
    let play = async {
        if args.connect {
            let stream = TcpStream::connect(&args.endpoint)
                .await
                .with_context(|| format!("connecting to {}", args.endpoint))?;
            let (reader, writer) = stream.into_split();
            hunter
                .announcing(own_pid)
                .play(BufReader::new(reader), writer, scanner, held)
                .await
        } else {
            hunter
                .play(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), scanner, held)
                .await
        }
    };

    tokio::select! {
        result = play => result,
        _ = tokio::signal::ctrl_c() => Ok(()),
        _ = terminated() => Ok(()),
    }
}

#[cfg(unix)]
async fn terminated() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(_) => std::future::pending().await,
    }
}

#[cfg(not(unix))]
async fn terminated() {
    std::future::pending().await
}

/// SIGTSTP holds the hunter and SIGCONT releases it. The process itself
/// never stops.
#[cfg(unix)]
fn forward_job_control(held: watch::Sender<bool>) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut stop = signal(SignalKind::from_raw(libc::SIGTSTP)).context("installing SIGTSTP handler")?;
    let mut cont = signal(SignalKind::from_raw(libc::SIGCONT)).context("installing SIGCONT handler")?;

    tokio::spawn(async move {
        loop {
            // A stop and a continue pending together arrived in that order.
            let hold = tokio::select! {
                biased;
                Some(()) = stop.recv() => true,
                Some(()) = cont.recv() => false,
                else => break,
            };
            if held.send(hold).is_err() {
                break;
            }
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn forward_job_control(_held: watch::Sender<bool>) -> anyhow::Result<()> {
    Ok(())
}
