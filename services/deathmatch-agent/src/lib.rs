//! # Deathmatch Agent
//!
//! A protocol-conforming agent: announces itself, waits for `Begin!`, then
//! keeps reporting every rival it can see and kills whoever the orchestrator
//! confirms.

pub mod scan;

use deathmatch_core::protocol::{HELLO_PREFIX, PID_PREFIX, READY};
use deathmatch_core::Outbound;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct Hunter {
    pub name: String,
    pub scan_interval: Duration,
    /// Sent as `Hello:<pid>` before anything else when connecting over TCP.
    pub hello: Option<u32>,
}

impl Hunter {
    pub fn new(name: impl Into<String>, scan_interval: Duration) -> Self {
        Self {
            name: name.into(),
            scan_interval,
            hello: None,
        }
    }

    pub fn announcing(mut self, pid: u32) -> Self {
        self.hello = Some(pid);
        self
    }

    /// Speak the protocol over `reader`/`writer` until the orchestrator hangs up.
    ///
    /// `held` is true while the orchestrator has suspended us with a signal.
    /// It pauses scanning the same way `Pause!` does.
    pub async fn play<R, W, S>(
        &self,
        reader: R,
        mut writer: W,
        scanner: S,
        mut held: watch::Receiver<bool>,
    ) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        S: Fn() -> Vec<u32>,
    {
        if let Some(pid) = self.hello {
            send(&mut writer, &format!("{HELLO_PREFIX}{pid}")).await?;
        }
        send(&mut writer, "Activated").await?;
        send(&mut writer, READY).await?;

        let mut lines = reader.lines();
        let mut ticker = interval(self.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut begun = false;
        let mut paused = *held.borrow_and_update();
        let mut signals_open = true;

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        debug!(agent = %self.name, "Orchestrator closed the channel");
                        return Ok(());
                    };
                    match Outbound::parse(&line) {
                        Some(Outbound::Begin) => {
                            info!(agent = %self.name, "Released");
                            begun = true;
                        }
                        Some(Outbound::Opponent { id, name }) => {
                            eliminate(id);
                            send(&mut writer, &format!("Eliminated {name}")).await?;
                        }
                        Some(Outbound::Pause) => paused = self.hold(true),
                        Some(Outbound::Resume) => paused = self.hold(false),
                        None => debug!(agent = %self.name, %line, "Unknown line ignored"),
                    }
                }
                changed = held.changed(), if signals_open => match changed {
                    Ok(()) => {
                        let hold = *held.borrow_and_update();
                        paused = self.hold(hold);
                    }
                    Err(_) => signals_open = false,
                },
                _ = ticker.tick(), if begun && !paused => {
                    for pid in scanner() {
                        send(&mut writer, &format!("{PID_PREFIX}{pid}")).await?;
                    }
                }
            }
        }
    }

    fn hold(&self, paused: bool) -> bool {
        if paused {
            info!(agent = %self.name, "Paused by server");
        } else {
            info!(agent = %self.name, "Resumed by server");
        }
        paused
    }
}

async fn send<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

/// SIGKILL the confirmed opponent. A target that is already gone is fine.
#[cfg(unix)]
pub fn eliminate(pid: u32) {
    let Ok(pid) = i32::try_from(pid) else {
        warn!(pid, "Opponent id is not a process id");
        return;
    };
    if unsafe { libc::kill(pid, libc::SIGKILL) } != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            warn!(pid, error = %err, "Could not kill opponent");
        }
    }
}

#[cfg(not(unix))]
pub fn eliminate(pid: u32) {
    warn!(pid, "Killing opponents is not supported on this platform");
}

/// Logs `Exited` when dropped, however the agent stops.
pub struct ExitNotice {
    name: String,
}

impl ExitNotice {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Drop for ExitNotice {
    fn drop(&mut self) {
        info!(agent = %self.name, "Exited");
    }
}
