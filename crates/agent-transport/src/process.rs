//! Piped agent processes
//!
//! Each agent is spawned as `command... <name> <ornament> <endpoint>` with
//! stdin/stdout piped and stderr inherited. Three tasks serve it: a writer
//! on stdin, a reader on stdout and a supervisor that owns the child, waits
//! for it and carries out signal requests.

use crate::event::{AgentEvent, EventSender};
use crate::io::{drain_outgoing, pump_output, ReadEnd};
use crate::link::{AgentLink, Control, LinkKind};
use deathmatch_core::{AgentConfig, AgentId, DeathmatchError, Result, TerminationMode};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub struct ProcessLauncher {
    events: EventSender,
    endpoint: String,
}

impl ProcessLauncher {
    pub fn new(events: EventSender, endpoint: impl Into<String>) -> Self {
        Self {
            events,
            endpoint: endpoint.into(),
        }
    }

    /// Spawn one roster entry. The returned link's id is the process id.
    pub fn spawn(&self, agent: &AgentConfig) -> Result<AgentLink> {
        let launch_error = |reason: String| DeathmatchError::Launch {
            agent: agent.name.clone(),
            reason,
        };

        let (program, args) = agent
            .command
            .split_first()
            .ok_or_else(|| launch_error("empty command".to_string()))?;

        let mut child = Command::new(program)
            .args(args)
            .arg(&agent.name)
            .arg(&agent.ornament)
            .arg(&self.endpoint)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| launch_error(err.to_string()))?;

        let pid = child
            .id()
            .ok_or_else(|| launch_error("process exited before it could be tracked".to_string()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| launch_error("stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| launch_error("stdout not captured".to_string()))?;

        let (link, endpoints) = AgentLink::detached(pid, LinkKind::Process { pid });
        let (kill_tx, kill_rx) = mpsc::unbounded_channel();

        tokio::spawn(drain_outgoing(pid, stdin, endpoints.outbound));

        let events = self.events.clone();
        tokio::spawn(async move {
            if let ReadEnd::Failed(err) = pump_output(pid, stdout, &events).await {
                warn!(agent_id = pid, error = %err, "Agent stdout failed");
                let _ = kill_tx.send(());
            }
        });

        tokio::spawn(supervise(pid, child, endpoints.control, kill_rx, self.events.clone()));

        info!(agent = %agent.name, pid, "Launched agent process");
        Ok(link)
    }
}

/// Own the child until it exits, then report `Exited` exactly once.
async fn supervise(
    id: AgentId,
    mut child: Child,
    mut control: mpsc::UnboundedReceiver<Control>,
    mut read_failed: mpsc::UnboundedReceiver<()>,
    events: EventSender,
) {
    let mut control_open = true;
    let mut reader_open = true;

    let detail = loop {
        tokio::select! {
            status = child.wait() => {
                break match status {
                    Ok(status) => status.to_string(),
                    Err(err) => format!("wait failed: {err}"),
                };
            }
            request = control.recv(), if control_open => match request {
                Some(Control::Terminate(TerminationMode::Forced)) => {
                    if let Err(err) = child.start_kill() {
                        debug!(agent_id = id, error = %err, "Kill of exiting process ignored");
                    }
                }
                Some(Control::Terminate(TerminationMode::Graceful)) => deliver(id, Signal::Terminate),
                Some(Control::Suspend) => deliver(id, Signal::Suspend),
                Some(Control::Continue) => deliver(id, Signal::Continue),
                None => control_open = false,
            },
            failed = read_failed.recv(), if reader_open => {
                reader_open = false;
                if failed.is_some() {
                    warn!(agent_id = id, "Killing agent after transport failure");
                    let _ = child.start_kill();
                }
            }
        }
    };

    info!(agent_id = id, status = %detail, "Agent process exited");
    let _ = events.send(AgentEvent::Exited { id, detail });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Terminate,
    Suspend,
    Continue,
}

fn deliver(id: AgentId, signal: Signal) {
    if let Err(err) = send_signal(id, signal) {
        warn!(agent_id = id, error = %err, "Signal delivery failed");
    }
}

/// Signal a process by id. A process that no longer exists is not an error.
#[cfg(unix)]
pub fn send_signal(pid: u32, signal: Signal) -> Result<()> {
    let raw = match signal {
        Signal::Terminate => libc::SIGTERM,
        Signal::Suspend => libc::SIGTSTP,
        Signal::Continue => libc::SIGCONT,
    };
    let pid = i32::try_from(pid).map_err(|_| DeathmatchError::Termination {
        agent_id: pid,
        reason: "process id out of range".to_string(),
    })?;

    if unsafe { libc::kill(pid, raw) } != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Ok(());
        }
        return Err(DeathmatchError::Termination {
            agent_id: pid as AgentId,
            reason: err.to_string(),
        });
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn send_signal(pid: u32, signal: Signal) -> Result<()> {
    Err(DeathmatchError::Termination {
        agent_id: pid,
        reason: format!("{signal:?} is not supported on this platform"),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::event::{event_channel, EventReceiver};
    use deathmatch_core::Outbound;
    use std::time::Duration;
    use tokio::time::timeout;

    fn sh(name: &str, script: &str) -> AgentConfig {
        AgentConfig::new(name, vec!["sh".to_string(), "-c".to_string(), script.to_string()])
    }

    async fn next_event(rx: &mut EventReceiver) -> AgentEvent {
        timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("agent event in time")
            .expect("event channel open")
    }

    #[tokio::test]
    async fn test_agent_receives_roster_arguments() {
        let (events, mut rx) = event_channel();
        let launcher = ProcessLauncher::new(events, "127.0.0.1:9999");
        // sh -c puts the first trailing argument in $0.
        let link = launcher
            .spawn(&sh("Zig", "echo \"$0|$1|$2\""))
            .unwrap();

        let mut output = Vec::new();
        let (mut closed, mut exited) = (false, false);
        while !(closed && exited) {
            let event = next_event(&mut rx).await;
            assert_eq!(event.agent_id(), link.id());
            match event {
                AgentEvent::Output { bytes, .. } => output.extend(bytes),
                AgentEvent::Closed { .. } => closed = true,
                AgentEvent::Exited { .. } => exited = true,
            }
        }
        assert_eq!(String::from_utf8(output).unwrap(), "Zig||127.0.0.1:9999\n");
    }

    #[tokio::test]
    async fn test_ready_then_begin_round_trip() {
        let (events, mut rx) = event_channel();
        let launcher = ProcessLauncher::new(events, "unused");
        let link = launcher
            .spawn(&sh("Ruby", "echo Ready!; read cmd; echo \"got:$cmd\""))
            .unwrap();

        let mut output = String::new();
        let mut begun = false;
        let (mut closed, mut exited) = (false, false);
        while !(closed && exited) {
            match next_event(&mut rx).await {
                AgentEvent::Output { bytes, .. } => {
                    output.push_str(&String::from_utf8_lossy(&bytes));
                    if !begun && output.contains("Ready!\n") {
                        assert!(link.send(Outbound::Begin));
                        begun = true;
                    }
                }
                AgentEvent::Closed { .. } => closed = true,
                AgentEvent::Exited { .. } => exited = true,
            }
        }
        assert_eq!(output, "Ready!\ngot:Begin!\n");
    }

    #[tokio::test]
    async fn test_forced_termination_reports_exit_once() {
        let (events, mut rx) = event_channel();
        let launcher = ProcessLauncher::new(events, "unused");
        let link = launcher.spawn(&sh("Sleepy", "exec sleep 30")).unwrap();

        link.terminate(TerminationMode::Forced);
        link.terminate(TerminationMode::Forced);

        while !matches!(next_event(&mut rx).await, AgentEvent::Exited { .. }) {}

        link.terminate(TerminationMode::Forced);
        drop(launcher);
        drop(link);
        while let Some(event) = timeout(Duration::from_secs(5), rx.recv()).await.unwrap() {
            assert!(!matches!(event, AgentEvent::Exited { .. }));
        }
    }

    #[tokio::test]
    async fn test_missing_executable_is_a_launch_error() {
        let (events, _rx) = event_channel();
        let launcher = ProcessLauncher::new(events, "unused");
        let agent = AgentConfig::new("Ghost", vec!["/nonexistent/deathmatch-agent".to_string()]);

        match launcher.spawn(&agent) {
            Err(DeathmatchError::Launch { agent, .. }) => assert_eq!(agent, "Ghost"),
            other => panic!("expected launch error, got {other:?}"),
        }
    }

    #[test]
    fn test_signalling_a_vanished_process_is_ok() {
        // Beyond any configurable pid_max.
        assert!(send_signal(i32::MAX as u32, Signal::Continue).is_ok());
    }
}
