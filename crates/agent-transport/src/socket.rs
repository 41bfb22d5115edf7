//! TCP agents
//!
//! Agents connect to the orchestrator's endpoint themselves. An agent that
//! opens with `Hello:<pid>` is registered under that process id; any other
//! connection gets an id from a counter starting at 1. Each connection is
//! served by a writer task and a connection task that reads, handles
//! termination and reports `Exited` when the connection goes away.

use crate::event::{AgentEvent, EventSender};
use crate::io::{drain_outgoing, pump_output, ReadEnd};
use crate::link::{AgentLink, Control, LinkKind};
use deathmatch_core::protocol::{parse_hello, MAX_PENDING_LINE};
use deathmatch_core::{AgentId, Result, TerminationMode};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info};

/// How long a new connection has to announce its process id.
pub const HELLO_WINDOW: Duration = Duration::from_millis(500);

pub struct SocketAcceptor {
    listener: TcpListener,
    events: EventSender,
    next_id: AgentId,
}

impl SocketAcceptor {
    pub async fn bind(addr: &str, events: EventSender) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "Waiting for agent connections");
        Ok(Self {
            listener,
            events,
            next_id: 1,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn accept(&mut self) -> Result<AgentLink> {
        let (stream, peer) = self.listener.accept().await?;
        let (mut read_half, write_half) = stream.into_split();

        let (announced, early) = read_hello(&mut read_half).await;
        let id = match announced {
            Some(pid) => pid,
            None => {
                let id = self.next_id;
                self.next_id += 1;
                id
            }
        };
        let (link, endpoints) = AgentLink::detached(id, LinkKind::Connection);

        if !early.is_empty() {
            let _ = self.events.send(AgentEvent::Output { id, bytes: early });
        }
        tokio::spawn(drain_outgoing(id, write_half, endpoints.outbound));
        tokio::spawn(serve_connection(id, read_half, endpoints.control, self.events.clone()));

        info!(agent_id = id, %peer, announced = announced.is_some(), "Agent connected");
        Ok(link)
    }
}

/// Wait up to [`HELLO_WINDOW`] for a first line. Returns the announced pid and
/// whatever was read that still belongs to the agent's output.
async fn read_hello(reader: &mut OwnedReadHalf) -> (Option<AgentId>, Vec<u8>) {
    let deadline = Instant::now() + HELLO_WINDOW;
    let mut received = Vec::new();
    let mut chunk = [0u8; 512];

    let newline = loop {
        if let Some(pos) = received.iter().position(|b| *b == b'\n') {
            break Some(pos);
        }
        if received.len() > MAX_PENDING_LINE {
            break None;
        }
        match timeout_at(deadline, reader.read(&mut chunk)).await {
            Ok(Ok(0)) | Ok(Err(_)) | Err(_) => break None,
            Ok(Ok(n)) => received.extend_from_slice(&chunk[..n]),
        }
    };

    let announced = newline.and_then(|pos| {
        let first = String::from_utf8_lossy(&received[..pos]);
        parse_hello(&first).map(|pid| (pid, pos))
    });
    match announced {
        Some((pid, pos)) => (Some(pid), received.split_off(pos + 1)),
        None => (None, received),
    }
}

async fn serve_connection(
    id: AgentId,
    read_half: OwnedReadHalf,
    mut control: mpsc::UnboundedReceiver<Control>,
    events: EventSender,
) {
    let reader = pump_output(id, read_half, &events);
    tokio::pin!(reader);

    let detail = loop {
        tokio::select! {
            end = &mut reader => break match end {
                ReadEnd::Eof => "connection closed by agent".to_string(),
                ReadEnd::Failed(err) => format!("connection failed: {err}"),
                ReadEnd::Abandoned => "event loop gone".to_string(),
            },
            request = control.recv() => match request {
                Some(Control::Terminate(TerminationMode::Forced)) => {
                    break "connection dropped by orchestrator".to_string();
                }
                // Graceful already shut our write side; wait for the peer to hang up.
                Some(Control::Terminate(TerminationMode::Graceful)) => {}
                Some(Control::Suspend | Control::Continue) => {
                    debug!(agent_id = id, "Connection agents are paused over the protocol");
                }
                None => break "link released".to_string(),
            },
        }
    };

    info!(agent_id = id, %detail, "Agent connection ended");
    let _ = events.send(AgentEvent::Exited { id, detail });
}
