//! Line protocol between the orchestrator and its agents
//!
//! Every message is one newline-terminated UTF-8 line. Agents send `Ready!`
//! and `PID:<id>`; the orchestrator answers with `Begin!`, `Opp:<id>:<name>`
//! and, for message-based pausing, `Pause!` / `Resume!`. Anything else an
//! agent prints is a log line.
//!
//! Agents that connect over TCP may open with `Hello:<pid>` so they are
//! registered under their process id, the same id space `PID:` reports use.

use crate::agent::AgentId;
use crate::error::{DeathmatchError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const READY: &str = "Ready!";
pub const BEGIN: &str = "Begin!";
pub const PAUSE: &str = "Pause!";
pub const RESUME: &str = "Resume!";
pub const PID_PREFIX: &str = "PID:";
pub const OPP_PREFIX: &str = "Opp:";
pub const HELLO_PREFIX: &str = "Hello:";

/// Envelope prefix some agents put in front of protocol lines.
pub const MESSAGE_PREFIX: &str = "MESSAGE:";

/// Longest partial line kept before it is flushed as-is.
pub const MAX_PENDING_LINE: usize = 64 * 1024;

/// The process id announced by a `Hello:<pid>` line. Zero is not a process.
pub fn parse_hello(line: &str) -> Option<AgentId> {
    let id = line.trim().strip_prefix(HELLO_PREFIX)?.trim().parse::<AgentId>().ok()?;
    (id != 0).then_some(id)
}

/// Agent -> orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Inbound {
    Ready,
    Sighting(AgentId),
    Log(String),
}

impl Inbound {
    /// Parse one line. Empty lines yield `Ok(None)`.
    ///
    /// A `PID:` line without a valid identifier is a protocol violation; the
    /// caller is expected to fall back to treating it as a log line.
    pub fn parse(line: &str) -> Result<Option<Inbound>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let body = line
            .strip_prefix(MESSAGE_PREFIX)
            .map(str::trim)
            .unwrap_or(line);

        if body == READY {
            return Ok(Some(Inbound::Ready));
        }

        if let Some(rest) = body.strip_prefix(PID_PREFIX) {
            return rest
                .trim()
                .parse::<AgentId>()
                .map(|id| Some(Inbound::Sighting(id)))
                .map_err(|_| DeathmatchError::ProtocolViolation {
                    line: line.to_string(),
                });
        }

        Ok(Some(Inbound::Log(line.to_string())))
    }
}

impl fmt::Display for Inbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inbound::Ready => f.write_str(READY),
            Inbound::Sighting(id) => write!(f, "{PID_PREFIX}{id}"),
            Inbound::Log(line) => f.write_str(line),
        }
    }
}

/// Orchestrator -> agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outbound {
    Begin,
    Opponent { id: AgentId, name: String },
    Pause,
    Resume,
}

impl Outbound {
    /// Agent-side decoding. Unknown lines yield `None`.
    pub fn parse(line: &str) -> Option<Outbound> {
        match line.trim() {
            BEGIN => Some(Outbound::Begin),
            PAUSE => Some(Outbound::Pause),
            RESUME => Some(Outbound::Resume),
            other => {
                let rest = other.strip_prefix(OPP_PREFIX)?;
                let (id, name) = rest.split_once(':')?;
                Some(Outbound::Opponent {
                    id: id.parse().ok()?,
                    name: name.to_string(),
                })
            }
        }
    }

    /// The wire form, newline included.
    pub fn to_line(&self) -> String {
        format!("{self}\n")
    }
}

impl fmt::Display for Outbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outbound::Begin => f.write_str(BEGIN),
            Outbound::Opponent { id, name } => write!(f, "{OPP_PREFIX}{id}:{name}"),
            Outbound::Pause => f.write_str(PAUSE),
            Outbound::Resume => f.write_str(RESUME),
        }
    }
}

/// Reassembles newline-delimited lines from arbitrary byte chunks.
#[derive(Debug, Default, Clone)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every complete line, in arrival order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            lines.push(String::from_utf8_lossy(&self.pending[start..end]).into_owned());
            start = end + 1;
        }
        self.pending.drain(..start);

        if self.pending.len() > MAX_PENDING_LINE {
            lines.extend(self.finish());
        }
        lines
    }

    /// Flush the unterminated tail, if any. Used when the transport closes.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(tail)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
