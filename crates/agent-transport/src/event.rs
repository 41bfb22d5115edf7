//! Facts reported by transports to the event loop

use deathmatch_core::AgentId;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// Raw bytes as read; line boundaries are not preserved.
    Output { id: AgentId, bytes: Vec<u8> },
    /// The inbound stream reached its end.
    Closed { id: AgentId },
    /// The process exited or the connection is gone. Reported once per agent.
    Exited { id: AgentId, detail: String },
}

impl AgentEvent {
    pub fn agent_id(&self) -> AgentId {
        match self {
            AgentEvent::Output { id, .. } | AgentEvent::Closed { id } | AgentEvent::Exited { id, .. } => *id,
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<AgentEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<AgentEvent>;

/// Every transport task funnels into one of these.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
