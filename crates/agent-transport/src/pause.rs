//! Suspending agents during a staggered release

use crate::link::{AgentLink, Control, LinkKind};
use deathmatch_core::{Outbound, PauseMethod};
use tracing::warn;

/// Halts and resumes an agent's execution.
pub trait Pauser: Send + Sync {
    fn pause(&self, link: &AgentLink) -> bool;
    fn resume(&self, link: &AgentLink) -> bool;
}

/// Job-control signals to the agent process.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalPauser;

impl Pauser for SignalPauser {
    fn pause(&self, link: &AgentLink) -> bool {
        signal(link, Control::Suspend)
    }

    fn resume(&self, link: &AgentLink) -> bool {
        signal(link, Control::Continue)
    }
}

fn signal(link: &AgentLink, request: Control) -> bool {
    match link.kind() {
        LinkKind::Process { .. } => link.control(request),
        LinkKind::Connection => {
            warn!(agent_id = link.id(), "Cannot signal a connected agent");
            false
        }
    }
}

/// `Pause!` / `Resume!` lines; the agent cooperates.
#[derive(Debug, Default, Clone, Copy)]
pub struct MessagePauser;

impl Pauser for MessagePauser {
    fn pause(&self, link: &AgentLink) -> bool {
        link.send(Outbound::Pause)
    }

    fn resume(&self, link: &AgentLink) -> bool {
        link.send(Outbound::Resume)
    }
}

pub fn pauser_for(method: PauseMethod) -> Box<dyn Pauser> {
    match method {
        PauseMethod::Signal => Box::new(SignalPauser),
        PauseMethod::Message => Box::new(MessagePauser),
    }
}
