//! Handle the event loop holds for one launched agent

use deathmatch_core::{AgentId, Outbound, TerminationMode};
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Process { pid: u32 },
    Connection,
}

/// What the writer task is asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Line(Outbound),
    /// Close the outbound direction; the agent sees end of input.
    Shutdown,
}

/// Requests to the task supervising the process or connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Terminate(TerminationMode),
    Suspend,
    Continue,
}

/// Exclusive handle to one agent's transport.
///
/// Dropping the link closes the outbound direction. Every operation is
/// fire-and-forget: an agent that is already gone is not an error.
#[derive(Debug)]
pub struct AgentLink {
    id: AgentId,
    kind: LinkKind,
    outbound: mpsc::UnboundedSender<Outgoing>,
    control: mpsc::UnboundedSender<Control>,
}

/// Receiving ends of a link, owned by the transport tasks.
#[derive(Debug)]
pub struct LinkEndpoints {
    pub outbound: mpsc::UnboundedReceiver<Outgoing>,
    pub control: mpsc::UnboundedReceiver<Control>,
}

impl AgentLink {
    /// A link whose far side is handed back to the caller instead of an OS resource.
    pub fn detached(id: AgentId, kind: LinkKind) -> (Self, LinkEndpoints) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let link = Self {
            id,
            kind,
            outbound: outbound_tx,
            control: control_tx,
        };
        let endpoints = LinkEndpoints {
            outbound: outbound_rx,
            control: control_rx,
        };
        (link, endpoints)
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn kind(&self) -> LinkKind {
        self.kind
    }

    pub fn pid(&self) -> Option<u32> {
        match self.kind {
            LinkKind::Process { pid } => Some(pid),
            LinkKind::Connection => None,
        }
    }

    /// Queue one protocol line. Returns false once the writer is gone.
    pub fn send(&self, message: Outbound) -> bool {
        let delivered = self.outbound.send(Outgoing::Line(message)).is_ok();
        if !delivered {
            debug!(agent_id = self.id, "Dropped message for closed transport");
        }
        delivered
    }

    /// Safe to call any number of times, including after exit.
    pub fn terminate(&self, mode: TerminationMode) {
        if let TerminationMode::Graceful = mode {
            let _ = self.outbound.send(Outgoing::Shutdown);
        }
        if self.control.send(Control::Terminate(mode)).is_err() {
            debug!(agent_id = self.id, ?mode, "Termination of finished agent ignored");
        }
    }

    pub fn control(&self, request: Control) -> bool {
        self.control.send(request).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detached_link_delivers_in_order() {
        let (link, mut endpoints) = AgentLink::detached(7, LinkKind::Connection);
        assert!(link.send(Outbound::Begin));
        assert!(link.send(Outbound::Opponent {
            id: 8,
            name: "Deno".to_string()
        }));

        assert_eq!(
            endpoints.outbound.try_recv().unwrap(),
            Outgoing::Line(Outbound::Begin)
        );
        assert!(matches!(
            endpoints.outbound.try_recv().unwrap(),
            Outgoing::Line(Outbound::Opponent { id: 8, .. })
        ));
    }

    #[test]
    fn test_graceful_termination_closes_writer_first() {
        let (link, mut endpoints) = AgentLink::detached(3, LinkKind::Process { pid: 3 });
        link.terminate(TerminationMode::Graceful);
        assert_eq!(endpoints.outbound.try_recv().unwrap(), Outgoing::Shutdown);
        assert_eq!(
            endpoints.control.try_recv().unwrap(),
            Control::Terminate(TerminationMode::Graceful)
        );
    }

    #[test]
    fn test_operations_on_gone_agent_are_harmless() {
        let (link, endpoints) = AgentLink::detached(4, LinkKind::Process { pid: 4 });
        drop(endpoints);
        assert!(!link.send(Outbound::Begin));
        link.terminate(TerminationMode::Forced);
        link.terminate(TerminationMode::Forced);
        assert!(!link.control(Control::Suspend));
        assert_eq!(link.pid(), Some(4));
    }
}
