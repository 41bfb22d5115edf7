//! # Agent Transport
//!
//! Launches agents and carries protocol lines to and from them, either over
//! a child process's stdin/stdout or over a TCP connection the agent opens.
//!
//! Every transport reports into one [`EventSender`]; the event loop owns the
//! [`AgentLink`] handles and never touches an OS resource directly.

pub mod event;
mod io;
pub mod launch;
pub mod link;
pub mod pause;
pub mod process;
pub mod socket;

pub use event::{event_channel, AgentEvent, EventReceiver, EventSender};
pub use launch::{launch, Launched, LaunchedAgent};
pub use link::{AgentLink, Control, LinkEndpoints, LinkKind, Outgoing};
pub use pause::{pauser_for, MessagePauser, Pauser, SignalPauser};
pub use process::{send_signal, ProcessLauncher, Signal};
pub use socket::SocketAcceptor;
