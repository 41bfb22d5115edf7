//! Reader and writer tasks shared by both transports

use crate::event::{AgentEvent, EventSender};
use crate::link::Outgoing;
use deathmatch_core::AgentId;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::debug;

const READ_CHUNK: usize = 4096;

/// How a read loop ended.
#[derive(Debug)]
pub(crate) enum ReadEnd {
    Eof,
    Failed(std::io::Error),
    /// Nobody is listening for events any more.
    Abandoned,
}

/// Forward raw chunks until the stream ends. Emits `Closed` unless abandoned.
pub(crate) async fn pump_output<R>(id: AgentId, mut reader: R, events: &EventSender) -> ReadEnd
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    let end = loop {
        match reader.read(&mut buf).await {
            Ok(0) => break ReadEnd::Eof,
            Ok(n) => {
                let event = AgentEvent::Output {
                    id,
                    bytes: buf[..n].to_vec(),
                };
                if events.send(event).is_err() {
                    return ReadEnd::Abandoned;
                }
            }
            Err(err) => break ReadEnd::Failed(err),
        }
    };
    let _ = events.send(AgentEvent::Closed { id });
    end
}

/// Write queued lines until the link is dropped or shut down.
pub(crate) async fn drain_outgoing<W>(
    id: AgentId,
    mut writer: W,
    mut outbound: mpsc::UnboundedReceiver<Outgoing>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(outgoing) = outbound.recv().await {
        match outgoing {
            Outgoing::Line(message) => {
                let line = message.to_line();
                let written = match writer.write_all(line.as_bytes()).await {
                    Ok(()) => writer.flush().await,
                    Err(err) => Err(err),
                };
                if let Err(err) = written {
                    debug!(agent_id = id, error = %err, "Write to agent failed");
                    break;
                }
            }
            Outgoing::Shutdown => {
                let _ = writer.shutdown().await;
                break;
            }
        }
    }
    debug!(agent_id = id, "Outbound stream closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::event_channel;
    use deathmatch_core::Outbound;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    #[tokio::test]
    async fn test_pump_forwards_chunks_then_closed() {
        let (events, mut rx) = event_channel();
        let input: &[u8] = b"Ready!\nPID:4\n";

        let end = pump_output(9, input, &events).await;
        assert!(matches!(end, ReadEnd::Eof));

        let mut collected = Vec::new();
        loop {
            match rx.recv().await.unwrap() {
                AgentEvent::Output { id, bytes } => {
                    assert_eq!(id, 9);
                    collected.extend(bytes);
                }
                AgentEvent::Closed { id } => {
                    assert_eq!(id, 9);
                    break;
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(collected, b"Ready!\nPID:4\n");
    }

    struct ResetStream;

    impl AsyncRead for ResetStream {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Err(std::io::ErrorKind::ConnectionReset.into()))
        }
    }

    #[tokio::test]
    async fn test_read_failure_carries_error_and_closes() {
        let (events, mut rx) = event_channel();

        let end = pump_output(3, ResetStream, &events).await;
        match end {
            ReadEnd::Failed(err) => assert_eq!(err.kind(), std::io::ErrorKind::ConnectionReset),
            other => panic!("expected a failed read, got {other:?}"),
        }
        assert!(matches!(rx.recv().await, Some(AgentEvent::Closed { id: 3 })));
    }

    #[tokio::test]
    async fn test_drain_writes_lines_until_shutdown() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(Outgoing::Line(Outbound::Begin)).unwrap();
        tx.send(Outgoing::Line(Outbound::Opponent {
            id: 12,
            name: "Lua".to_string(),
        }))
        .unwrap();
        tx.send(Outgoing::Shutdown).unwrap();
        tx.send(Outgoing::Line(Outbound::Pause)).unwrap();

        let mut written = Vec::new();
        drain_outgoing(1, &mut written, rx).await;
        assert_eq!(written, b"Begin!\nOpp:12:Lua\n");
    }
}
