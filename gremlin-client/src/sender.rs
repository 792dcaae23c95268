//! Write side of a connection.
//!
//! The sender is the only task that writes to the socket. It forwards frames
//! handed off by callers, keeps the connection alive with pings, and says
//! goodbye with a close frame when the connection shuts down.

use crate::error::ClientError;
use bytes::Bytes;
use futures::{Sink, SinkExt};
use std::borrow::Cow;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;

/// Timing knobs for the write side.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SenderConfig {
    /// Time allowed for a single write.
    pub write_wait: Duration,
    /// Interval between keepalive pings.
    pub ping_period: Duration,
}

/// Runs the sender until shutdown or the first write failure.
///
/// Cancels `shutdown` on return so the receiver stops too.
pub(crate) async fn run<S>(
    mut sink: S,
    mut outbound: mpsc::Receiver<Bytes>,
    shutdown: CancellationToken,
    config: SenderConfig,
) -> Result<(), ClientError>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    tracing::debug!("sender started");

    let start = Instant::now() + config.ping_period;
    let mut pinger = tokio::time::interval_at(start, config.ping_period);
    pinger.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let result = loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    break Ok(());
                };
                tracing::trace!("sender: writing frame ({} bytes)", frame.len());
                let message = Message::Binary(frame.to_vec());
                if let Err(e) = write(&mut sink, message, config.write_wait).await {
                    break Err(e);
                }
            }
            _ = pinger.tick() => {
                tracing::trace!("sender: writing keepalive ping");
                let ping = Message::Ping(Vec::new());
                if let Err(e) = write(&mut sink, ping, config.write_wait).await {
                    break Err(e);
                }
            }
            _ = shutdown.cancelled() => {
                tracing::debug!("sender: connection closing, writing close frame");
                let close = CloseFrame {
                    code: CloseCode::Normal,
                    reason: Cow::Borrowed(""),
                };
                break match write(&mut sink, Message::Close(Some(close)), config.write_wait).await {
                    Err(ClientError::WebSocket(e)) if is_closing(&e) => {
                        tracing::debug!("sender: connection already closing: {}", e);
                        Ok(())
                    }
                    result => result,
                };
            }
        }
    };

    // Closing our half ends the connection for the receiver as well.
    shutdown.cancel();
    let _ = tokio::time::timeout(config.write_wait, sink.close()).await;

    tracing::debug!("sender stopped");
    result
}

/// Whether a write failed only because the close handshake already started.
fn is_closing(e: &WsError) -> bool {
    matches!(
        e,
        WsError::ConnectionClosed
            | WsError::AlreadyClosed
            | WsError::Protocol(ProtocolError::SendAfterClosing)
    )
}

/// Writes one message within the write deadline.
async fn write<S>(sink: &mut S, message: Message, wait: Duration) -> Result<(), ClientError>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    match tokio::time::timeout(wait, sink.send(message)).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(ClientError::Timeout),
    }
}
