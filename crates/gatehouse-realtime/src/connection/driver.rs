//! Per-connection reader and writer tasks.
//!
//! The driver is transport-agnostic: anything that can be split into a
//! [`Sink`] and a [`Stream`] of [`WsFrame`]s can be served, which lets the
//! API layer plug in axum sockets and tests plug in in-memory channels.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

use crate::message::MessageEnvelope;
use crate::message::serializer::serialize_envelope;

use super::handle::ConnectionHandle;
use super::heartbeat::{HeartbeatConfig, pong_overdue};
use super::manager::{ConnectionManager, DisconnectReason};

/// How long the writer waits for the close frame to go out.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Transport-level frames the driver reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsFrame {
    /// A UTF-8 text frame.
    Text(String),
    /// A protocol ping.
    Ping(Vec<u8>),
    /// A protocol pong.
    Pong(Vec<u8>),
    /// A close frame.
    Close,
}

/// Serves one registered connection until either side ends it.
///
/// The writer runs as a spawned task and the reader runs on the calling
/// task. Whichever finishes first cancels the other, and the connection is
/// then removed from the hub with the first observed reason.
pub async fn serve_connection<S, R, E>(
    manager: Arc<ConnectionManager>,
    handle: Arc<ConnectionHandle>,
    outbound: mpsc::Receiver<Arc<MessageEnvelope>>,
    sink: S,
    mut stream: R,
    heartbeat: HeartbeatConfig,
) where
    S: Sink<WsFrame> + Unpin + Send + 'static,
    S::Error: Display + Send,
    R: Stream<Item = Result<WsFrame, E>> + Unpin,
    E: Display,
{
    let writer = tokio::spawn(write_loop(handle.clone(), outbound, sink, heartbeat));

    let read_reason = read_loop(&manager, &handle, &mut stream).await;
    handle.cancellation().cancel();

    let write_reason = match writer.await {
        Ok(reason) => reason,
        Err(e) => {
            error!(conn_id = %handle.id, error = %e, "Writer task failed");
            Some(DisconnectReason::TransportError)
        }
    };

    // A reason of `None` on both sides means the hub already tore the
    // connection down (saturation, replacement, shutdown).
    let reason = read_reason
        .or(write_reason)
        .unwrap_or(DisconnectReason::ServerClosed);
    manager.disconnect(handle.id, reason);
    debug!(conn_id = %handle.id, reason = %reason, "Connection driver finished");
}

async fn read_loop<R, E>(
    manager: &ConnectionManager,
    handle: &ConnectionHandle,
    stream: &mut R,
) -> Option<DisconnectReason>
where
    R: Stream<Item = Result<WsFrame, E>> + Unpin,
    E: Display,
{
    let cancel = handle.cancellation().clone();
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            next = stream.next() => match next {
                Some(Ok(WsFrame::Text(text))) => manager.handle_inbound(handle.id, &text).await,
                Some(Ok(WsFrame::Pong(_))) => handle.record_pong().await,
                // The transport answers pings itself.
                Some(Ok(WsFrame::Ping(_))) => {}
                Some(Ok(WsFrame::Close)) | None => return Some(DisconnectReason::ClientClosed),
                Some(Err(e)) => {
                    debug!(conn_id = %handle.id, error = %e, "Transport read failed");
                    return Some(DisconnectReason::TransportError);
                }
            }
        }
    }
}

async fn write_loop<S>(
    handle: Arc<ConnectionHandle>,
    mut outbound: mpsc::Receiver<Arc<MessageEnvelope>>,
    mut sink: S,
    heartbeat: HeartbeatConfig,
) -> Option<DisconnectReason>
where
    S: Sink<WsFrame> + Unpin,
    S::Error: Display,
{
    let cancel = handle.cancellation().clone();
    let mut ticker = tokio::time::interval_at(
        Instant::now() + heartbeat.ping_interval,
        heartbeat.ping_interval,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let reason = loop {
        // Re-armed every pass so a recorded pong pushes the deadline out.
        let deadline = handle.last_pong().await + heartbeat.pong_timeout;
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => break None,
            _ = tokio::time::sleep_until(deadline) => {
                if pong_overdue(&handle, &heartbeat).await {
                    warn!(
                        conn_id = %handle.id,
                        timeout_secs = heartbeat.pong_timeout.as_secs(),
                        "Pong timeout, closing connection"
                    );
                    break Some(DisconnectReason::PongTimeout);
                }
                continue;
            }
            next = outbound.recv() => match next {
                Some(envelope) => match serialize_envelope(&envelope) {
                    Ok(text) => WsFrame::Text(text),
                    Err(e) => {
                        error!(conn_id = %handle.id, error = %e, "Failed to serialize envelope");
                        continue;
                    }
                },
                None => break None,
            },
            _ = ticker.tick() => WsFrame::Ping(Vec::new()),
        };

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => break None,
            sent = sink.send(frame) => sent,
        };
        if let Err(e) = sent {
            debug!(conn_id = %handle.id, error = %e, "Transport write failed");
            break Some(DisconnectReason::TransportError);
        }
    };

    cancel.cancel();
    if tokio::time::timeout(CLOSE_TIMEOUT, sink.send(WsFrame::Close))
        .await
        .is_err()
    {
        debug!(conn_id = %handle.id, "Close frame timed out");
    }
    reason
}
