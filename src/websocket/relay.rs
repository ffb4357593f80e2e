//! Bidirectional frame relay between a client and a backend WebSocket.
//!
//! # Data Flow
//! ```text
//!            ┌──── client→backend task ────┐
//! client ────┤                             ├──── backend
//!            └──── backend→client task ────┘
//!                   ▲
//!   keepalive ticker┘ (shares the client write lock)
//! ```
//!
//! The session task waits on whichever happens first: either relay task ending or
//! a keepalive ping failing. It then aborts the other task, closes the client sink
//! and lets both connections drop.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::Message as ClientMessage;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{self, Message as BackendMessage};

use crate::websocket::frame;

/// Default keepalive ping interval.
pub const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Default deadline for a keepalive ping write.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Keepalive timing for one relay.
#[derive(Debug, Clone, Copy)]
pub struct RelaySettings {
    pub ping_interval: Duration,
    pub write_timeout: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            ping_interval: PING_INTERVAL,
            write_timeout: WRITE_TIMEOUT,
        }
    }
}

/// Which way frames were flowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client -> backend
    Upstream,
    /// Backend -> client
    Downstream,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upstream => f.write_str("client->backend"),
            Direction::Downstream => f.write_str("backend->client"),
        }
    }
}

/// The event that ended a relay.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("client read failed: {0}")]
    ClientRead(axum::Error),
    #[error("backend read failed: {0}")]
    BackendRead(tungstenite::Error),
    #[error("{0} stream ended")]
    Closed(Direction),
    #[error("{direction} write failed: {reason}")]
    Write { direction: Direction, reason: String },
    #[error("keepalive ping failed: {0}")]
    Keepalive(String),
    #[error("keepalive ping timed out after {0:?}")]
    KeepaliveTimeout(Duration),
    #[error("{direction} relay task failed: {source}")]
    Task {
        direction: Direction,
        source: JoinError,
    },
}

impl RelayError {
    /// Whether the session ended by a peer hanging up rather than by a fault.
    pub fn is_clean_close(&self) -> bool {
        matches!(
            self,
            RelayError::Closed(_)
                | RelayError::BackendRead(tungstenite::Error::ConnectionClosed)
                | RelayError::BackendRead(tungstenite::Error::AlreadyClosed)
        )
    }
}

/// Client write half shared by the backend→client loop and the keepalive ticker.
type SharedClientSink<W> = Arc<Mutex<W>>;

/// Relay frames until the first terminal event, then tear both sides down.
///
/// Writes to the client are serialized through one lock; the backend write half is
/// owned by the client→backend loop alone. Returns the event that ended the relay.
pub async fn run<CR, CW, BR, BW>(
    client_rx: CR,
    client_tx: CW,
    backend_rx: BR,
    backend_tx: BW,
    settings: RelaySettings,
) -> RelayError
where
    CR: Stream<Item = Result<ClientMessage, axum::Error>> + Unpin + Send + 'static,
    CW: Sink<ClientMessage> + Unpin + Send + 'static,
    CW::Error: fmt::Display,
    BR: Stream<Item = Result<BackendMessage, tungstenite::Error>> + Unpin + Send + 'static,
    BW: Sink<BackendMessage> + Unpin + Send + 'static,
    BW::Error: fmt::Display,
{
    let client_tx: SharedClientSink<CW> = Arc::new(Mutex::new(client_tx));

    let mut upstream = tokio::spawn(client_to_backend(client_rx, backend_tx));
    let mut downstream = tokio::spawn(backend_to_client(backend_rx, Arc::clone(&client_tx)));

    let mut ticker = time::interval_at(Instant::now() + settings.ping_interval, settings.ping_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let cause = loop {
        tokio::select! {
            result = &mut upstream => {
                stop(downstream).await;
                break joined(result, Direction::Upstream);
            }
            result = &mut downstream => {
                stop(upstream).await;
                break joined(result, Direction::Downstream);
            }
            _ = ticker.tick() => {
                if let Err(err) = ping(&client_tx, settings.write_timeout).await {
                    stop(upstream).await;
                    stop(downstream).await;
                    break err;
                }
            }
        }
    };

    // Both loops are gone, so this is the last handle on the client sink.
    let mut sink = client_tx.lock().await;
    if let Ok(Err(e)) = time::timeout(settings.write_timeout, sink.close()).await {
        tracing::trace!(error = %e, "Client sink already closed");
    }

    cause
}

/// Abort a relay task and wait until it has dropped its halves.
async fn stop(task: JoinHandle<RelayError>) {
    task.abort();
    let _ = task.await;
}

fn joined(result: Result<RelayError, JoinError>, direction: Direction) -> RelayError {
    result.unwrap_or_else(|source| RelayError::Task { direction, source })
}

async fn ping<W>(client_tx: &Mutex<W>, write_timeout: Duration) -> Result<(), RelayError>
where
    W: Sink<ClientMessage> + Unpin,
    W::Error: fmt::Display,
{
    // The deadline covers waiting for the lock: a downstream write stuck on a client that
    // stopped reading holds it.
    let write = async {
        let mut sink = client_tx.lock().await;
        sink.send(ClientMessage::Ping(Bytes::new())).await
    };
    match time::timeout(write_timeout, write).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(RelayError::Keepalive(e.to_string())),
        Err(_) => Err(RelayError::KeepaliveTimeout(write_timeout)),
    }
}

async fn client_to_backend<R, W>(mut reader: R, mut writer: W) -> RelayError
where
    R: Stream<Item = Result<ClientMessage, axum::Error>> + Unpin,
    W: Sink<BackendMessage> + Unpin,
    W::Error: fmt::Display,
{
    loop {
        let msg = match reader.next().await {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => return RelayError::ClientRead(e),
            None => return RelayError::Closed(Direction::Upstream),
        };
        if matches!(msg, ClientMessage::Ping(_) | ClientMessage::Pong(_)) {
            continue;
        }
        tracing::trace!(direction = %Direction::Upstream, kind = frame::kind(&msg), "Relaying frame");

        if let Err(e) = writer.send(frame::to_backend(msg)).await {
            return RelayError::Write {
                direction: Direction::Upstream,
                reason: e.to_string(),
            };
        }
    }
}

async fn backend_to_client<R, W>(mut reader: R, writer: SharedClientSink<W>) -> RelayError
where
    R: Stream<Item = Result<BackendMessage, tungstenite::Error>> + Unpin,
    W: Sink<ClientMessage> + Unpin,
    W::Error: fmt::Display,
{
    loop {
        let msg = match reader.next().await {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => return RelayError::BackendRead(e),
            None => return RelayError::Closed(Direction::Downstream),
        };
        if matches!(msg, BackendMessage::Ping(_) | BackendMessage::Pong(_)) {
            continue;
        }
        let Some(msg) = frame::to_client(msg) else {
            continue;
        };
        tracing::trace!(direction = %Direction::Downstream, kind = frame::kind(&msg), "Relaying frame");

        let result = writer.lock().await.send(msg).await;
        if let Err(e) = result {
            return RelayError::Write {
                direction: Direction::Downstream,
                reason: e.to_string(),
            };
        }
    }
}
