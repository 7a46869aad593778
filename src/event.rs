//! The event surface an application drives a connection through. `Session`
//! pushes `Event`s into an mpsc channel; `EventStream` wraps the receiving
//! end as a `futures::Stream` the way the teacher's `event.rs` wraps its
//! server-side events.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc::Receiver;

use crate::error::Error;
use crate::message::Message;

#[derive(Debug, Clone)]
pub enum Event {
    /// The transport connection (TCP/TLS) has been initiated.
    Connecting,
    /// The transport connection is established and the upgrade request has
    /// been sent; the handshake response is now awaited.
    Connected,
    /// The server accepted the upgrade. Carries the negotiated subprotocol
    /// (if any) and the raw `Sec-WebSocket-Extensions` values returned.
    Ready {
        protocol: Option<String>,
        extensions: Vec<String>,
    },
    /// The server rejected the upgrade (non-101 status, missing/invalid
    /// `Upgrade` header, or an accept-value mismatch).
    Rejected(String),
    /// The transport connection itself could not be established, or the
    /// handshake request could not be written (DNS failure, refused
    /// connection, proxy CONNECT failure, TLS handshake failure, ...).
    /// Distinct from `Rejected`, which means a transport connected fine but
    /// the server declined the upgrade.
    ConnectFail(String),
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    /// The close handshake has begun, either initiated locally or by the peer.
    Closing { code: Option<u16>, reason: String },
    /// The close handshake completed cleanly.
    Closed,
    /// The transport connection ended, with the reason and whether it was graceful.
    Disconnected { reason: String, graceful: bool },
    /// Emitted once per `poll_interval` tick so a caller iterating events
    /// never blocks indefinitely even if the peer is silent.
    Poll,
    /// Emitted before a reconnect attempt's backoff sleep.
    BackOff { attempt: u32, delay_ms: u64 },
    /// No pong has been observed within `ping_timeout` of the last ping.
    Unresponsive,
}

impl Event {
    pub fn error_reason(error: &Error) -> String {
        error.to_string()
    }
}

/// Wraps the receiving half of a `Session`'s event channel as a `Stream`,
/// so an application can `while let Some(event) = events.next().await`.
pub struct EventStream {
    receiver: Receiver<Event>,
}

impl EventStream {
    pub fn new(receiver: Receiver<Event>) -> Self {
        Self { receiver }
    }
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        Pin::new(&mut this.receiver).poll_recv(cx)
    }
}
