//! Event-driven client WebSocket protocol engine for the Tokio stack.
//!
//! This library wraps a tokio `TcpStream` (or `TlsStream`, via `tokio-rustls`)
//! and drives it through the [WebSocket Protocol RFC](https://datatracker.ietf.org/doc/html/rfc6455):
//! performing the client handshake, encoding and decoding frames, assembling
//! fragmented messages, and surfacing the whole connection lifecycle as a
//! stream of [`Event`]s a caller polls.
//!
//! Connect with [`Session::connect`], then drive it with [`Session::next_event`]
//! (or pull [`Session::events_mut`] directly as a `futures::Stream`) and send
//! through `send_text`/`send_binary`/`send_ping`/`close`. [`reconnect::run`]
//! wraps that in automatic reconnection with exponential backoff.

mod byte_parser;
mod compression;
pub mod config;
pub mod error;
pub mod event;
mod frame;
mod handshake;
mod mask;
mod message;
mod proxy;
pub mod reconnect;
mod response;
pub mod session;
mod state;
mod transport;
mod utf8;

pub use config::{ClientConfig, WebSocketConfig};
pub use error::Error;
pub use event::{Event, EventStream};
pub use session::Session;

/// Parse `url` and drive it through [`Session::connect`], named after the
/// teacher's own `connect_async` entry point.
pub async fn connect_async(url: &str, config: ClientConfig) -> Result<Session, Error> {
    let parsed = url::Url::parse(url)?;
    Session::connect(parsed, config).await
}
