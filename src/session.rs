//! The session loop: drives a `Transport`, performs the upgrade handshake,
//! decodes frames into messages, translates them into `Event`s, and enforces
//! the poll/auto-ping/ping-timeout/close-timeout algorithm of §4.9.
//!
//! Grounded on the teacher's `WSWriter`/`Writer` split (`split.rs`/`write.rs`):
//! the write half and the connection state live behind one
//! `Arc<tokio::sync::Mutex<Writer>>` so an application-initiated send can
//! never interleave with (or race the lifecycle flags of) a session-driven
//! write, matching the "Session→Transport, never reverse" lock-ordering rule.
//! The read half is driven exclusively by the session loop task; reading and
//! writing a split stream concurrently is safe without extra coordination,
//! the same guarantee `tokio::io::split` exists to provide.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use log::{debug, warn};
use tokio::io::{split, AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use url::Url;

use crate::byte_parser::ByteParser;
use crate::compression;
use crate::config::ClientConfig;
use crate::error::Error;
use crate::event::{Event, EventStream};
use crate::frame::{FrameDecoder, FrameEncoder, OpCode};
use crate::handshake::Handshake;
use crate::message::{Message, MessageAssembler};
use crate::response::HandshakeResponseParser;
use crate::state::{ConnectionState, ConnectionStateMachine};
use crate::transport::{self, Transport};

const READ_CHUNK: usize = 4096;

struct Writer {
    write_half: WriteHalf<Transport>,
    state: ConnectionStateMachine,
    max_frame_size: usize,
    close_sent_at: Option<Instant>,
    /// Set once the handshake negotiates `permessage-deflate` and the
    /// caller opted in via `WebSocketConfig::enable_permessage_deflate`.
    encoder: Option<compression::Encoder>,
}

impl Writer {
    /// Send an application message, rejecting it if the connection isn't
    /// `Ready` (§7's `websocket_unavailable`/`closing`/`closed`).
    async fn send_message(&mut self, message: Message) -> Result<(), Error> {
        self.state.can_send_message()?;
        self.write_frames(message).await
    }

    /// Writes without the `Ready`-only check, for replies the engine itself
    /// must be able to send while the handshake is still settling (PONG
    /// replies, the echoing CLOSE).
    async fn write_frames(&mut self, message: Message) -> Result<(), Error> {
        if self.encoder.is_some() && matches!(message, Message::Text(_) | Message::Binary(_)) {
            let opcode = match &message {
                Message::Text(_) => OpCode::Text,
                _ => OpCode::Binary,
            };
            let raw = message.as_binary();
            let compressed = self.encoder.as_mut().expect("checked is_some above").compress(&raw)?;
            return self.write_compressed(opcode, compressed).await;
        }

        let frames = message.to_frames(self.max_frame_size)?;
        for frame in frames {
            let bytes = FrameEncoder::encode(frame.fin, frame.opcode, &frame.payload)?;
            self.write_half
                .write_all(&bytes)
                .await
                .map_err(|e| Error::IOError { source: e })?;
        }
        Ok(())
    }

    /// Writes an already-deflated payload, splitting on `max_frame_size` and
    /// setting RSV1 only on the first frame, per RFC 7692 §6.
    async fn write_compressed(&mut self, opcode: OpCode, payload: Vec<u8>) -> Result<(), Error> {
        let chunk_size = self.max_frame_size.max(1);
        let chunks: Vec<&[u8]> = if payload.is_empty() {
            vec![&payload[..]]
        } else {
            payload.chunks(chunk_size).collect()
        };
        let last = chunks.len() - 1;
        for (i, chunk) in chunks.into_iter().enumerate() {
            let op = if i == 0 { opcode } else { OpCode::Continuation };
            let bytes = FrameEncoder::encode_with_rsv1(i == last, i == 0, op, chunk)?;
            self.write_half
                .write_all(&bytes)
                .await
                .map_err(|e| Error::IOError { source: e })?;
        }
        Ok(())
    }

    async fn send_close(&mut self, code: u16, reason: String) -> Result<(), Error> {
        self.write_frames(Message::Close {
            code: Some(code),
            reason,
        })
        .await?;
        self.close_sent_at = Some(Instant::now());
        Ok(())
    }
}

/// A live client WebSocket connection. Iterate `next_event()` (or pull the
/// `EventStream` directly) to drive the protocol; send through the `send_*`
/// methods from any task.
///
/// `writer` is `None` until the transport connects and the handshake request
/// is written; a caller that only drives the event stream still observes
/// `Connecting` followed by `ConnectFail` in that case (§4.9 step 1), rather
/// than the failure only surfacing as this constructor's `Err`.
pub struct Session {
    events: EventStream,
    writer: Option<Arc<Mutex<Writer>>>,
    event_tx: mpsc::Sender<Event>,
}

impl Session {
    pub async fn connect(url: Url, config: ClientConfig) -> Result<Self, Error> {
        let (tx, rx) = mpsc::channel(256);

        debug!("connecting to {}", url);
        tx.send(Event::Connecting).await.ok();

        match Self::establish(&url, &config, &tx).await {
            Ok((writer, read_half, handshake)) => {
                let loop_writer = writer.clone();
                let event_tx = tx.clone();
                tokio::spawn(run_loop(read_half, loop_writer, handshake, config, tx));

                Ok(Session {
                    events: EventStream::new(rx),
                    writer: Some(writer),
                    event_tx,
                })
            }
            Err(e) => {
                warn!("connect to {} failed: {}", url, e);
                tx.send(Event::ConnectFail(e.to_string())).await.ok();
                tx.send(Event::Disconnected {
                    reason: e.to_string(),
                    graceful: false,
                })
                .await
                .ok();
                Ok(Session {
                    events: EventStream::new(rx),
                    writer: None,
                    event_tx: tx,
                })
            }
        }
    }

    /// Everything in §4.9 steps 1-3 that can fail: resolve the URL, connect
    /// the transport, and write the upgrade request. Kept separate from
    /// `connect` so every failure path still has the `(tx, rx)` event
    /// channel available to report through, instead of a bare `Err` that
    /// drops the channel before a caller ever sees it.
    async fn establish(
        url: &Url,
        config: &ClientConfig,
        tx: &mpsc::Sender<Event>,
    ) -> Result<(Arc<Mutex<Writer>>, ReadHalf<Transport>, Handshake), Error> {
        let ws_url = transport::parse_ws_url(url)?;
        let transport = transport::connect(
            &ws_url,
            config.ca_file.as_deref(),
            config.proxy.as_deref(),
        )
        .await?;

        let handshake = {
            let mut h = Handshake::new(
                ws_url.host.clone(),
                ws_url.path.clone(),
                config.protocols.clone(),
            );
            if let Some(ua) = &config.user_agent {
                h = h.with_user_agent(ua.clone());
            }
            for (name, value) in &config.extra_headers {
                h = h.with_header(name.clone(), value.clone());
            }
            if config.websocket_config.enable_permessage_deflate {
                h = h.with_header(
                    "Sec-WebSocket-Extensions".to_string(),
                    compression::build_extension_header(None),
                );
            }
            h
        };

        let (read_half, mut write_half) = split(transport);
        write_half
            .write_all(&handshake.build_request())
            .await
            .map_err(|e| Error::IOError { source: e })?;

        debug!("handshake request sent to {}", ws_url.host);
        tx.send(Event::Connected).await.ok();

        let mut state = ConnectionStateMachine::new();
        state.on_connected();
        let writer = Arc::new(Mutex::new(Writer {
            write_half,
            state,
            max_frame_size: config.websocket_config.max_frame_size,
            close_sent_at: None,
            encoder: None,
        }));

        Ok((writer, read_half, handshake))
    }

    pub async fn next_event(&mut self) -> Option<Event> {
        self.events.next().await
    }

    pub fn events_mut(&mut self) -> &mut EventStream {
        &mut self.events
    }

    pub async fn send_text(&self, text: String) -> Result<(), Error> {
        self.writer()?.lock().await.send_message(Message::Text(text)).await
    }

    pub async fn send_binary(&self, data: Vec<u8>) -> Result<(), Error> {
        self.writer()?
            .lock()
            .await
            .send_message(Message::Binary(data))
            .await
    }

    pub async fn send_ping(&self, payload: Vec<u8>) -> Result<(), Error> {
        self.writer()?
            .lock()
            .await
            .send_message(Message::Ping(payload))
            .await
    }

    /// Begin the close handshake. A no-op if already closing or closed.
    pub async fn close(&self, code: u16, reason: String) -> Result<(), Error> {
        let mut writer = self.writer()?.lock().await;
        if !writer.state.begin_closing() {
            return Ok(());
        }
        let result = writer.send_close(code, reason.clone()).await;
        drop(writer);
        self.event_tx
            .send(Event::Closing {
                code: Some(code),
                reason,
            })
            .await
            .ok();
        result
    }

    fn writer(&self) -> Result<&Arc<Mutex<Writer>>, Error> {
        self.writer.as_ref().ok_or(Error::WebSocketUnavailable)
    }
}

async fn run_loop(
    mut read_half: ReadHalf<Transport>,
    writer: Arc<Mutex<Writer>>,
    handshake: Handshake,
    config: ClientConfig,
    tx: mpsc::Sender<Event>,
) {
    let session_start = Instant::now();
    let mut parser = ByteParser::new();
    let mut handshake_done = false;
    let mut frame_decoder = FrameDecoder::with_max_frame_size(config.websocket_config.max_frame_size);
    let mut assembler = MessageAssembler::new(config.websocket_config.max_message_size);
    let mut deflate_decoder: Option<compression::Decoder> = None;
    let mut last_pong = Instant::now();
    let mut next_ping = config.ping_rate.map(|rate| session_start + rate);
    let mut buf = vec![0u8; READ_CHUNK];

    let (graceful, reason) = 'outer: loop {
        let read_result = tokio::time::timeout(config.poll_interval, read_half.read(&mut buf)).await;

        match read_result {
            Err(_) => {
                // poll_interval elapsed with nothing to read.
                if tx.send(Event::Poll).await.is_err() {
                    break 'outer (false, "consumer dropped".to_string());
                }
            }
            Ok(Ok(0)) => {
                let graceful = writer.lock().await.state.state() == ConnectionState::Closing;
                debug!("peer closed the TCP connection (graceful={})", graceful);
                break 'outer (graceful, "peer closed the connection".to_string());
            }
            Ok(Ok(n)) => {
                if parser.feed(&buf[..n]).is_err() {
                    break 'outer (false, "parser already closed".to_string());
                }
                if let Some(outcome) = process_buffered(
                    &mut parser,
                    &mut handshake_done,
                    &handshake,
                    &mut frame_decoder,
                    &mut assembler,
                    &mut deflate_decoder,
                    config.websocket_config.enable_permessage_deflate,
                    &writer,
                    &tx,
                    &mut last_pong,
                    config.auto_pong,
                )
                .await
                {
                    break 'outer outcome;
                }
            }
            Ok(Err(e)) => {
                break 'outer (false, e.to_string());
            }
        }

        if let Some(rate) = config.ping_rate {
            if Instant::now() >= next_ping.unwrap_or(session_start) {
                let _ = writer
                    .lock()
                    .await
                    .send_message(Message::Ping(Vec::new()))
                    .await;
                next_ping = Some(Instant::now() + rate);
            }
            if Instant::now().duration_since(last_pong) > config.ping_timeout {
                warn!("peer unresponsive, no pong within {:?}", config.ping_timeout);
                tx.send(Event::Unresponsive).await.ok();
                break 'outer (false, "ping timeout".to_string());
            }
        }

        let w = writer.lock().await;
        if let Some(sent_at) = w.close_sent_at {
            if sent_at.elapsed() >= config.close_timeout {
                drop(w);
                break 'outer (false, "close timeout".to_string());
            }
        }
        if w.state.state() == ConnectionState::Closed {
            drop(w);
            break 'outer (true, "closed".to_string());
        }
    };

    writer.lock().await.write_half.shutdown().await.ok();
    debug!("session ending: {} (graceful={})", reason, graceful);
    tx.send(Event::Disconnected { reason, graceful }).await.ok();
}

/// Drains every complete frame currently buffered in `parser`, either
/// completing the handshake or feeding frames to the `MessageAssembler`.
/// Returns `Some((graceful, reason))` once the loop should stop.
#[allow(clippy::too_many_arguments)]
async fn process_buffered(
    parser: &mut ByteParser,
    handshake_done: &mut bool,
    handshake: &Handshake,
    frame_decoder: &mut FrameDecoder,
    assembler: &mut MessageAssembler,
    deflate_decoder: &mut Option<compression::Decoder>,
    enable_permessage_deflate: bool,
    writer: &Arc<Mutex<Writer>>,
    tx: &mpsc::Sender<Event>,
    last_pong: &mut Instant,
    auto_pong: bool,
) -> Option<(bool, String)> {
    if !*handshake_done {
        match HandshakeResponseParser::try_parse(parser) {
            Ok(None) => return None,
            Ok(Some(response)) => match handshake.validate_response(&response) {
                Ok(negotiated) => {
                    *handshake_done = true;
                    writer.lock().await.state.on_handshake_accepted();
                    debug!(
                        "handshake accepted, protocol={:?} extensions={:?}",
                        negotiated.protocol, negotiated.extensions
                    );
                    if enable_permessage_deflate {
                        if let Some(extensions) = negotiated
                            .extensions
                            .iter()
                            .find_map(|raw| compression::parse_extensions(raw).ok().flatten())
                        {
                            *deflate_decoder = Some(compression::Decoder::new(
                                extensions.server_no_context_takeover,
                                extensions.server_max_window_bits,
                            ));
                            writer.lock().await.encoder =
                                Some(compression::Encoder::new(extensions.client_no_context_takeover));
                        }
                    }
                    if tx
                        .send(Event::Ready {
                            protocol: negotiated.protocol,
                            extensions: negotiated.extensions,
                        })
                        .await
                        .is_err()
                    {
                        return Some((false, "consumer dropped".to_string()));
                    }
                }
                Err(e) => {
                    warn!("handshake response rejected: {}", e);
                    writer.lock().await.state.on_handshake_rejected();
                    tx.send(Event::Rejected(e.to_string())).await.ok();
                    return Some((false, e.to_string()));
                }
            },
            Err(e) => {
                warn!("handshake response malformed: {}", e);
                tx.send(Event::Rejected(e.to_string())).await.ok();
                return Some((false, e.to_string()));
            }
        }
    }

    loop {
        match frame_decoder.decode_next(parser) {
            Ok(None) => return None,
            Ok(Some(frame)) => {
                if let Err(e) = frame.validate(deflate_decoder.is_some()) {
                    return Some(fail_protocol(writer, tx, &e).await);
                }
                match assembler.feed(frame, deflate_decoder.as_mut()) {
                    Ok(None) => continue,
                    Ok(Some(message)) => {
                        if handle_message(tx, writer, message, last_pong, auto_pong)
                            .await
                            .is_some()
                        {
                            return Some((true, "close handshake complete".to_string()));
                        }
                    }
                    Err(e) => return Some(fail_protocol(writer, tx, &e).await),
                }
            }
            Err(e) => return Some(fail_protocol(writer, tx, &e).await),
        }
    }
}

/// Runs a protocol-error transition: sends CLOSE 1002 for recoverable
/// errors, skips straight to `Closed` for critical ones (§7).
async fn fail_protocol(writer: &Arc<Mutex<Writer>>, tx: &mpsc::Sender<Event>, error: &Error) -> (bool, String) {
    warn!("protocol error: {}", error);
    let mut w = writer.lock().await;
    w.state.on_protocol_error(error);
    let sent_close = if !error.is_critical() {
        let sent = w.send_close(1002, error.to_string()).await.is_ok();
        tx.send(Event::Closing {
            code: Some(1002),
            reason: error.to_string(),
        })
        .await
        .ok();
        sent
    } else {
        false
    };
    drop(w);
    tx.send(Event::Closed).await.ok();
    (sent_close, error.to_string())
}

/// Returns `Some(())` once the close handshake has fully completed and the
/// loop should stop.
async fn handle_message(
    tx: &mpsc::Sender<Event>,
    writer: &Arc<Mutex<Writer>>,
    message: Message,
    last_pong: &mut Instant,
    auto_pong: bool,
) -> Option<()> {
    match message {
        Message::Text(text) => {
            tx.send(Event::Text(text)).await.ok();
            None
        }
        Message::Binary(data) => {
            tx.send(Event::Binary(data)).await.ok();
            None
        }
        Message::Ping(payload) => {
            tx.send(Event::Ping(payload.clone())).await.ok();
            if auto_pong {
                let mut w = writer.lock().await;
                let _ = w.write_frames(Message::Pong(payload)).await;
            }
            None
        }
        Message::Pong(payload) => {
            *last_pong = Instant::now();
            tx.send(Event::Pong(payload)).await.ok();
            None
        }
        Message::Close { code, reason } => {
            let mut w = writer.lock().await;
            let was_closing = w.state.state() == ConnectionState::Closing;
            tx.send(Event::Closing {
                code,
                reason: reason.clone(),
            })
            .await
            .ok();
            if !was_closing {
                w.state.begin_closing();
                let _ = w.send_close(code.unwrap_or(1000), reason).await;
            }
            w.state.on_closed();
            drop(w);
            tx.send(Event::Closed).await.ok();
            Some(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_chunk_matches_spec_size() {
        assert_eq!(READ_CHUNK, 4096);
    }

    #[test]
    fn poll_interval_default_is_used_as_timeout_unit() {
        let config = ClientConfig::default();
        assert!(config.poll_interval > Duration::from_millis(0));
    }
}
