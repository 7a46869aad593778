use httparse::Error as HttpParseError;
use pki_types::InvalidDnsNameError;
use std::io;
use std::string::FromUtf8Error;
use thiserror::Error;
use tokio::time::error::Elapsed;
use url::ParseError;

/// Error taxonomy for the engine.
///
/// Every variant maps to one of the categories in the protocol's error
/// handling design: `frame_build_error`, `handshake_error`,
/// `protocol_error`, `critical_protocol_error`, `transport_fail`, and the
/// `websocket_closed`/`closing`/`unavailable` family raised to a caller
/// attempting to send on a connection that isn't open.
#[derive(Error, Debug)]
pub enum Error {
    // General Errors
    #[error("{source}")]
    Timeout {
        #[from]
        source: Elapsed,
    },

    #[error("IO error: {source}")]
    IOError {
        #[from]
        source: io::Error,
    },

    #[error("{source}")]
    FromUtf8Error {
        #[from]
        source: FromUtf8Error,
    },

    // Parser errors (ByteParser, §4.1)
    #[error("delimiter not found within {max_bytes} bytes")]
    Overflow { max_bytes: usize },

    #[error("end of stream while a read was outstanding")]
    UnexpectedEof,

    #[error("feed() called on a parser that already observed EOF")]
    ParserAlreadyClosed,

    // Handshake errors (handshake_error, §4.6/§4.7)
    #[error("websocket upgrade failed: server responded with status {0}")]
    HandshakeStatus(u16),

    #[error("websocket upgrade failed: missing or invalid Upgrade header")]
    HandshakeNoUpgrade,

    #[error("websocket upgrade failed: missing Sec-WebSocket-Accept header")]
    HandshakeNoAccept,

    #[error("websocket upgrade failed: Sec-WebSocket-Accept challenge mismatch")]
    HandshakeAcceptMismatch,

    #[error("response headers exceeded the 16 KiB cap before the blank line was seen")]
    HandshakeHeadersTooLarge,

    #[error("{source}")]
    HttpParseError {
        #[from]
        source: HttpParseError,
    },

    // Framing errors (protocol_error, §4.4)
    #[error("reserved bit set without a negotiated extension")]
    RsvNotZero,

    #[error("control frames must not be fragmented")]
    ControlFrameFragmented,

    #[error("control frame payload exceeds 125 bytes")]
    ControlFramePayloadSize,

    #[error("opcode {0} is reserved")]
    ReservedOpcode(u8),

    #[error("frame payload length does not fit a 63-bit unsigned integer")]
    FrameTooLarge,

    #[error("payload is too large for a single frame")]
    FrameBuildError,

    // Fragmentation / assembly errors (protocol_error, §4.5)
    #[error("continuation frame has nothing to continue")]
    InvalidContinuationFrame,

    #[error("continuation frame expected, got a new TEXT/BINARY frame")]
    FragmentedInProgress,

    #[error("close frame payload of length 1 is malformed")]
    MalformedClosePayload,

    // UTF-8 validation (critical_protocol_error, §4.2)
    #[error("invalid UTF-8 in a TEXT payload")]
    InvalidUtf8,

    #[error("invalid UTF-8 in a CLOSE reason")]
    InvalidUtf8CloseReason,

    // Close-handshake / state machine errors (§4.8)
    #[error("reserved close code {0} received on the wire")]
    ReservedCloseCode(u16),

    #[error("protocol violation: {0}")]
    ProtocolError(String),

    #[error("critical protocol violation: {0}")]
    CriticalProtocolError(String),

    // Sender-visible state errors (§7)
    #[error("the websocket is still connecting")]
    WebSocketUnavailable,

    #[error("the websocket is closing")]
    WebSocketClosing,

    #[error("the websocket is closed")]
    WebSocketClosed,

    // URL / proxy errors
    #[error("{source}")]
    UrlParseError {
        #[from]
        source: ParseError,
    },

    #[error("URL scheme must be ws or wss")]
    InvalidSchemeUrl,

    #[error("URL has no host")]
    UrlNoHost,

    #[error("{source}")]
    DomainError {
        #[from]
        source: InvalidDnsNameError,
    },

    #[error("invalid proxy address: {0}")]
    InvalidProxyAddress(String),

    #[error("proxy CONNECT request rejected: {0}")]
    ProxyConnectFailed(String),

    // Compression parameter errors (§6, external collaborator)
    #[error("max_window_bits should be a value between 8 and 15")]
    InvalidMaxWindowBits,
}

impl Error {
    /// `true` for the critical class: the session must transition straight
    /// to `Closed` without sending a CLOSE frame.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Error::InvalidUtf8
                | Error::InvalidUtf8CloseReason
                | Error::FrameTooLarge
                | Error::CriticalProtocolError(_)
        )
    }
}
