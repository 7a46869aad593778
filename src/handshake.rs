//! Client-side upgrade handshake: building the request and validating the
//! server's response against RFC 6455 §4.1 / §4.2.2.
//!
//! The accept-value challenge (SHA1 of the key concatenated with the GUID,
//! base64-encoded) is carried over verbatim from the teacher's
//! `generate_websocket_accept_value`; everything around it is rewritten for
//! the client side of the handshake instead of the server side.

use base64::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha1::{Digest, Sha1};

use crate::error::Error;
use crate::response::HandshakeResponse;

const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
const WEBSOCKET_VERSION: &str = "13";
const USER_AGENT: &str = concat!("ws-engine/", env!("CARGO_PKG_VERSION"));

/// What the handshake negotiated, reported to the caller via the `Ready` event.
#[derive(Debug, Clone, Default)]
pub struct NegotiatedHandshake {
    pub protocol: Option<String>,
    pub extensions: Vec<String>,
}

/// Everything needed to both build the request and validate its response.
pub struct Handshake {
    key: String,
    host: String,
    path: String,
    protocols: Vec<String>,
    user_agent: String,
    extra_headers: Vec<(String, String)>,
}

impl Handshake {
    pub fn new(host: String, path: String, protocols: Vec<String>) -> Self {
        Self {
            key: generate_key(),
            host,
            path,
            protocols,
            user_agent: USER_AGENT.to_string(),
            extra_headers: Vec::new(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn with_header(mut self, name: String, value: String) -> Self {
        self.extra_headers.push((name, value));
        self
    }

    /// Build the raw HTTP/1.1 upgrade request bytes.
    pub fn build_request(&self) -> Vec<u8> {
        let mut request = format!(
            "GET {path} HTTP/1.1\r\n\
             Host: {host}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {key}\r\n\
             Sec-WebSocket-Version: {version}\r\n\
             User-Agent: {ua}\r\n",
            path = self.path,
            host = self.host,
            key = self.key,
            version = WEBSOCKET_VERSION,
            ua = self.user_agent,
        );

        if !self.protocols.is_empty() {
            request.push_str(&format!(
                "Sec-WebSocket-Protocol: {}\r\n",
                self.protocols.join(", ")
            ));
        }

        for (name, value) in &self.extra_headers {
            request.push_str(&format!("{name}: {value}\r\n"));
        }

        request.push_str("\r\n");
        request.into_bytes()
    }

    /// Validate the server's response, returning what was negotiated or the
    /// specific handshake failure.
    pub fn validate_response(&self, response: &HandshakeResponse) -> Result<NegotiatedHandshake, Error> {
        if response.status != 101 {
            return Err(Error::HandshakeStatus(response.status));
        }

        let upgrade_ok = response
            .get("Upgrade")
            .map(|v| v.eq_ignore_ascii_case("websocket"))
            .unwrap_or(false);
        if !upgrade_ok {
            return Err(Error::HandshakeNoUpgrade);
        }

        let accept = response
            .get("Sec-WebSocket-Accept")
            .ok_or(Error::HandshakeNoAccept)?;
        let expected = accept_value(&self.key);
        if !accept.eq_ignore_ascii_case(&expected) {
            return Err(Error::HandshakeAcceptMismatch);
        }

        let protocol = response.get("Sec-WebSocket-Protocol");
        let extensions = response.get_list("Sec-WebSocket-Extensions");

        Ok(NegotiatedHandshake {
            protocol,
            extensions,
        })
    }
}

fn generate_key() -> String {
    let mut rng = StdRng::from_rng(rand::thread_rng()).expect("thread_rng must be seedable");
    let raw: [u8; 16] = rng.random();
    BASE64_STANDARD.encode(raw)
}

fn accept_value(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(WEBSOCKET_GUID.as_bytes());
    BASE64_STANDARD.encode(sha1.finalize())
}
