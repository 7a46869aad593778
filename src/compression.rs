//! `permessage-deflate` extension-parameter parsing, plus the flate2-backed
//! compress/decompress collaborator that applies them when a caller opts in
//! via `WebSocketConfig::enable_permessage_deflate` (Open Question 2:
//! this engine never advertises or negotiates the extension itself).
//!
//! Consolidates what the teacher's repo scatters across `extensions.rs`,
//! `compression.rs`, `decoder.rs` and `compress.rs` into one module.

use bytes::BytesMut;
use flate2::write::DeflateEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};
use std::io::Write;

use crate::error::Error;

const PERMESSAGE_DEFLATE: &str = "permessage-deflate";
const CLIENT_NO_CONTEXT_TAKEOVER: &str = "client_no_context_takeover";
const SERVER_NO_CONTEXT_TAKEOVER: &str = "server_no_context_takeover";
const CLIENT_MAX_WINDOW_BITS: &str = "client_max_window_bits";
const SERVER_MAX_WINDOW_BITS: &str = "server_max_window_bits";

/// A four-byte trailer flate2 expects appended before flushing a decode, to
/// match the stripped trailer `permessage-deflate` removes from each message
/// (RFC 7692 §7.2.1).
const DEFLATE_TRAILER: [u8; 4] = [0, 0, 255, 255];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extensions {
    pub permessage_deflate: bool,
    pub client_no_context_takeover: bool,
    pub server_no_context_takeover: bool,
    pub client_max_window_bits: Option<u8>,
    pub server_max_window_bits: Option<u8>,
}

/// Parse a `Sec-WebSocket-Extensions` header value into its
/// `permessage-deflate` parameters. Returns `None` if the extension wasn't
/// offered at all.
pub fn parse_extensions(header_value: &str) -> Result<Option<Extensions>, Error> {
    let mut extensions = Extensions::default();

    for part in header_value.split(';') {
        let part = part.trim();
        if part == PERMESSAGE_DEFLATE {
            extensions.permessage_deflate = true;
        } else if part.starts_with(CLIENT_NO_CONTEXT_TAKEOVER) {
            extensions.client_no_context_takeover = true;
        } else if part.starts_with(SERVER_NO_CONTEXT_TAKEOVER) {
            extensions.server_no_context_takeover = true;
        } else if let Some(bits) = parse_window_bits(part, CLIENT_MAX_WINDOW_BITS)? {
            extensions.client_max_window_bits = Some(bits);
        } else if let Some(bits) = parse_window_bits(part, SERVER_MAX_WINDOW_BITS)? {
            extensions.server_max_window_bits = Some(bits);
        }
    }

    if !extensions.permessage_deflate {
        return Ok(None);
    }
    Ok(Some(extensions))
}

fn parse_window_bits(part: &str, prefix: &str) -> Result<Option<u8>, Error> {
    if !part.starts_with(prefix) {
        return Ok(None);
    }
    let bits = match part.split_once('=') {
        None => 15,
        Some((_, value)) => value
            .trim()
            .parse::<u8>()
            .map_err(|_| Error::InvalidMaxWindowBits)?,
    };
    if !(8..=15).contains(&bits) {
        return Err(Error::InvalidMaxWindowBits);
    }
    Ok(Some(bits))
}

/// Build the request-side `Sec-WebSocket-Extensions` header value a caller
/// would send to offer `permessage-deflate` with the given window bits.
pub fn build_extension_header(client_max_window_bits: Option<u8>) -> String {
    let mut value = PERMESSAGE_DEFLATE.to_string();
    if let Some(bits) = client_max_window_bits {
        value.push_str(&format!("; {CLIENT_MAX_WINDOW_BITS}={bits}"));
    }
    value
}

/// Decompresses `permessage-deflate` message payloads, optionally resetting
/// its sliding window per message (`no_context_takeover`).
pub struct Decoder {
    decompressor: Decompress,
    reset_context: bool,
}

impl Decoder {
    pub fn new(reset_context: bool, window_bits: Option<u8>) -> Self {
        let decompressor = match window_bits {
            Some(bits) => Decompress::new_with_window_bits(false, bits),
            None => Decompress::new(false),
        };
        Self {
            decompressor,
            reset_context,
        }
    }

    pub fn decompress(&mut self, payload: &[u8]) -> Result<Vec<u8>, Error> {
        let mut input = BytesMut::from(payload);
        input.extend_from_slice(&DEFLATE_TRAILER);

        if self.reset_context {
            self.decompressor.reset(false);
        }

        let mut out = Vec::with_capacity(input.len() * 4);
        let mut chunk = vec![0u8; 8192];
        let before_in = self.decompressor.total_in();

        while self.decompressor.total_in() - before_in < input.len() as u64 {
            let consumed = (self.decompressor.total_in() - before_in) as usize;
            let remaining = &input[consumed..];
            let before_out = self.decompressor.total_out();
            let status = self
                .decompressor
                .decompress(remaining, &mut chunk, FlushDecompress::Sync)
                .map_err(|e| Error::IOError { source: e.into() })?;
            let produced = (self.decompressor.total_out() - before_out) as usize;
            out.extend_from_slice(&chunk[..produced]);
            if matches!(status, Status::StreamEnd | Status::BufError) {
                break;
            }
        }

        Ok(out)
    }
}

/// Compresses outgoing `permessage-deflate` message payloads.
pub struct Encoder {
    reset_context: bool,
}

impl Encoder {
    pub fn new(reset_context: bool) -> Self {
        Self { reset_context }
    }

    /// Deflate `payload` and strip the trailing `00 00 FF FF` marker, as
    /// `permessage-deflate` requires (RFC 7692 §7.2.1).
    pub fn compress(&mut self, payload: &[u8]) -> Result<Vec<u8>, Error> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload)?;
        let mut compressed = encoder.finish()?;
        if compressed.ends_with(&DEFLATE_TRAILER) {
            compressed.truncate(compressed.len() - DEFLATE_TRAILER.len());
        }
        let _ = self.reset_context;
        Ok(compressed)
    }
}
