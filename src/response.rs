//! Parses the server's HTTP/1.1 upgrade response off the wire.
//!
//! Grounded on the teacher's `handshake.rs` (which reads a status line plus
//! headers by hand out of a growing buffer) and on `httparse`, already a
//! teacher dependency but previously only used for its `Error` type in
//! `error.rs` — here it does the actual parsing.

use crate::byte_parser::{ByteParser, ReadOutcome};
use crate::error::Error;

/// Cap on how many header bytes we'll buffer before giving up, matching the
/// teacher's `header_read`'s 16 KiB guard against a runaway server.
const MAX_HEADER_BYTES: usize = 16 * 1024;

const MAX_HEADERS: usize = 64;

#[derive(Debug, Clone)]
pub struct HandshakeResponse {
    pub status: u16,
    headers: Vec<(String, String)>,
}

impl HandshakeResponse {
    /// Case-insensitive lookup of a single header. If the header appeared
    /// more than once on the wire, the values are joined with `,` (matching
    /// how a comma-separated multi-value header is represented either way).
    pub fn get(&self, name: &str) -> Option<String> {
        let matches: Vec<&str> = self
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect();
        if matches.is_empty() {
            None
        } else {
            Some(matches.join(","))
        }
    }

    /// Comma-split, trimmed values of a header (e.g. `Sec-WebSocket-Protocol`).
    pub fn get_list(&self, name: &str) -> Vec<String> {
        match self.get(name) {
            Some(value) => value
                .split(',')
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect(),
            None => Vec::new(),
        }
    }
}

/// Reads the response off a `ByteParser` one `\r\n\r\n`-terminated chunk at
/// a time, the way `ByteParser::try_read_until` resumes across partial
/// reads, then hands the whole header block to `httparse`.
pub struct HandshakeResponseParser;

impl HandshakeResponseParser {
    /// Try to parse a complete response out of `parser`. Returns `Ok(None)`
    /// if the terminating blank line hasn't arrived yet.
    pub fn try_parse(parser: &mut ByteParser) -> Result<Option<HandshakeResponse>, Error> {
        let raw = match Self::read_header_block(parser)? {
            Some(raw) => raw,
            None => return Ok(None),
        };

        let mut header_storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut response = httparse::Response::new(&mut header_storage);
        match response.parse(&raw)? {
            httparse::Status::Complete(_) => {}
            httparse::Status::Partial => return Err(Error::HandshakeHeadersTooLarge),
        }

        let status = response.code.ok_or(Error::HandshakeHeadersTooLarge)?;
        let headers = response
            .headers
            .iter()
            .map(|h| {
                (
                    h.name.to_string(),
                    String::from_utf8_lossy(h.value).trim().to_string(),
                )
            })
            .collect();

        Ok(Some(HandshakeResponse { status, headers }))
    }

    fn read_header_block(parser: &mut ByteParser) -> Result<Option<Vec<u8>>, Error> {
        // httparse wants the whole header block (including the terminating
        // blank line) in one slice, so accumulate lines with read_until
        // until we see an empty one.
        let mut block = Vec::new();
        loop {
            match parser.try_read_until(b'\n', MAX_HEADER_BYTES)? {
                ReadOutcome::Pending => return Ok(None),
                ReadOutcome::Until(line) => {
                    let is_blank = matches!(line.as_slice(), b"\r\n" | b"\n");
                    block.extend_from_slice(&line);
                    if is_blank {
                        return Ok(Some(block));
                    }
                    if block.len() > MAX_HEADER_BYTES {
                        return Err(Error::HandshakeHeadersTooLarge);
                    }
                }
                _ => unreachable!(),
            }
        }
    }
}
