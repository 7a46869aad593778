//! A resumable reader over an append-only byte stream.
//!
//! Bytes arrive in arbitrary chunks from the transport and a frame's header
//! or payload may straddle a chunk boundary. Rather than a generator (lomond's
//! `parser.py` uses Python's coroutine-style generators to suspend mid-parse),
//! the reader is translated here as an explicit enum-tagged continuation:
//! whichever read is outstanding is stored in `Pending`, and each call to
//! `feed` resumes it against the newly-appended bytes.

use bytes::{Buf, BytesMut};

use crate::error::Error;

/// What the parser is currently waiting on.
enum Pending {
    /// Nothing outstanding; the next call chooses a new read.
    Idle,
    ReadExact { remaining: usize },
    ReadUntil {
        sep: u8,
        max_bytes: usize,
    },
}

/// Outcome of one resumed read.
pub enum ReadOutcome {
    /// Not enough bytes buffered yet; wait for more input.
    Pending,
    Exact(Vec<u8>),
    Until(Vec<u8>),
}

/// Buffers incoming bytes and resumes whichever read was last requested.
pub struct ByteParser {
    buf: BytesMut,
    pending: Pending,
    eof: bool,
}

impl Default for ByteParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteParser {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
            pending: Pending::Idle,
            eof: false,
        }
    }

    /// Reset to a fresh, empty parser — used when a connection resets.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.pending = Pending::Idle;
        self.eof = false;
    }

    /// Append newly-received bytes. An empty chunk marks EOF: any further
    /// `feed` call (other than another empty one) is an error.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<(), Error> {
        if self.eof {
            return Err(Error::ParserAlreadyClosed);
        }
        if chunk.is_empty() {
            self.eof = true;
        } else {
            self.buf.extend_from_slice(chunk);
        }
        Ok(())
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Request (or resume) a read of exactly `n` bytes.
    pub fn try_read_exact(&mut self, n: usize) -> Result<ReadOutcome, Error> {
        if matches!(self.pending, Pending::Idle) {
            self.pending = Pending::ReadExact { remaining: n };
        }
        let remaining = match self.pending {
            Pending::ReadExact { remaining } => remaining,
            _ => unreachable!("try_read_exact called while a different read is outstanding"),
        };

        if self.buf.len() < remaining {
            if self.eof {
                return Err(Error::UnexpectedEof);
            }
            return Ok(ReadOutcome::Pending);
        }

        let out = self.buf.split_to(remaining).to_vec();
        self.pending = Pending::Idle;
        Ok(ReadOutcome::Exact(out))
    }

    /// Request (or resume) a read up to and including the next `sep` byte,
    /// bounded by `max_bytes` total (separator included) to guard against an
    /// unbounded buffer growth from a misbehaving peer.
    pub fn try_read_until(&mut self, sep: u8, max_bytes: usize) -> Result<ReadOutcome, Error> {
        if matches!(self.pending, Pending::Idle) {
            self.pending = Pending::ReadUntil { sep, max_bytes };
        }
        let (sep, max_bytes) = match self.pending {
            Pending::ReadUntil { sep, max_bytes } => (sep, max_bytes),
            _ => unreachable!("try_read_until called while a different read is outstanding"),
        };

        match self.buf.iter().position(|&b| b == sep) {
            Some(idx) => {
                if idx + 1 > max_bytes {
                    return Err(Error::Overflow { max_bytes });
                }
                let out = self.buf.split_to(idx + 1).to_vec();
                self.pending = Pending::Idle;
                Ok(ReadOutcome::Until(out))
            }
            None => {
                if self.buf.len() > max_bytes {
                    return Err(Error::Overflow { max_bytes });
                }
                if self.eof {
                    return Err(Error::UnexpectedEof);
                }
                Ok(ReadOutcome::Pending)
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_exact_across_chunks() {
        let mut parser = ByteParser::new();
        parser.feed(b"ab").unwrap();
        assert!(matches!(
            parser.try_read_exact(5).unwrap(),
            ReadOutcome::Pending
        ));
        parser.feed(b"cde").unwrap();
        match parser.try_read_exact(5).unwrap() {
            ReadOutcome::Exact(bytes) => assert_eq!(bytes, b"abcde"),
            _ => panic!("expected Exact"),
        }
    }

    #[test]
    fn read_until_finds_separator_across_feeds() {
        let mut parser = ByteParser::new();
        parser.feed(b"GET / HTTP/1.1\r\n").unwrap();
        parser.feed(b"Host: example.com\r\n").unwrap();
        parser.feed(b"\r\n").unwrap();
        match parser.try_read_until(b'\n', 1024).unwrap() {
            ReadOutcome::Until(line) => assert_eq!(line, b"GET / HTTP/1.1\r\n"),
            _ => panic!("expected Until"),
        }
    }

    #[test]
    fn read_until_overflow() {
        let mut parser = ByteParser::new();
        parser.feed(&vec![b'x'; 100]).unwrap();
        assert!(matches!(
            parser.try_read_until(b'\n', 10),
            Err(Error::Overflow { max_bytes: 10 })
        ));
    }

    #[test]
    fn feed_after_eof_errors() {
        let mut parser = ByteParser::new();
        parser.feed(b"x").unwrap();
        parser.feed(b"").unwrap();
        assert!(parser.is_eof());
        assert!(matches!(
            parser.feed(b"y"),
            Err(Error::ParserAlreadyClosed)
        ));
    }

    #[test]
    fn eof_with_outstanding_read_is_unexpected_eof() {
        let mut parser = ByteParser::new();
        parser.feed(b"ab").unwrap();
        parser.feed(b"").unwrap();
        assert!(matches!(
            parser.try_read_exact(5),
            Err(Error::UnexpectedEof)
        ));
    }
}
