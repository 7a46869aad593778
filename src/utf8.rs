//! Incremental UTF-8 validation, so a TEXT message can be checked byte by
//! byte as its payload streams in across one or more (possibly fragmented)
//! frames, instead of buffering the whole message before validating it.
//!
//! Uses Bjoern Hoehrmann's table-driven DFA
//! (https://bjoern.hoehrmann.de/utf-8/decoder/dfa/), a well-known
//! public-domain construction: 9 character classes feeding a 12-state
//! transition table keyed on `state * 16 + class`.

pub const UTF8_ACCEPT: u32 = 0;
pub const UTF8_REJECT: u32 = 12;

#[rustfmt::skip]
const UTF8D: [u8; 364] = [
    // The first part of the table maps bytes to character classes.
    0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0, 0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,
    0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0, 0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,
    1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1, 9,9,9,9,9,9,9,9,9,9,9,9,9,9,9,9,
    7,7,7,7,7,7,7,7,7,7,7,7,7,7,7,7, 7,7,7,7,7,7,7,7,7,7,7,7,7,7,7,7,
    8,8,2,2,2,2,2,2,2,2,2,2,2,2,2,2, 2,2,2,2,2,2,2,2,2,2,2,2,2,2,2,2,
    10,3,3,3,3,3,3,3,3,3,3,3,3,4,3,3, 11,6,6,6,5,8,8,8,8,8,8,8,8,8,8,8,

    // The second part of the table maps a state to a new state when
    // adding a character class.
    0,12,24,36,60,96,84,12,12,12,48,72, 12,12,12,12,12,12,12,12,12,12,12,12,
    12, 0,12,12,12,12,12, 0,12, 0,12,12, 12,24,12,12,12,12,12,24,12,24,12,12,
    12,12,12,12,12,12,12,24,12,12,12,12, 12,24,12,12,12,12,12,12,12,24,12,12,
    12,12,12,12,12,12,12,36,12,36,12,12, 12,36,12,12,12,12,12,36,12,36,12,12,
    12,36,12,12,12,12,12,12,12,12,12,12,
];

/// One instance of the DFA's running state, persisted across frame
/// boundaries within a single TEXT message.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Validator {
    state: u32,
}

impl Utf8Validator {
    pub fn new() -> Self {
        Self { state: UTF8_ACCEPT }
    }

    /// Feed one byte through the DFA.
    ///
    /// Returns `false` the moment the input is provably invalid UTF-8
    /// (`UTF8_REJECT`); once rejected the validator stays rejected until
    /// `reset()`.
    pub fn push(&mut self, byte: u8) -> bool {
        if self.state == UTF8_REJECT {
            return false;
        }
        let class = UTF8D[byte as usize] as u32;
        self.state = UTF8D[(256 + self.state as usize + class as usize)] as u32;
        self.state != UTF8_REJECT
    }

    /// Feed a whole slice through the DFA.
    pub fn push_slice(&mut self, bytes: &[u8]) -> bool {
        for &b in bytes {
            if !self.push(b) {
                return false;
            }
        }
        true
    }

    /// `true` once the bytes fed so far form one or more complete, valid
    /// code points with nothing left dangling mid-sequence.
    pub fn is_accept_state(&self) -> bool {
        self.state == UTF8_ACCEPT
    }

    pub fn is_rejected(&self) -> bool {
        self.state == UTF8_REJECT
    }

    /// Reset to the initial state — called after a complete (fin=1) TEXT
    /// message, and whenever the connection disconnects.
    pub fn reset(&mut self) {
        self.state = UTF8_ACCEPT;
    }
}

/// One-shot validation helper for a complete, already-assembled buffer
/// (used for CLOSE reasons, which are not streamed incrementally).
pub fn is_valid_utf8(bytes: &[u8]) -> bool {
    let mut validator = Utf8Validator::new();
    validator.push_slice(bytes) && validator.is_accept_state()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ascii() {
        assert!(is_valid_utf8(b"Hello, World!"));
    }

    #[test]
    fn accepts_multibyte() {
        assert!(is_valid_utf8("héllo wörld 日本語".as_bytes()));
    }

    #[test]
    fn rejects_truncated_sequence() {
        // 0xC3 starts a 2-byte sequence but nothing follows.
        assert!(!is_valid_utf8(&[0xc3]));
    }

    #[test]
    fn rejects_invalid_continuation() {
        // From spec.md S3: 0xc3 0x28 is an invalid 2-byte sequence.
        assert!(!is_valid_utf8(&[0xc3, 0x28]));
    }

    #[test]
    fn validates_incrementally_across_chunks() {
        let text = "日本語".as_bytes();
        let mut validator = Utf8Validator::new();
        for chunk in text.chunks(2) {
            assert!(validator.push_slice(chunk));
        }
        assert!(validator.is_accept_state());
    }

    #[test]
    fn reset_clears_rejected_state() {
        let mut validator = Utf8Validator::new();
        assert!(!validator.push_slice(&[0xc3, 0x28]));
        assert!(validator.is_rejected());
        validator.reset();
        assert!(validator.is_accept_state());
        assert!(validator.push_slice(b"ok"));
    }

    #[test]
    fn empty_input_is_accept_state() {
        assert!(is_valid_utf8(b""));
    }
}
