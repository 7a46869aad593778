//! Application-level messages and the assembler that joins fragmented
//! frames back into them.

use crate::compression::Decoder;
use crate::error::Error;
use crate::frame::{Frame, OpCode};
use crate::utf8::Utf8Validator;

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close { code: Option<u16>, reason: String },
}

impl Message {
    pub fn as_binary(&self) -> Vec<u8> {
        match self {
            Message::Text(text) => text.as_bytes().to_vec(),
            Message::Binary(data) => data.clone(),
            Message::Ping(data) | Message::Pong(data) => data.clone(),
            Message::Close { reason, .. } => reason.as_bytes().to_vec(),
        }
    }

    /// Split a Text/Binary message into a run of frames no larger than
    /// `max_frame_size`, the first carrying the real opcode and the rest
    /// `Continuation`, with `fin` set only on the last.
    pub fn to_frames(self, max_frame_size: usize) -> Result<Vec<Frame>, Error> {
        let (opcode, payload) = match self {
            Message::Text(text) => (OpCode::Text, text.into_bytes()),
            Message::Binary(data) => (OpCode::Binary, data),
            Message::Ping(data) => (OpCode::Ping, data),
            Message::Pong(data) => (OpCode::Pong, data),
            Message::Close { code, reason } => (OpCode::Close, build_close_payload(code, reason)),
        };

        if payload.is_empty() {
            return Ok(vec![Frame::new(true, opcode, payload)]);
        }

        if opcode.is_control() {
            // Control frames are never fragmented regardless of size; a
            // caller handing a control message bigger than 125 bytes gets
            // caught by `Frame::validate` downstream.
            return Ok(vec![Frame::new(true, opcode, payload)]);
        }

        let mut frames = Vec::new();
        for chunk in payload.chunks(max_frame_size.max(1)) {
            let op = if frames.is_empty() {
                opcode
            } else {
                OpCode::Continuation
            };
            frames.push(Frame::new(false, op, chunk.to_vec()));
        }
        if let Some(last) = frames.last_mut() {
            last.fin = true;
        }
        Ok(frames)
    }
}

/// Big-endian u16 code + UTF-8 reason, per RFC 6455 §5.5.1 / §7.4.
fn build_close_payload(code: Option<u16>, reason: String) -> Vec<u8> {
    match code {
        None => Vec::new(),
        Some(code) => {
            let mut out = code.to_be_bytes().to_vec();
            out.extend_from_slice(reason.as_bytes());
            out
        }
    }
}

/// Reserved / forbidden-on-the-wire close codes (RFC 6455 §7.4.1): 1005 and
/// 1006 are reserved for internal use by an endpoint's API and must never
/// appear on the wire, 1015 is reserved for a failed TLS handshake. Every
/// other code in 1000-4999 is accepted from a peer.
pub fn is_reserved_close_code(code: u16) -> bool {
    matches!(code, 1005 | 1006 | 1015) || !(1000..=4999).contains(&code)
}

enum InFlight {
    None,
    Fragmented {
        opcode: OpCode,
        buffer: Vec<u8>,
        validator: Option<Utf8Validator>,
        compressed: bool,
    },
}

/// Joins a stream of frames into `Message`s, applying the fragmentation
/// rules of RFC 6455 §5.4: control frames may interleave with an in-progress
/// fragmented message and are delivered immediately; a `Continuation` frame
/// with nothing in flight, or a new `Text`/`Binary` frame while one is
/// already in flight, are both protocol errors.
pub struct MessageAssembler {
    in_flight: InFlight,
    max_message_size: usize,
}

impl MessageAssembler {
    pub fn new(max_message_size: usize) -> Self {
        Self {
            in_flight: InFlight::None,
            max_message_size,
        }
    }

    /// Feed one validated `Frame` in. Returns `Some(Message)` once a
    /// complete message (control, or the final fragment of one) is ready.
    ///
    /// `decoder` is the `permessage-deflate` inflater to apply when a
    /// message's leading frame carries RSV1 — only present if the caller
    /// opted into compression and the server negotiated the extension.
    /// A `Frame` arriving with `rsv1` set while `decoder` is `None` means
    /// `Frame::validate` already rejected it upstream, so that combination
    /// never reaches here.
    pub fn feed(
        &mut self,
        frame: Frame,
        decoder: Option<&mut Decoder>,
    ) -> Result<Option<Message>, Error> {
        match frame.opcode {
            OpCode::Ping => return Ok(Some(Message::Ping(frame.payload))),
            OpCode::Pong => return Ok(Some(Message::Pong(frame.payload))),
            OpCode::Close => return Ok(Some(self.assemble_close(frame.payload)?)),
            OpCode::Continuation => {
                return self.feed_continuation(frame, decoder);
            }
            OpCode::Text | OpCode::Binary => {}
        }

        if matches!(self.in_flight, InFlight::Fragmented { .. }) {
            return Err(Error::FragmentedInProgress);
        }

        if frame.fin {
            return Ok(Some(self.finish_single(frame, decoder)?));
        }

        if frame.payload.len() > self.max_message_size {
            return Err(Error::CriticalProtocolError(
                "message exceeds max_message_size".to_string(),
            ));
        }

        // A compressed message's UTF-8 validity can only be checked once
        // the whole thing is inflated, so fragments aren't streamed through
        // the validator in that case.
        let compressed = frame.rsv1;
        let validator = if frame.opcode == OpCode::Text && !compressed {
            let mut v = Utf8Validator::new();
            if !v.push_slice(&frame.payload) {
                return Err(Error::InvalidUtf8);
            }
            Some(v)
        } else {
            None
        };

        self.in_flight = InFlight::Fragmented {
            opcode: frame.opcode,
            buffer: frame.payload,
            validator,
            compressed,
        };
        Ok(None)
    }

    fn feed_continuation(
        &mut self,
        frame: Frame,
        decoder: Option<&mut Decoder>,
    ) -> Result<Option<Message>, Error> {
        let in_flight = std::mem::replace(&mut self.in_flight, InFlight::None);
        match in_flight {
            InFlight::None => Err(Error::InvalidContinuationFrame),
            InFlight::Fragmented {
                opcode,
                mut buffer,
                mut validator,
                compressed,
            } => {
                if buffer.len() + frame.payload.len() > self.max_message_size {
                    return Err(Error::CriticalProtocolError(
                        "message exceeds max_message_size".to_string(),
                    ));
                }
                if let Some(v) = validator.as_mut() {
                    if !v.push_slice(&frame.payload) {
                        return Err(Error::InvalidUtf8);
                    }
                }
                buffer.extend_from_slice(&frame.payload);

                if !frame.fin {
                    self.in_flight = InFlight::Fragmented {
                        opcode,
                        buffer,
                        validator,
                        compressed,
                    };
                    return Ok(None);
                }

                if let Some(v) = &validator {
                    if !v.is_accept_state() {
                        return Err(Error::InvalidUtf8);
                    }
                }

                let payload = inflate_if_needed(buffer, compressed, decoder)?;
                let message = match opcode {
                    OpCode::Text => {
                        if compressed && !crate::utf8::is_valid_utf8(&payload) {
                            return Err(Error::InvalidUtf8);
                        }
                        Message::Text(String::from_utf8(payload)?)
                    }
                    OpCode::Binary => Message::Binary(payload),
                    _ => unreachable!("only Text/Binary start a fragmented sequence"),
                };
                Ok(Some(message))
            }
        }
    }

    fn finish_single(
        &mut self,
        frame: Frame,
        decoder: Option<&mut Decoder>,
    ) -> Result<Message, Error> {
        let compressed = frame.rsv1;
        let payload = inflate_if_needed(frame.payload, compressed, decoder)?;
        match frame.opcode {
            OpCode::Text => {
                if !crate::utf8::is_valid_utf8(&payload) {
                    return Err(Error::InvalidUtf8);
                }
                Ok(Message::Text(String::from_utf8(payload)?))
            }
            OpCode::Binary => Ok(Message::Binary(payload)),
            _ => unreachable!(),
        }
    }

    fn assemble_close(&self, payload: Vec<u8>) -> Result<Message, Error> {
        match payload.len() {
            0 => Ok(Message::Close {
                code: None,
                reason: String::new(),
            }),
            1 => Err(Error::MalformedClosePayload),
            _ => {
                let code = u16::from_be_bytes([payload[0], payload[1]]);
                if is_reserved_close_code(code) {
                    return Err(Error::ReservedCloseCode(code));
                }
                let reason = String::from_utf8(payload[2..].to_vec())
                    .map_err(|_| Error::InvalidUtf8CloseReason)?;
                Ok(Message::Close {
                    code: Some(code),
                    reason,
                })
            }
        }
    }
}

/// Inflate `payload` when its message was marked compressed, using whatever
/// decoder the caller negotiated. A compressed frame reaching here with no
/// decoder available is a protocol error — the caller offered no extension
/// to decompress against.
fn inflate_if_needed(
    payload: Vec<u8>,
    compressed: bool,
    decoder: Option<&mut Decoder>,
) -> Result<Vec<u8>, Error> {
    if !compressed {
        return Ok(payload);
    }
    match decoder {
        Some(decoder) => decoder.decompress(&payload),
        None => Err(Error::ProtocolError(
            "compressed frame received without a negotiated extension".to_string(),
        )),
    }
}
