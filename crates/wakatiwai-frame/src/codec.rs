use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::command::{OBSERVE, RESPONSE};
use crate::error::{FrameError, Result};

/// Default cap on one inbound envelope, header included: 64 KiB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Default time the peer has to answer a command.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(1500);

/// Longest accepted header (`/resp:<command>:<length>:`).
pub const MAX_HEADER_LEN: usize = 256;

const LINE_TERMINATOR: &[u8] = b"\r\n";

/// What an inbound envelope is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeKind {
    /// `/resp:<command>:…`, the answer to an object command.
    Response { command: String },
    /// `/observe:…`, an unsolicited change notification.
    Observe,
}

/// A complete inbound envelope with its base64 payload decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub kind: EnvelopeKind,
    pub payload: Bytes,
}

impl Envelope {
    /// The command this envelope answers, or `observe`.
    pub fn command(&self) -> &str {
        match &self.kind {
            EnvelopeKind::Response { command } => command,
            EnvelopeKind::Observe => OBSERVE,
        }
    }

    /// Returns true for unsolicited observe notifications.
    pub fn is_observe(&self) -> bool {
        matches!(self.kind, EnvelopeKind::Observe)
    }
}

/// Encode an outbound envelope.
///
/// Wire format (one line):
/// ```text
/// /<command>:<decimal base64 length>:<base64 payload>\r\n
/// ```
pub fn encode_envelope(command: &str, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    validate_command(command)?;

    let encoded = STANDARD.encode(payload);
    let len_text = encoded.len().to_string();

    dst.reserve(command.len() + len_text.len() + encoded.len() + 3 + LINE_TERMINATOR.len());
    dst.put_u8(b'/');
    dst.put_slice(command.as_bytes());
    dst.put_u8(b':');
    dst.put_slice(len_text.as_bytes());
    dst.put_u8(b':');
    dst.put_slice(encoded.as_bytes());
    dst.put_slice(LINE_TERMINATOR);
    Ok(())
}

fn validate_command(command: &str) -> Result<()> {
    let valid = !command.is_empty()
        && command
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(FrameError::InvalidCommand(command.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    AwaitingHeader,
    AwaitingPayload { kind: EnvelopeKind, len: usize },
    /// A rejected line has not ended yet; drop bytes through the next `\n`.
    Discarding,
}

/// Incremental envelope decoder.
///
/// A small state machine over an accumulating buffer:
/// `AwaitingHeader` until the whole `/kind:…:<len>:` header has arrived,
/// then `AwaitingPayload` until `len` base64 characters are buffered, at
/// which point the envelope is complete, returned, and the decoder is back
/// to `AwaitingHeader`. Bytes after a complete envelope stay in the buffer.
///
/// Malformed or oversized headers are rejected and the rest of the offending
/// line is dropped, across as many reads as it takes to reach its `\n`, so
/// the next well-formed envelope still decodes.
#[derive(Debug, Clone)]
pub struct EnvelopeDecoder {
    state: State,
    max_message_size: usize,
}

enum HeaderScan {
    Partial,
    Invalid(String),
    Complete {
        kind: EnvelopeKind,
        len_text: (usize, usize),
        header_len: usize,
    },
}

impl EnvelopeDecoder {
    /// Create a decoder that rejects envelopes longer than `max_message_size`.
    pub fn new(max_message_size: usize) -> Self {
        Self {
            state: State::AwaitingHeader,
            max_message_size,
        }
    }

    /// Returns true if no envelope is partially decoded.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::AwaitingHeader)
    }

    /// Forget any partially decoded envelope.
    pub fn reset(&mut self) {
        self.state = State::AwaitingHeader;
    }

    /// Decode the next envelope from `src`.
    ///
    /// Returns `Ok(None)` if more bytes are needed. Consumes the envelope
    /// bytes from the buffer on success.
    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Envelope>> {
        if self.state == State::Discarding && !self.discard_line(src) {
            return Ok(None);
        }

        let (kind, len) = match std::mem::replace(&mut self.state, State::AwaitingHeader) {
            State::AwaitingPayload { kind, len } => (kind, len),
            State::AwaitingHeader | State::Discarding => match self.decode_header(src)? {
                Some(header) => header,
                None => return Ok(None),
            },
        };

        if src.len() < len {
            self.state = State::AwaitingPayload { kind, len };
            return Ok(None);
        }

        let text = src.split_to(len).freeze();
        let payload = STANDARD.decode(&text)?;
        Ok(Some(Envelope {
            kind,
            payload: Bytes::from(payload),
        }))
    }

    fn decode_header(&mut self, src: &mut BytesMut) -> Result<Option<(EnvelopeKind, usize)>> {
        let terminators = src
            .iter()
            .take_while(|b| matches!(b, b'\r' | b'\n'))
            .count();
        src.advance(terminators);
        if src.is_empty() {
            return Ok(None);
        }

        let (kind, (start, end), header_len) = match scan_header(src) {
            HeaderScan::Partial => return Ok(None),
            HeaderScan::Invalid(reason) => return Err(self.reject(src, reason)),
            HeaderScan::Complete {
                kind,
                len_text,
                header_len,
            } => (kind, len_text, header_len),
        };

        let len = match parse_length(&src[start..end]) {
            Some(len) => len,
            None => {
                let reason = format!(
                    "invalid payload length {:?}",
                    String::from_utf8_lossy(&src[start..end])
                );
                return Err(self.reject(src, reason));
            }
        };

        let total = header_len.saturating_add(len);
        if total > self.max_message_size {
            debug!(size = total, buffered = src.len(), "discarding oversized envelope line");
            self.discard_line(src);
            return Err(FrameError::MessageTooLarge {
                size: total,
                max: self.max_message_size,
            });
        }

        src.advance(header_len);
        Ok(Some((kind, len)))
    }

    fn reject(&mut self, src: &mut BytesMut, reason: String) -> FrameError {
        debug!(%reason, buffered = src.len(), "discarding malformed envelope line");
        self.discard_line(src);
        FrameError::Malformed(reason)
    }

    /// Drop bytes through the next `\n`.
    ///
    /// Returns false if the line has not ended yet, in which case the decoder
    /// keeps discarding on later calls.
    fn discard_line(&mut self, src: &mut BytesMut) -> bool {
        match src.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                src.advance(pos + 1);
                self.state = State::AwaitingHeader;
                true
            }
            None => {
                src.clear();
                self.state = State::Discarding;
                false
            }
        }
    }
}

impl Default for EnvelopeDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}

fn scan_header(src: &[u8]) -> HeaderScan {
    if src[0] != b'/' {
        return HeaderScan::Invalid(format!("expected '/', found {:#04x}", src[0]));
    }

    let mut colons = [0usize; 3];
    let mut found = 0usize;
    let mut needed = usize::MAX;

    for (i, &b) in src.iter().enumerate().take(MAX_HEADER_LEN).skip(1) {
        match b {
            b':' => {
                colons[found] = i;
                found += 1;
                if found == 1 {
                    needed = match &src[1..i] {
                        k if k == RESPONSE.as_bytes() => 3,
                        k if k == OBSERVE.as_bytes() => 2,
                        other => {
                            return HeaderScan::Invalid(format!(
                                "unknown envelope kind {:?}",
                                String::from_utf8_lossy(other)
                            ))
                        }
                    };
                }
                if found == needed {
                    break;
                }
            }
            b'\r' | b'\n' => return HeaderScan::Invalid("header ends before payload".into()),
            _ => {}
        }
    }

    if found < needed {
        if src.len() >= MAX_HEADER_LEN {
            return HeaderScan::Invalid(format!("header longer than {MAX_HEADER_LEN} bytes"));
        }
        return HeaderScan::Partial;
    }

    if needed == 3 {
        let command = &src[colons[0] + 1..colons[1]];
        let command = match std::str::from_utf8(command) {
            Ok(command) if !command.is_empty() => command.to_string(),
            _ => return HeaderScan::Invalid("missing response command".into()),
        };
        HeaderScan::Complete {
            kind: EnvelopeKind::Response { command },
            len_text: (colons[1] + 1, colons[2]),
            header_len: colons[2] + 1,
        }
    } else {
        HeaderScan::Complete {
            kind: EnvelopeKind::Observe,
            len_text: (colons[0] + 1, colons[1]),
            header_len: colons[1] + 1,
        }
    }
}

fn parse_length(text: &[u8]) -> Option<usize> {
    if text.is_empty() || !text.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(text).ok()?.parse().ok()
}

/// Configuration for envelope I/O.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum inbound envelope size in bytes, header included. Default: 64 KiB.
    pub max_message_size: usize,
    /// How long to wait for a response. Default: 1.5 s.
    pub read_timeout: Option<Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
        }
    }
}
