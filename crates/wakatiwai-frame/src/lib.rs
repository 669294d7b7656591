//! Base64 line envelopes for the stdio bridge.
//!
//! Every message exchanged with the peer process is one text line:
//! - outbound: `/<command>:<base64 length>:<base64 payload>\r\n`
//! - inbound response: `/resp:<command>:<base64 length>:<base64 payload>`
//! - inbound unsolicited: `/observe:<base64 length>:<base64 payload>`
//!
//! The reader reassembles envelopes from arbitrarily fragmented reads and
//! hands callers decoded payload bytes.

pub mod codec;
pub mod command;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    encode_envelope, Envelope, EnvelopeDecoder, EnvelopeKind, FrameConfig,
    DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_READ_TIMEOUT, MAX_HEADER_LEN,
};
pub use command::{
    expects_response, BACKUP, CREATE, DELETE, DISCOVER, EXECUTE, HEARTBEAT, OBSERVE, READ, READ_INSTANCES,
    RESPONSE, RESTORE, STATE_CHANGED, WRITE,
};
pub use error::{FrameError, Result};
pub use reader::EnvelopeReader;
pub use writer::EnvelopeWriter;
