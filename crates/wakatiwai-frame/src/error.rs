use std::time::Duration;

/// Errors that can occur while encoding, reading or writing envelopes.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The envelope header could not be parsed.
    #[error("malformed envelope: {0}")]
    Malformed(String),

    /// A command name cannot be placed in an envelope header.
    #[error("invalid command name {0:?}")]
    InvalidCommand(String),

    /// The envelope exceeds the configured maximum message size.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// The envelope payload is not valid base64.
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Nothing arrived before the deadline.
    #[error("no envelope received within {0:?}")]
    TimedOut(Duration),

    /// Part of an envelope arrived, but not all of it, before the deadline.
    #[error("envelope incomplete at deadline ({received} bytes buffered)")]
    Incomplete { received: usize },

    /// An I/O error occurred while reading or writing envelopes.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Waiting on the inbound transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] wakatiwai_transport::TransportError),

    /// The stream ended before a complete envelope was received.
    #[error("connection closed (incomplete envelope)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
