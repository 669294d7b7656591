use std::io::ErrorKind;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use tracing::trace;
use wakatiwai_transport::InboundStream;

use crate::codec::{Envelope, EnvelopeDecoder, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete envelopes from an [`InboundStream`].
///
/// Handles partial reads internally: the peer may deliver a line in any
/// number of `read` calls, and callers always get complete envelopes.
/// Every wait is bounded by the deadline of the current call.
pub struct EnvelopeReader<T> {
    inner: T,
    buf: BytesMut,
    decoder: EnvelopeDecoder,
    config: FrameConfig,
}

impl<T: InboundStream> EnvelopeReader<T> {
    /// Create a new envelope reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new envelope reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            decoder: EnvelopeDecoder::new(config.max_message_size),
            config,
        }
    }

    /// Read the next complete envelope, waiting at most the configured read timeout.
    pub fn read_envelope(&mut self) -> Result<Envelope> {
        self.read_envelope_within(self.config.read_timeout)
    }

    /// Read the next complete envelope, waiting at most `timeout` in total.
    ///
    /// Returns `FrameError::TimedOut` if nothing arrived and
    /// `FrameError::Incomplete` if the deadline passed mid-envelope.
    pub fn read_envelope_within(&mut self, timeout: Option<Duration>) -> Result<Envelope> {
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));

        loop {
            if let Some(envelope) = self.decoder.decode(&mut self.buf)? {
                trace!(
                    command = envelope.command(),
                    size = envelope.payload.len(),
                    "envelope received"
                );
                return Ok(envelope);
            }

            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            if !self.inner.wait_readable(remaining)? {
                return Err(self.deadline_error(timeout));
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Returns true if bytes of a further envelope are already buffered.
    pub fn has_buffered(&self) -> bool {
        !self.decoder.is_idle() || self.buf.iter().any(|b| !matches!(b, b'\r' | b'\n'))
    }

    fn deadline_error(&self, timeout: Option<Duration>) -> FrameError {
        if self.has_buffered() {
            FrameError::Incomplete {
                received: self.buf.len(),
            }
        } else {
            FrameError::TimedOut(timeout.unwrap_or_default())
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current envelope reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
