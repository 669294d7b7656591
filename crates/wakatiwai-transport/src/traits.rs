use std::io::{Cursor, Read};
use std::time::Duration;

use crate::error::Result;

/// A readable byte stream that can wait for readability without consuming data.
///
/// This is the fundamental input type of the bridge. In production it wraps
/// the process's standard input; tests use socket pairs or in-memory cursors.
pub trait InboundStream: Read {
    /// Block until a read will not block, or until `timeout` elapses.
    ///
    /// Returns `Ok(true)` when the stream is readable (including end of
    /// stream, which reads as zero bytes) and `Ok(false)` on timeout.
    /// `None` waits indefinitely.
    fn wait_readable(&mut self, timeout: Option<Duration>) -> Result<bool>;
}

impl<T: InboundStream + ?Sized> InboundStream for &mut T {
    fn wait_readable(&mut self, timeout: Option<Duration>) -> Result<bool> {
        (**self).wait_readable(timeout)
    }
}

impl<T: InboundStream + ?Sized> InboundStream for Box<T> {
    fn wait_readable(&mut self, timeout: Option<Duration>) -> Result<bool> {
        (**self).wait_readable(timeout)
    }
}

/// In-memory streams never block: they are always readable.
impl<T: AsRef<[u8]>> InboundStream for Cursor<T> {
    fn wait_readable(&mut self, _timeout: Option<Duration>) -> Result<bool> {
        Ok(true)
    }
}
