use std::fs::File;
use std::io::{self, ErrorKind, Read};
use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::{Result, TransportError};
use crate::traits::InboundStream;

/// An inbound stream backed by a file descriptor, waited on with `poll(2)`.
///
/// Reads go straight to the descriptor: there is no user-space buffering
/// between the readiness check and the read, so a readable descriptor always
/// means the next `read` returns without blocking.
pub struct PollStream<T> {
    inner: T,
}

impl<T: Read + AsRawFd> PollStream<T> {
    /// Wrap a readable descriptor.
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the wrapper and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl PollStream<File> {
    /// Open an unbuffered handle on the process's standard input.
    ///
    /// The descriptor is duplicated, so dropping the stream never closes
    /// fd 0 itself.
    pub fn stdin() -> Result<Self> {
        let fd: OwnedFd = io::stdin()
            .as_fd()
            .try_clone_to_owned()
            .map_err(TransportError::Stdin)?;
        debug!(fd = fd.as_raw_fd(), "opened standard input for polling");
        Ok(Self::new(File::from(fd)))
    }
}

impl<T: Read + AsRawFd> Read for PollStream<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<T: Read + AsRawFd> InboundStream for PollStream<T> {
    fn wait_readable(&mut self, timeout: Option<Duration>) -> Result<bool> {
        poll_readable(self.inner.as_raw_fd(), timeout)
    }
}

impl<T> std::fmt::Debug for PollStream<T>
where
    T: AsRawFd,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollStream")
            .field("fd", &self.inner.as_raw_fd())
            .finish()
    }
}

fn poll_readable(fd: RawFd, timeout: Option<Duration>) -> Result<bool> {
    let timeout_ms = timeout_millis(timeout);
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };

    loop {
        // SAFETY: `pfd` is a valid, initialised pollfd and we pass exactly one entry.
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == ErrorKind::Interrupted {
                continue;
            }
            return Err(TransportError::Poll(err));
        }
        if rc == 0 {
            trace!(fd, timeout_ms, "poll timed out");
            return Ok(false);
        }
        // Hang-up and error conditions are surfaced by the following read.
        return Ok(pfd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0);
    }
}

/// Convert a timeout to poll(2) milliseconds, rounding up so that a
/// sub-millisecond remainder still waits instead of spinning.
fn timeout_millis(timeout: Option<Duration>) -> libc::c_int {
    match timeout {
        None => -1,
        Some(timeout) => {
            let millis = timeout.as_nanos().div_ceil(1_000_000);
            millis.min(libc::c_int::MAX as u128) as libc::c_int
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::os::unix::net::UnixStream;

    use super::*;

    #[test]
    fn timeout_conversion_rounds_up() {
        assert_eq!(timeout_millis(None), -1);
        assert_eq!(timeout_millis(Some(Duration::ZERO)), 0);
        assert_eq!(timeout_millis(Some(Duration::from_micros(10))), 1);
        assert_eq!(timeout_millis(Some(Duration::from_millis(1500))), 1500);
        assert_eq!(
            timeout_millis(Some(Duration::from_secs(u64::MAX))),
            libc::c_int::MAX
        );
    }

    #[test]
    fn idle_socket_times_out() {
        let (_left, right) = UnixStream::pair().unwrap();
        let mut stream = PollStream::new(right);
        assert!(!stream
            .wait_readable(Some(Duration::from_millis(10)))
            .unwrap());
    }

    #[test]
    fn pending_data_is_readable() {
        let (mut left, right) = UnixStream::pair().unwrap();
        let mut stream = PollStream::new(right);

        left.write_all(b"/resp:read:0:\r\n").unwrap();
        assert!(stream.wait_readable(Some(Duration::from_secs(1))).unwrap());

        let mut buf = [0u8; 32];
        let n = stream.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"/resp:read:0:\r\n");
    }

    #[test]
    fn closed_peer_reports_readable_eof() {
        let (left, right) = UnixStream::pair().unwrap();
        let mut stream = PollStream::new(right);
        drop(left);

        assert!(stream.wait_readable(Some(Duration::from_secs(1))).unwrap());
        let mut buf = [0u8; 4];
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn wakes_when_data_arrives_later() {
        let (mut left, right) = UnixStream::pair().unwrap();
        let mut stream = PollStream::new(right);

        let writer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            left.write_all(b"x").unwrap();
            left
        });

        assert!(stream.wait_readable(Some(Duration::from_secs(2))).unwrap());
        let _left = writer.join().unwrap();
    }

    #[test]
    fn accessors_and_into_inner() {
        let (_left, right) = UnixStream::pair().unwrap();
        let mut stream = PollStream::new(right);
        let _ = stream.get_ref();
        let _ = stream.get_mut();
        let _ = format!("{stream:?}");
        let _inner = stream.into_inner();
    }
}
