use std::collections::VecDeque;
use std::io::Write;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, trace};
use wakatiwai_frame::{
    expects_response, Envelope, EnvelopeReader, EnvelopeWriter, FrameConfig, FrameError,
    DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_READ_TIMEOUT,
};
use wakatiwai_transport::InboundStream;

use crate::error::{BridgeError, Result};

/// The request/response seam between objects and the peer process.
pub trait Exchange {
    /// Send `payload` under `command` and wait for the peer's answer.
    ///
    /// Returns the decoded, non-empty response payload.
    fn request(&mut self, command: &str, payload: &[u8]) -> Result<Bytes>;

    /// Send a notification that gets no answer.
    fn notify(&mut self, command: &str, payload: &[u8]) -> Result<()>;

    /// Wait up to `timeout` for an envelope the peer sent on its own.
    ///
    /// Returns `Ok(None)` if nothing arrived in time.
    fn next_unsolicited(&mut self, timeout: Duration) -> Result<Option<Envelope>>;
}

impl<T: Exchange + ?Sized> Exchange for &mut T {
    fn request(&mut self, command: &str, payload: &[u8]) -> Result<Bytes> {
        (**self).request(command, payload)
    }

    fn notify(&mut self, command: &str, payload: &[u8]) -> Result<()> {
        (**self).notify(command, payload)
    }

    fn next_unsolicited(&mut self, timeout: Duration) -> Result<Option<Envelope>> {
        (**self).next_unsolicited(timeout)
    }
}

impl<T: Exchange + ?Sized> Exchange for Box<T> {
    fn request(&mut self, command: &str, payload: &[u8]) -> Result<Bytes> {
        (**self).request(command, payload)
    }

    fn notify(&mut self, command: &str, payload: &[u8]) -> Result<()> {
        (**self).notify(command, payload)
    }

    fn next_unsolicited(&mut self, timeout: Duration) -> Result<Option<Envelope>> {
        (**self).next_unsolicited(timeout)
    }
}

/// Channel configuration.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// How long the peer has to answer a request. Default: 1.5 s.
    pub response_timeout: Duration,
    /// Maximum inbound envelope size, header included. Default: 64 KiB.
    pub max_message_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            response_timeout: DEFAULT_READ_TIMEOUT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// Request/response channel over a pair of byte streams.
///
/// One request is outstanding at a time. Observe notifications that arrive
/// while a response is awaited are queued and handed out by
/// [`Exchange::next_unsolicited`].
pub struct Channel<R, W> {
    reader: EnvelopeReader<R>,
    writer: EnvelopeWriter<W>,
    config: ChannelConfig,
    pending: VecDeque<Envelope>,
}

impl<R: InboundStream, W: Write> Channel<R, W> {
    /// Create a channel with default configuration.
    pub fn new(inbound: R, outbound: W) -> Self {
        Self::with_config(inbound, outbound, ChannelConfig::default())
    }

    /// Create a channel with explicit configuration.
    pub fn with_config(inbound: R, outbound: W, config: ChannelConfig) -> Self {
        let frame_config = FrameConfig {
            max_message_size: config.max_message_size,
            read_timeout: Some(config.response_timeout),
        };
        Self {
            reader: EnvelopeReader::with_config(inbound, frame_config),
            writer: EnvelopeWriter::new(outbound),
            config,
            pending: VecDeque::new(),
        }
    }

    /// Current channel configuration.
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Number of queued unsolicited envelopes.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Consume the channel and return the inbound and outbound streams.
    pub fn into_inner(self) -> (R, W) {
        (self.reader.into_inner(), self.writer.into_inner())
    }

    fn await_response(&mut self, command: &str) -> Result<Bytes> {
        let timeout = self.config.response_timeout;
        let deadline = Instant::now().checked_add(timeout);

        loop {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            let envelope = match self.reader.read_envelope_within(remaining) {
                Ok(envelope) => envelope,
                Err(FrameError::TimedOut(_)) => {
                    return Err(BridgeError::Timeout {
                        command: command.to_string(),
                        timeout,
                    })
                }
                Err(err) => return Err(err.into()),
            };

            if envelope.is_observe() {
                debug!(command, "observe notification queued while awaiting response");
                self.pending.push_back(envelope);
                continue;
            }
            if envelope.command() != command {
                return Err(BridgeError::CommandMismatch {
                    expected: command.to_string(),
                    actual: envelope.command().to_string(),
                });
            }
            if envelope.payload.is_empty() {
                return Err(BridgeError::EmptyPayload {
                    command: command.to_string(),
                });
            }
            return Ok(envelope.payload);
        }
    }
}

#[cfg(unix)]
impl Channel<wakatiwai_transport::PollStream<std::fs::File>, std::io::Stdout> {
    /// Channel over the process's standard input and output.
    pub fn stdio(config: ChannelConfig) -> Result<Self> {
        let inbound = wakatiwai_transport::PollStream::stdin()?;
        Ok(Self::with_config(inbound, std::io::stdout(), config))
    }
}

impl<R: InboundStream, W: Write> Exchange for Channel<R, W> {
    fn request(&mut self, command: &str, payload: &[u8]) -> Result<Bytes> {
        if !expects_response(command) {
            return Err(BridgeError::WrongCommandKind {
                command: command.to_string(),
                used: "request",
            });
        }
        debug!(command, size = payload.len(), "sending request");
        self.writer.send(command, payload)?;

        match self.await_response(command) {
            Ok(response) => {
                debug!(command, size = response.len(), "response received");
                Ok(response)
            }
            Err(err) => {
                debug!(command, error = %err, "request failed");
                Err(err)
            }
        }
    }

    fn notify(&mut self, command: &str, payload: &[u8]) -> Result<()> {
        if expects_response(command) {
            return Err(BridgeError::WrongCommandKind {
                command: command.to_string(),
                used: "notification",
            });
        }
        trace!(command, size = payload.len(), "sending notification");
        self.writer.send(command, payload)?;
        Ok(())
    }

    fn next_unsolicited(&mut self, timeout: Duration) -> Result<Option<Envelope>> {
        if let Some(envelope) = self.pending.pop_front() {
            return Ok(Some(envelope));
        }
        match self.reader.read_envelope_within(Some(timeout)) {
            Ok(envelope) => Ok(Some(envelope)),
            Err(FrameError::TimedOut(_)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::os::unix::net::UnixStream;

    use wakatiwai_transport::PollStream;

    use super::*;
    use crate::status::StatusCode;

    fn scripted(inbound: &[u8]) -> Channel<Cursor<Vec<u8>>, Vec<u8>> {
        Channel::new(Cursor::new(inbound.to_vec()), Vec::new())
    }

    fn fast() -> ChannelConfig {
        ChannelConfig {
            response_timeout: Duration::from_millis(30),
            ..ChannelConfig::default()
        }
    }

    #[test]
    fn request_writes_envelope_and_returns_payload() {
        let mut channel = scripted(b"/resp:write:4:AgFE\r\n");
        let response = channel.request("write", &[0x01, 0x01]).unwrap();
        assert_eq!(response.as_ref(), &[0x02, 0x01, 0x44]);

        let (_, outbound) = channel.into_inner();
        assert_eq!(outbound, b"/write:4:AQE=\r\n");
    }

    #[test]
    fn silent_peer_times_out_as_not_implemented() {
        let (_peer, ours) = UnixStream::pair().unwrap();
        let mut channel = Channel::with_config(PollStream::new(ours), Vec::new(), fast());

        let err = channel.request("read", &[0x01]).unwrap_err();
        assert!(matches!(err, BridgeError::Timeout { ref command, .. } if command == "read"));
        assert_eq!(err.status(), StatusCode::NOT_IMPLEMENTED);
    }

    #[test]
    fn stalled_response_is_internal_server_error() {
        let (mut peer, ours) = UnixStream::pair().unwrap();
        let mut channel = Channel::with_config(PollStream::new(ours), Vec::new(), fast());

        peer.write_all(b"/resp:read:8:AgFF").unwrap();
        let err = channel.request("read", &[0x01]).unwrap_err();
        assert!(matches!(err, BridgeError::Frame(FrameError::Incomplete { .. })));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn command_mismatch_is_internal_server_error() {
        let mut channel = scripted(b"/resp:write:4:AgFE\r\n");
        let err = channel.request("read", &[0x01]).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::CommandMismatch { ref expected, ref actual }
                if expected == "read" && actual == "write"
        ));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn empty_response_is_internal_server_error() {
        let mut channel = scripted(b"/resp:read:0:\r\n");
        let err = channel.request("read", &[0x01]).unwrap_err();
        assert!(matches!(err, BridgeError::EmptyPayload { .. }));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn closed_stream_is_internal_server_error() {
        let mut channel = scripted(b"");
        let err = channel.request("read", &[0x01]).unwrap_err();
        assert!(matches!(err, BridgeError::Frame(FrameError::ConnectionClosed)));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn oversized_response_is_internal_server_error() {
        let config = ChannelConfig {
            max_message_size: 16,
            ..ChannelConfig::default()
        };
        let mut channel =
            Channel::with_config(Cursor::new(b"/resp:read:400:AAAA".to_vec()), Vec::new(), config);
        let err = channel.request("read", &[0x01]).unwrap_err();
        assert!(matches!(err, BridgeError::Frame(FrameError::MessageTooLarge { .. })));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn observe_during_request_is_queued() {
        let mut channel = scripted(b"/observe:4:AgBF\r\n/resp:execute:4:AgFE\r\n");

        let response = channel.request("execute", &[0x01]).unwrap();
        assert_eq!(response.as_ref(), &[0x02, 0x01, 0x44]);
        assert_eq!(channel.pending(), 1);

        let envelope = channel
            .next_unsolicited(Duration::from_millis(1))
            .unwrap()
            .unwrap();
        assert!(envelope.is_observe());
        assert_eq!(envelope.payload.as_ref(), &[0x02, 0x00, 0x45]);
        assert_eq!(channel.pending(), 0);
    }

    #[test]
    fn next_unsolicited_reads_from_stream() {
        let mut channel = scripted(b"\r\n/observe:4:AgBF\r\n");
        let envelope = channel
            .next_unsolicited(Duration::from_millis(1))
            .unwrap()
            .unwrap();
        assert!(envelope.is_observe());
    }

    #[test]
    fn next_unsolicited_times_out_quietly() {
        let (_peer, ours) = UnixStream::pair().unwrap();
        let mut channel = Channel::new(PollStream::new(ours), Vec::new());
        assert!(channel
            .next_unsolicited(Duration::from_millis(10))
            .unwrap()
            .is_none());
    }

    #[test]
    fn notify_writes_without_waiting() {
        let mut channel = scripted(b"");
        channel.notify("heartbeat", b"").unwrap();
        channel.notify("stateChanged", b"STATE_READY").unwrap();

        let (_, outbound) = channel.into_inner();
        assert_eq!(
            outbound,
            b"/heartbeat:0:\r\n/stateChanged:16:U1RBVEVfUkVBRFk=\r\n"
        );
    }

    #[test]
    fn commands_must_match_the_exchange_half() {
        let mut channel = scripted(b"/resp:heartbeat:4:AgFE\r\n");

        let err = channel.request("heartbeat", &[]).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::WrongCommandKind { ref command, used: "request" } if command == "heartbeat"
        ));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let err = channel.notify("read", &[0x01]).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::WrongCommandKind { used: "notification", .. }
        ));

        let (_, outbound) = channel.into_inner();
        assert!(outbound.is_empty());
    }

    #[test]
    fn late_answer_is_rejected_by_the_next_request() {
        let (mut peer, ours) = UnixStream::pair().unwrap();
        let mut channel = Channel::with_config(PollStream::new(ours), Vec::new(), fast());

        assert!(channel.request("read", &[0x01]).is_err());
        peer.write_all(b"/resp:read:4:AgFF\r\n/resp:write:4:AgFE\r\n")
            .unwrap();

        let err = channel.request("write", &[0x01]).unwrap_err();
        assert!(matches!(err, BridgeError::CommandMismatch { .. }));
        let response = channel.request("write", &[0x01]).unwrap();
        assert_eq!(response.as_ref(), &[0x02, 0x01, 0x44]);
    }

    #[test]
    fn default_config() {
        let config = ChannelConfig::default();
        assert_eq!(config.response_timeout, Duration::from_millis(1500));
        assert_eq!(config.max_message_size, 65536);
    }

    #[test]
    fn exchange_through_trait_object() {
        let mut channel = scripted(b"/resp:delete:4:AgFC\r\n");
        let exchange: &mut dyn Exchange = &mut channel;
        let mut boxed: Box<&mut dyn Exchange> = Box::new(exchange);
        assert_eq!(
            boxed.request("delete", &[0x01]).unwrap().as_ref(),
            &[0x02, 0x01, 0x42]
        );
    }
}
