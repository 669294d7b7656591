use std::time::Duration;

use wakatiwai_frame::FrameError;

use crate::status::StatusCode;

/// Errors raised while exchanging a command with the peer process or
/// interpreting its answer.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The peer did not answer before the response timeout.
    #[error("no response to {command:?} within {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    /// The response envelope echoes a different command.
    #[error("response to {actual:?} while waiting for {expected:?}")]
    CommandMismatch { expected: String, actual: String },

    /// The response envelope carried no payload.
    #[error("empty response to {command:?}")]
    EmptyPayload { command: String },

    /// An object command was sent as a notification, or a notification as
    /// a request.
    #[error("{command:?} cannot be sent as a {used}")]
    WrongCommandKind { command: String, used: &'static str },

    /// The response payload does not start with the response direction byte.
    #[error("not a response message (direction {direction:#04x})")]
    NotResponse { direction: u8 },

    /// The response message id differs from the request's.
    #[error("message id {actual:#04x} does not match request {expected:#04x}")]
    MessageIdMismatch { expected: u8, actual: u8 },

    /// The response body could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// An encoded resource payload does not fit in a u16 length field.
    #[error("resource payload too large ({size} bytes, max {max})", max = u16::MAX)]
    PayloadTooLarge { size: usize },

    /// More resource ids were requested than one message can carry.
    #[error("too many resources requested ({0}, max {max})", max = u16::MAX)]
    TooManyResources(usize),

    /// Envelope-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] wakatiwai_transport::TransportError),
}

impl BridgeError {
    /// The status code this failure is reported as.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Timeout { .. } | Self::Frame(FrameError::TimedOut(_)) => {
                StatusCode::NOT_IMPLEMENTED
            }
            Self::CommandMismatch { .. }
            | Self::EmptyPayload { .. }
            | Self::WrongCommandKind { .. }
            | Self::Frame(_)
            | Self::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotResponse { .. }
            | Self::MessageIdMismatch { .. }
            | Self::Malformed(_)
            | Self::PayloadTooLarge { .. }
            | Self::TooManyResources(_) => StatusCode::BAD_REQUEST,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors raised while building or driving the object registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The instance list of an object could not be read at startup.
    #[error("object {object_id}: instance synchronization failed ({status})")]
    Sync { object_id: u16, status: StatusCode },

    /// A mandatory object id was listed explicitly.
    #[error("object id {0} is always registered and must not be listed")]
    ReservedObjectId(u16),

    /// The object id list could not be parsed.
    #[error("invalid object id list: {0}")]
    InvalidObjectList(String),
}

/// A resource path that does not follow `/<object>[/<instance>[/<resource>]]`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid uri {uri:?}: {reason}")]
pub struct UriError {
    pub uri: String,
    pub reason: &'static str,
}

/// Errors raised by the protocol engine or the session loop driving it.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The engine could not make progress.
    #[error("engine step failed: {0}")]
    Step(String),

    /// Writing a notification or reading unsolicited data failed.
    #[error("bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// Registry error.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_map_to_not_implemented() {
        let err = BridgeError::Timeout {
            command: "read".into(),
            timeout: Duration::from_millis(1500),
        };
        assert_eq!(err.status(), StatusCode::NOT_IMPLEMENTED);

        let err = BridgeError::Frame(FrameError::TimedOut(Duration::from_millis(1)));
        assert_eq!(err.status(), StatusCode::NOT_IMPLEMENTED);
    }

    #[test]
    fn channel_failures_map_to_internal_server_error() {
        let errors = [
            BridgeError::CommandMismatch {
                expected: "read".into(),
                actual: "write".into(),
            },
            BridgeError::EmptyPayload {
                command: "read".into(),
            },
            BridgeError::Frame(FrameError::Malformed("x".into())),
            BridgeError::Frame(FrameError::Incomplete { received: 3 }),
            BridgeError::Frame(FrameError::MessageTooLarge { size: 9, max: 8 }),
            BridgeError::Frame(FrameError::ConnectionClosed),
        ];
        for err in errors {
            assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR, "{err}");
        }
    }

    #[test]
    fn message_failures_map_to_bad_request() {
        let errors = [
            BridgeError::NotResponse { direction: 0x01 },
            BridgeError::MessageIdMismatch {
                expected: 0x01,
                actual: 0x02,
            },
            BridgeError::Malformed("short".into()),
            BridgeError::PayloadTooLarge { size: 70_000 },
            BridgeError::TooManyResources(70_000),
        ];
        for err in errors {
            assert_eq!(err.status(), StatusCode::BAD_REQUEST, "{err}");
        }
    }

    #[test]
    fn messages_name_the_failure() {
        let err = RegistryError::Sync {
            object_id: 3,
            status: StatusCode::BAD_REQUEST,
        };
        assert_eq!(
            err.to_string(),
            "object 3: instance synchronization failed (4.00 BadRequest)"
        );
        assert_eq!(
            BridgeError::TooManyResources(70_000).to_string(),
            "too many resources requested (70000, max 65535)"
        );
    }
}
