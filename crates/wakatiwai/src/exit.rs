use std::fmt;

use wakatiwai_frame::FrameError;
use wakatiwai_object::{BridgeError, EngineError, RegistryError, StatusCode};
use wakatiwai_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    CliError::new(INTERNAL, format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    let code = match err {
        FrameError::TimedOut(_) => TIMEOUT,
        FrameError::ConnectionClosed => FAILURE,
        FrameError::Malformed(_)
        | FrameError::InvalidCommand(_)
        | FrameError::MessageTooLarge { .. }
        | FrameError::Base64(_)
        | FrameError::Incomplete { .. } => DATA_INVALID,
        FrameError::Io(_) | FrameError::Transport(_) => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn bridge_error(context: &str, err: BridgeError) -> CliError {
    match err {
        BridgeError::Frame(err) => frame_error(context, err),
        BridgeError::Transport(err) => transport_error(context, err),
        BridgeError::Timeout { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        BridgeError::WrongCommandKind { .. } => {
            CliError::new(INTERNAL, format!("{context}: {err}"))
        }
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn registry_error(context: &str, err: RegistryError) -> CliError {
    let code = match &err {
        RegistryError::Sync { status, .. } if *status == StatusCode::NOT_IMPLEMENTED => TIMEOUT,
        RegistryError::Sync { .. } => FAILURE,
        RegistryError::ReservedObjectId(_) | RegistryError::InvalidObjectList(_) => USAGE,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn engine_error(context: &str, err: EngineError) -> CliError {
    match err {
        EngineError::Bridge(err) => bridge_error(context, err),
        EngineError::Registry(err) => registry_error(context, err),
        EngineError::Step(_) => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}
