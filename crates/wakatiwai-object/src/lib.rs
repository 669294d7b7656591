//! LWM2M generic objects bridged to an external process.
//!
//! Every object operation the protocol engine dispatches (read, write,
//! execute, discover, create, delete) becomes one binary request sent to the
//! peer process over a [`Channel`], and the peer's binary response becomes a
//! result or a status code. The crate also holds the object registry and the
//! session loop that drives the engine.

pub mod channel;
pub mod codec;
pub mod error;
pub mod instances;
pub mod message;
pub mod object;
pub mod observe;
pub mod registry;
pub mod session;
pub mod status;
pub mod value;

#[cfg(test)]
mod testing;

pub use channel::{Channel, ChannelConfig, Exchange};
pub use codec::{decode_resources, encode_resources, payload_size, Cursor, MAX_NESTING_DEPTH};
pub use error::{BridgeError, EngineError, RegistryError, Result, UriError};
pub use instances::{InstanceList, SyncState};
pub use object::{GenericObject, DEVICE_OBJECT_ID};
pub use observe::{dispatch_observe, Uri, MAX_URI_LEN};
pub use registry::{
    parse_object_ids, ObjectRegistry, ObjectSummary, BOOTSTRAP_OBJECT_IDS, MANDATORY_OBJECT_IDS,
};
pub use session::{
    ClientState, Engine, IdleEngine, Session, SessionConfig, Shutdown, ShutdownFlag,
};
pub use status::StatusCode;
pub use value::{DataType, Resource, ResourceValue};
