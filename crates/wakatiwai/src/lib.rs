//! LWM2M client objects bridged to an external process over stdio.
//!
//! The client exposes LWM2M objects whose instances and resources are owned
//! by a peer process. Every object operation becomes one base64 line on
//! stdout, answered by one line on stdin.
//!
//! # Crate Structure
//!
//! - [`transport`]: readiness-aware inbound streams (stdin, socket pairs)
//! - [`frame`]: `/command:length:base64` line envelopes
//! - [`object`]: binary codec, generic objects, registry and session loop

/// Re-export transport types.
pub mod transport {
    pub use wakatiwai_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use wakatiwai_frame::*;
}

/// Re-export object types.
pub mod object {
    pub use wakatiwai_object::*;
}
