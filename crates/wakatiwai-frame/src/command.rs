//! Envelope command names.
//!
//! Object commands are sent by the bridge and answered by the peer with a
//! `resp` envelope echoing the command. Notifications are fire-and-forget.

/// Read the instance ids of an object.
pub const READ_INSTANCES: &str = "readInstances";

/// Read resources of an instance.
pub const READ: &str = "read";

/// Write resources of an instance.
pub const WRITE: &str = "write";

/// Execute a resource.
pub const EXECUTE: &str = "execute";

/// Discover the resource ids of an instance.
pub const DISCOVER: &str = "discover";

/// Create an instance.
pub const CREATE: &str = "create";

/// Delete an instance.
pub const DELETE: &str = "delete";

/// Snapshot an object before bootstrapping.
pub const BACKUP: &str = "backup";

/// Roll an object back to its last snapshot.
pub const RESTORE: &str = "restore";

/// Observe poll (outbound) and change notification (inbound).
pub const OBSERVE: &str = "observe";

/// Liveness notification, no payload.
pub const HEARTBEAT: &str = "heartbeat";

/// Client state transition notification.
pub const STATE_CHANGED: &str = "stateChanged";

/// Envelope kind of every solicited inbound message.
pub const RESPONSE: &str = "resp";

/// Returns true if the peer is expected to answer the command with `resp`.
pub fn expects_response(command: &str) -> bool {
    matches!(
        command,
        READ_INSTANCES | READ | WRITE | EXECUTE | DISCOVER | CREATE | DELETE | BACKUP | RESTORE
    )
}
