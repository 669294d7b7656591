use std::fmt;
use std::str::FromStr;

use tracing::{debug, warn};

use crate::codec::Cursor;
use crate::error::{BridgeError, Result, UriError};
use crate::message::RESPONSE;
use crate::status::StatusCode;

/// Longest resource path accepted in an observe notification.
pub const MAX_URI_LEN: usize = 1024;

/// A resource path: an object, optionally narrowed to an instance and a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uri {
    pub object_id: u16,
    pub instance_id: Option<u16>,
    pub resource_id: Option<u16>,
}

impl Uri {
    pub fn object(object_id: u16) -> Self {
        Self {
            object_id,
            instance_id: None,
            resource_id: None,
        }
    }

    pub fn instance(object_id: u16, instance_id: u16) -> Self {
        Self {
            instance_id: Some(instance_id),
            ..Self::object(object_id)
        }
    }

    pub fn resource(object_id: u16, instance_id: u16, resource_id: u16) -> Self {
        Self {
            resource_id: Some(resource_id),
            ..Self::instance(object_id, instance_id)
        }
    }
}

impl FromStr for Uri {
    type Err = UriError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = |reason| UriError {
            uri: s.to_string(),
            reason,
        };

        let rest = s.strip_prefix('/').ok_or_else(|| invalid("missing leading '/'"))?;
        let mut ids = [None; 3];
        for (i, segment) in rest.split('/').enumerate() {
            let slot = ids.get_mut(i).ok_or_else(|| invalid("more than three segments"))?;
            if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid("segment is not a decimal id"));
            }
            *slot = Some(segment.parse::<u16>().map_err(|_| invalid("id out of range"))?);
        }

        let [object_id, instance_id, resource_id] = ids;
        Ok(Self {
            object_id: object_id.ok_or_else(|| invalid("missing object id"))?,
            instance_id,
            resource_id,
        })
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.object_id)?;
        if let Some(instance_id) = self.instance_id {
            write!(f, "/{instance_id}")?;
            if let Some(resource_id) = self.resource_id {
                write!(f, "/{resource_id}")?;
            }
        }
        Ok(())
    }
}

/// Parse an observe notification and forward every changed path, in order.
///
/// Layout: `0x02 | message-id (ignored) | status | uri-count (u16 LE) |
/// (uri-length (u16 LE) | uri bytes)*`. An empty payload means nothing
/// changed. Processing stops at the first bad path; paths before it stay
/// forwarded. Returns the number of forwarded paths.
pub fn dispatch_observe<F>(payload: &[u8], mut forward: F) -> Result<usize>
where
    F: FnMut(&Uri),
{
    if payload.is_empty() {
        return Ok(0);
    }

    let mut cursor = Cursor::new(payload);
    let direction = cursor.read_u8()?;
    if direction != RESPONSE {
        return Err(BridgeError::NotResponse { direction });
    }
    let _message_id = cursor.read_u8()?;
    let status = StatusCode::from(cursor.read_u8()?);
    if status != StatusCode::CONTENT {
        debug!(%status, "observe notification with non-content status");
    }

    let count = usize::from(cursor.read_u16_le()?);
    for forwarded in 0..count {
        let len = usize::from(cursor.read_u16_le()?);
        if len > MAX_URI_LEN {
            warn!(len, forwarded, "observed uri too long");
            return Err(BridgeError::Malformed(format!(
                "uri of {len} bytes exceeds {MAX_URI_LEN}"
            )));
        }
        let bytes = cursor.read_bytes(len)?;
        let uri = std::str::from_utf8(bytes)
            .map_err(|_| BridgeError::Malformed("uri is not valid UTF-8".into()))
            .and_then(|text| {
                text.parse::<Uri>()
                    .map_err(|err| BridgeError::Malformed(err.to_string()))
            })?;
        debug!(%uri, "resource value changed");
        forward(&uri);
    }
    Ok(count)
}
