//! Binary resource codec.
//!
//! Every resource is written as
//! ```text
//! resource-id (u16 LE) | type-tag (u8) | payload-length (u16 LE) | payload
//! ```
//! Integer and Float payloads are decimal ASCII text. A Multiple payload is a
//! child count (u16 LE) followed by the children, each a complete resource.
//! Payload lengths are computed before anything is written.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{BridgeError, Result};
use crate::value::{DataType, Resource, ResourceValue};

/// Bytes in front of every resource payload.
pub const RESOURCE_HEADER_LEN: usize = 5;

/// Deepest accepted nesting of Multiple resources on decode.
pub const MAX_NESTING_DEPTH: usize = 32;

/// Bounds-checked little-endian reader over a response buffer.
///
/// Every read that would run past the end fails with
/// [`BridgeError::Malformed`] and leaves the position unchanged.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(BridgeError::Malformed(format!(
                "need {n} bytes at offset {}, {} left",
                self.pos,
                self.remaining()
            )));
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }
}

/// Encoded payload length of one value, excluding its resource header.
pub fn payload_size(value: &ResourceValue) -> usize {
    match value {
        ResourceValue::String(bytes) | ResourceValue::Opaque(bytes) => bytes.len(),
        ResourceValue::Integer(v) => v.to_string().len(),
        ResourceValue::Float(v) => v.to_string().len(),
        ResourceValue::Boolean(_) => 1,
        ResourceValue::ObjectLink { .. } => 4,
        ResourceValue::Multiple(children) => 2 + encoded_len(children),
    }
}

/// Encoded length of a resource list, headers included.
pub fn encoded_len(resources: &[Resource]) -> usize {
    resources
        .iter()
        .map(|r| RESOURCE_HEADER_LEN + payload_size(&r.value))
        .sum()
}

/// Append `resources` to `dst`.
///
/// Fails without writing anything if any payload, at any depth, does not
/// fit its u16 length field.
pub fn encode_resources(resources: &[Resource], dst: &mut BytesMut) -> Result<()> {
    check_sizes(resources)?;

    let total = encoded_len(resources);
    dst.reserve(total);
    let start = dst.len();
    write_resources(resources, dst);
    debug_assert_eq!(dst.len() - start, total, "payload size mismatch");
    Ok(())
}

fn check_sizes(resources: &[Resource]) -> Result<()> {
    if resources.len() > usize::from(u16::MAX) {
        return Err(BridgeError::TooManyResources(resources.len()));
    }
    for resource in resources {
        let size = payload_size(&resource.value);
        if size > usize::from(u16::MAX) {
            return Err(BridgeError::PayloadTooLarge { size });
        }
        if let ResourceValue::Multiple(children) = &resource.value {
            check_sizes(children)?;
        }
    }
    Ok(())
}

fn write_resources(resources: &[Resource], dst: &mut BytesMut) {
    for resource in resources {
        let value = &resource.value;
        dst.put_u16_le(resource.id);
        dst.put_u8(value.data_type().tag());
        // Sizes were checked by the caller.
        dst.put_u16_le(payload_size(value) as u16);
        match value {
            ResourceValue::String(bytes) | ResourceValue::Opaque(bytes) => dst.put_slice(bytes),
            ResourceValue::Integer(v) => dst.put_slice(v.to_string().as_bytes()),
            ResourceValue::Float(v) => dst.put_slice(v.to_string().as_bytes()),
            ResourceValue::Boolean(v) => dst.put_u8(u8::from(*v)),
            ResourceValue::ObjectLink {
                object_id,
                instance_id,
            } => {
                dst.put_u16_le(*object_id);
                dst.put_u16_le(*instance_id);
            }
            ResourceValue::Multiple(children) => {
                dst.put_u16_le(children.len() as u16);
                write_resources(children, dst);
            }
        }
    }
}

/// Decode exactly `count` resources from the cursor.
pub fn decode_resources(cursor: &mut Cursor<'_>, count: usize) -> Result<Vec<Resource>> {
    decode_nested(cursor, count, 0)
}

fn decode_nested(cursor: &mut Cursor<'_>, count: usize, depth: usize) -> Result<Vec<Resource>> {
    if depth > MAX_NESTING_DEPTH {
        return Err(BridgeError::Malformed(format!(
            "multiple resources nested deeper than {MAX_NESTING_DEPTH}"
        )));
    }

    // Each resource needs at least its header; do not trust the count for allocation.
    let mut resources = Vec::with_capacity(count.min(cursor.remaining() / RESOURCE_HEADER_LEN));
    for _ in 0..count {
        let id = cursor.read_u16_le()?;
        let tag = cursor.read_u8()?;
        let len = usize::from(cursor.read_u16_le()?);
        let payload = cursor.read_bytes(len)?;

        let data_type = DataType::from_tag(tag)
            .ok_or_else(|| BridgeError::Malformed(format!("resource {id}: unknown type {tag}")))?;
        let value = decode_value(id, data_type, payload, depth)?;
        resources.push(Resource { id, value });
    }
    Ok(resources)
}

fn decode_value(id: u16, data_type: DataType, payload: &[u8], depth: usize) -> Result<ResourceValue> {
    let value = match data_type {
        DataType::String => ResourceValue::String(Bytes::copy_from_slice(payload)),
        DataType::Opaque => ResourceValue::Opaque(Bytes::copy_from_slice(payload)),
        DataType::Integer => ResourceValue::Integer(parse_text(id, payload)?),
        DataType::Float => ResourceValue::Float(parse_text(id, payload)?),
        DataType::Boolean => match payload {
            [b] => ResourceValue::Boolean(*b == 1),
            _ => return Err(length_error(id, "boolean", 1, payload.len())),
        },
        DataType::ObjectLink => match payload {
            [o0, o1, i0, i1] => ResourceValue::ObjectLink {
                object_id: u16::from_le_bytes([*o0, *o1]),
                instance_id: u16::from_le_bytes([*i0, *i1]),
            },
            _ => return Err(length_error(id, "object link", 4, payload.len())),
        },
        DataType::Multiple => {
            let mut inner = Cursor::new(payload);
            let count = usize::from(inner.read_u16_le()?);
            let children = decode_nested(&mut inner, count, depth + 1)?;
            if !inner.is_empty() {
                return Err(BridgeError::Malformed(format!(
                    "resource {id}: {} trailing bytes after {count} children",
                    inner.remaining()
                )));
            }
            ResourceValue::Multiple(children)
        }
    };
    Ok(value)
}

fn parse_text<T: std::str::FromStr>(id: u16, payload: &[u8]) -> Result<T> {
    std::str::from_utf8(payload)
        .ok()
        .and_then(|text| text.trim().parse().ok())
        .ok_or_else(|| {
            BridgeError::Malformed(format!(
                "resource {id}: invalid numeric text {:?}",
                String::from_utf8_lossy(payload)
            ))
        })
}

fn length_error(id: u16, what: &str, expected: usize, actual: usize) -> BridgeError {
    BridgeError::Malformed(format!(
        "resource {id}: {what} payload is {actual} bytes, expected {expected}"
    ))
}
