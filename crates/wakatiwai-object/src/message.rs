//! Request and response messages of the object protocol.
//!
//! Request: `0x01 | message-id | object-id (u16 LE) | instance-id (u16 LE) | body`.
//! Response: `0x02 | message-id | status | body`.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{self, Cursor};
use crate::error::{BridgeError, Result};
use crate::status::StatusCode;
use crate::value::Resource;

/// Direction byte of a request.
pub const REQUEST: u8 = 0x01;
/// Direction byte of a response.
pub const RESPONSE: u8 = 0x02;

/// Message id of `readInstances` requests.
pub const READ_INSTANCES_MESSAGE_ID: u8 = 0x10;
/// Message id of every other request.
pub const DEFAULT_MESSAGE_ID: u8 = 0x01;

const HEADER_LEN: usize = 6;

fn header(message_id: u8, object_id: u16, instance_id: u16, body_len: usize) -> BytesMut {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + body_len);
    buf.put_u8(REQUEST);
    buf.put_u8(message_id);
    buf.put_u16_le(object_id);
    buf.put_u16_le(instance_id);
    buf
}

fn count(n: usize) -> Result<u16> {
    u16::try_from(n).map_err(|_| BridgeError::TooManyResources(n))
}

/// `readInstances`: instance id and item count zeroed.
pub fn read_instances_request(object_id: u16) -> Bytes {
    let mut buf = header(READ_INSTANCES_MESSAGE_ID, object_id, 0, 2);
    buf.put_u16_le(0);
    buf.freeze()
}

/// `read` and `discover`: the requested resource ids, none meaning all.
pub fn resource_ids_request(object_id: u16, instance_id: u16, resource_ids: &[u16]) -> Result<Bytes> {
    let n = count(resource_ids.len())?;
    let mut buf = header(DEFAULT_MESSAGE_ID, object_id, instance_id, 2 + 2 * resource_ids.len());
    buf.put_u16_le(n);
    for id in resource_ids {
        buf.put_u16_le(*id);
    }
    Ok(buf.freeze())
}

/// `write` and `create`: a count followed by the encoded resources.
pub fn resources_request(object_id: u16, instance_id: u16, resources: &[Resource]) -> Result<Bytes> {
    let n = count(resources.len())?;
    let mut buf = header(
        DEFAULT_MESSAGE_ID,
        object_id,
        instance_id,
        2 + codec::encoded_len(resources),
    );
    buf.put_u16_le(n);
    codec::encode_resources(resources, &mut buf)?;
    Ok(buf.freeze())
}

/// `execute`: count fixed at one, the resource id, then the raw argument.
pub fn execute_request(object_id: u16, instance_id: u16, resource_id: u16, argument: &[u8]) -> Bytes {
    let mut buf = header(DEFAULT_MESSAGE_ID, object_id, instance_id, 4 + argument.len());
    buf.put_u16_le(1);
    buf.put_u16_le(resource_id);
    buf.put_slice(argument);
    buf.freeze()
}

/// `delete`: item count zeroed.
pub fn delete_request(object_id: u16, instance_id: u16) -> Bytes {
    let mut buf = header(DEFAULT_MESSAGE_ID, object_id, instance_id, 2);
    buf.put_u16_le(0);
    buf.freeze()
}

/// `backup` and `restore`: instance id and item count zeroed.
pub fn object_request(object_id: u16) -> Bytes {
    let mut buf = header(DEFAULT_MESSAGE_ID, object_id, 0, 2);
    buf.put_u16_le(0);
    buf.freeze()
}

/// Check the response header and return the peer status with a cursor
/// positioned at the body.
pub fn parse_header(payload: &[u8], message_id: u8) -> Result<(StatusCode, Cursor<'_>)> {
    let mut cursor = Cursor::new(payload);
    let direction = cursor.read_u8()?;
    if direction != RESPONSE {
        return Err(BridgeError::NotResponse { direction });
    }
    let actual = cursor.read_u8()?;
    if actual != message_id {
        return Err(BridgeError::MessageIdMismatch {
            expected: message_id,
            actual,
        });
    }
    let status = StatusCode::from(cursor.read_u8()?);
    Ok((status, cursor))
}

/// Parse a response that carries only a status.
pub fn parse_status(payload: &[u8]) -> Result<StatusCode> {
    parse_header(payload, DEFAULT_MESSAGE_ID).map(|(status, _)| status)
}

/// Answer to `readInstances`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstancesResponse {
    pub status: StatusCode,
    pub instance_ids: Vec<u16>,
}

/// Parse a `readInstances` response. The body is read only with Content.
pub fn parse_instances(payload: &[u8]) -> Result<InstancesResponse> {
    let (status, mut cursor) = parse_header(payload, READ_INSTANCES_MESSAGE_ID)?;
    let mut instance_ids = Vec::new();
    if status == StatusCode::CONTENT {
        let _object_id = cursor.read_u16_le()?;
        let n = cursor.read_u16_le()?;
        instance_ids.reserve(usize::from(n).min(cursor.remaining() / 2));
        for _ in 0..n {
            instance_ids.push(cursor.read_u16_le()?);
        }
    }
    Ok(InstancesResponse {
        status,
        instance_ids,
    })
}

/// Answer to `read`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadResponse {
    pub status: StatusCode,
    pub resources: Vec<Resource>,
}

/// Parse a `read` response. The body is read only with Content.
pub fn parse_read(payload: &[u8]) -> Result<ReadResponse> {
    let (status, mut cursor) = parse_header(payload, DEFAULT_MESSAGE_ID)?;
    let mut resources = Vec::new();
    if status == StatusCode::CONTENT {
        let n = body_count(&mut cursor)?;
        resources = codec::decode_resources(&mut cursor, n)?;
    }
    Ok(ReadResponse { status, resources })
}

/// Answer to `discover`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoverResponse {
    pub status: StatusCode,
    pub resource_ids: Vec<u16>,
}

/// Parse a `discover` response. The body is read only with Content.
pub fn parse_discover(payload: &[u8]) -> Result<DiscoverResponse> {
    let (status, mut cursor) = parse_header(payload, DEFAULT_MESSAGE_ID)?;
    let mut resource_ids = Vec::new();
    if status == StatusCode::CONTENT {
        let n = body_count(&mut cursor)?;
        resource_ids.reserve(n.min(cursor.remaining() / 2));
        for _ in 0..n {
            resource_ids.push(cursor.read_u16_le()?);
        }
    }
    Ok(DiscoverResponse {
        status,
        resource_ids,
    })
}

/// Skip the object/instance echo and read the item count.
fn body_count(cursor: &mut Cursor<'_>) -> Result<usize> {
    let _object_id = cursor.read_u16_le()?;
    let _instance_id = cursor.read_u16_le()?;
    Ok(usize::from(cursor.read_u16_le()?))
}
