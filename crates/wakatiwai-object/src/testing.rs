//! Scripted peer for unit tests.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use wakatiwai_frame::{Envelope, EnvelopeKind};

use crate::channel::Exchange;
use crate::error::{BridgeError, Result};

/// An [`Exchange`] that answers requests from a script and records traffic.
///
/// A request with no scripted reply left times out.
#[derive(Default)]
pub(crate) struct ScriptedExchange {
    replies: VecDeque<Result<Bytes>>,
    unsolicited: VecDeque<Envelope>,
    pub requests: Vec<(String, Vec<u8>)>,
    pub notifications: Vec<(String, Vec<u8>)>,
}

impl ScriptedExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, payload: &[u8]) -> Self {
        self.push_reply(payload);
        self
    }

    pub fn fail(mut self, err: BridgeError) -> Self {
        self.replies.push_back(Err(err));
        self
    }

    pub fn push_reply(&mut self, payload: &[u8]) {
        self.replies.push_back(Ok(Bytes::copy_from_slice(payload)));
    }

    pub fn push_observe(&mut self, payload: &[u8]) {
        self.unsolicited.push_back(Envelope {
            kind: EnvelopeKind::Observe,
            payload: Bytes::copy_from_slice(payload),
        });
    }

    pub fn push_unsolicited(&mut self, envelope: Envelope) {
        self.unsolicited.push_back(envelope);
    }

    /// Commands requested so far, in order.
    pub fn commands(&self) -> Vec<&str> {
        self.requests.iter().map(|(c, _)| c.as_str()).collect()
    }

    pub fn remaining_replies(&self) -> usize {
        self.replies.len()
    }
}

impl Exchange for ScriptedExchange {
    fn request(&mut self, command: &str, payload: &[u8]) -> Result<Bytes> {
        self.requests.push((command.to_string(), payload.to_vec()));
        self.replies.pop_front().unwrap_or_else(|| {
            Err(BridgeError::Timeout {
                command: command.to_string(),
                timeout: Duration::from_millis(1500),
            })
        })
    }

    fn notify(&mut self, command: &str, payload: &[u8]) -> Result<()> {
        self.notifications
            .push((command.to_string(), payload.to_vec()));
        Ok(())
    }

    fn next_unsolicited(&mut self, _timeout: Duration) -> Result<Option<Envelope>> {
        Ok(self.unsolicited.pop_front())
    }
}

/// A `readInstances` response with Content and the given ids.
pub(crate) fn instances_reply(object_id: u16, ids: &[u16]) -> Vec<u8> {
    let mut reply = vec![0x02, 0x10, 0x45];
    reply.extend_from_slice(&object_id.to_le_bytes());
    reply.extend_from_slice(&(ids.len() as u16).to_le_bytes());
    for id in ids {
        reply.extend_from_slice(&id.to_le_bytes());
    }
    reply
}

/// A status-only response.
pub(crate) fn status_reply(status: u8) -> Vec<u8> {
    vec![0x02, 0x01, status]
}
