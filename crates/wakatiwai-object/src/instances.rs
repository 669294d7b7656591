use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, warn};
use wakatiwai_frame::READ_INSTANCES;

use crate::channel::Exchange;
use crate::error::Result;
use crate::message::{self, InstancesResponse};
use crate::status::StatusCode;

/// Whether an instance list reflects the peer's view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Unsynchronized,
    Synchronized,
}

/// The set of instance ids of one object, kept ordered and free of duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceList {
    ids: BTreeSet<u16>,
    state: SyncState,
}

impl InstanceList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn is_synchronized(&self) -> bool {
        self.state == SyncState::Synchronized
    }

    pub fn contains(&self, instance_id: u16) -> bool {
        self.ids.contains(&instance_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Instance ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.ids.iter().copied()
    }

    /// Returns false if the id was already present.
    pub fn insert(&mut self, instance_id: u16) -> bool {
        self.ids.insert(instance_id)
    }

    /// Returns false if the id was not present.
    pub fn remove(&mut self, instance_id: u16) -> bool {
        self.ids.remove(&instance_id)
    }

    /// Drop every id and mark the list unsynchronized.
    pub fn clear(&mut self) {
        self.ids.clear();
        self.state = SyncState::Unsynchronized;
    }

    /// Replace the whole list with the peer's view.
    pub fn replace(&mut self, ids: impl IntoIterator<Item = u16>) {
        self.ids = ids.into_iter().collect();
        self.state = SyncState::Synchronized;
    }

    /// Read the instance ids of `object_id` from the peer and adopt them.
    ///
    /// Content and NotFound (an object without instances) synchronize the
    /// list; any other outcome leaves it untouched. Returns the outcome.
    pub fn synchronize<E: Exchange + ?Sized>(
        &mut self,
        object_id: u16,
        exchange: &mut E,
    ) -> StatusCode {
        let response = match read_instances(object_id, exchange) {
            Ok(response) => response,
            Err(err) => {
                let status = err.status();
                warn!(object_id, error = %err, %status, "instance synchronization failed");
                return status;
            }
        };

        match response.status {
            StatusCode::CONTENT | StatusCode::NOT_FOUND => {
                self.replace(response.instance_ids);
                debug!(object_id, instances = self.len(), "instances synchronized");
            }
            status => {
                warn!(object_id, %status, "peer refused instance synchronization");
            }
        }
        response.status
    }
}

impl Extend<u16> for InstanceList {
    fn extend<I: IntoIterator<Item = u16>>(&mut self, iter: I) {
        self.ids.extend(iter);
    }
}

/// Issue `readInstances` for `object_id`.
pub fn read_instances<E: Exchange + ?Sized>(
    object_id: u16,
    exchange: &mut E,
) -> Result<InstancesResponse> {
    let request = message::read_instances_request(object_id);
    let response = exchange.request(READ_INSTANCES, &request)?;
    message::parse_instances(&response)
}
