use bytes::Bytes;
use tracing::{debug, warn};
use wakatiwai_frame::{BACKUP, CREATE, DELETE, DISCOVER, EXECUTE, READ, RESTORE, WRITE};

use crate::channel::Exchange;
use crate::error::{BridgeError, RegistryError, Result};
use crate::instances::InstanceList;
use crate::message;
use crate::status::StatusCode;
use crate::value::Resource;

/// Object id of the Device object, which never gains or loses instances.
pub const DEVICE_OBJECT_ID: u16 = 3;

/// An object whose instances and resources live in the peer process.
///
/// Every operation is one request/response exchange. Failures are reported
/// as status codes: a peer status is returned as sent, and bridge failures
/// map through [`BridgeError::status`].
#[derive(Debug, Clone)]
pub struct GenericObject {
    object_id: u16,
    instances: InstanceList,
}

impl GenericObject {
    /// An object that has not read its instances yet.
    pub fn new(object_id: u16) -> Self {
        Self {
            object_id,
            instances: InstanceList::new(),
        }
    }

    /// Create the object and read its instances from the peer.
    pub fn connect<E: Exchange + ?Sized>(
        object_id: u16,
        exchange: &mut E,
    ) -> std::result::Result<Self, RegistryError> {
        let mut object = Self::new(object_id);
        let status = object.instances.synchronize(object_id, exchange);
        if object.instances.is_synchronized() {
            Ok(object)
        } else {
            Err(RegistryError::Sync { object_id, status })
        }
    }

    pub fn id(&self) -> u16 {
        self.object_id
    }

    pub fn instances(&self) -> &InstanceList {
        &self.instances
    }

    /// Re-read the instance list from the peer.
    pub fn synchronize<E: Exchange + ?Sized>(&mut self, exchange: &mut E) -> StatusCode {
        self.instances.synchronize(self.object_id, exchange)
    }

    /// Read resources of an instance. An empty `resource_ids` reads all of them.
    pub fn read<E: Exchange + ?Sized>(
        &self,
        exchange: &mut E,
        instance_id: u16,
        resource_ids: &[u16],
    ) -> std::result::Result<Vec<Resource>, StatusCode> {
        debug!(
            object_id = self.object_id,
            instance_id,
            requested = resource_ids.len(),
            "read"
        );
        let result = message::resource_ids_request(self.object_id, instance_id, resource_ids)
            .and_then(|request| self.exchange(exchange, READ, request))
            .and_then(|response| message::parse_read(&response));
        let response = self.settle(READ, result)?;
        if response.status == StatusCode::CONTENT {
            Ok(response.resources)
        } else {
            Err(response.status)
        }
    }

    /// Write resources of an instance.
    pub fn write<E: Exchange + ?Sized>(
        &self,
        exchange: &mut E,
        instance_id: u16,
        resources: &[Resource],
    ) -> StatusCode {
        debug!(
            object_id = self.object_id,
            instance_id,
            resources = resources.len(),
            "write"
        );
        let result = message::resources_request(self.object_id, instance_id, resources)
            .and_then(|request| self.exchange(exchange, WRITE, request))
            .and_then(|response| message::parse_status(&response));
        self.status(WRITE, result)
    }

    /// Execute a resource with an opaque argument.
    pub fn execute<E: Exchange + ?Sized>(
        &self,
        exchange: &mut E,
        instance_id: u16,
        resource_id: u16,
        argument: &[u8],
    ) -> StatusCode {
        debug!(
            object_id = self.object_id,
            instance_id,
            resource_id,
            argument = argument.len(),
            "execute"
        );
        let request = message::execute_request(self.object_id, instance_id, resource_id, argument);
        let result = self
            .exchange(exchange, EXECUTE, request)
            .and_then(|response| message::parse_status(&response));
        self.status(EXECUTE, result)
    }

    /// Discover resource ids of an instance. An empty `resource_ids` discovers all of them.
    pub fn discover<E: Exchange + ?Sized>(
        &self,
        exchange: &mut E,
        instance_id: u16,
        resource_ids: &[u16],
    ) -> std::result::Result<Vec<u16>, StatusCode> {
        debug!(
            object_id = self.object_id,
            instance_id,
            requested = resource_ids.len(),
            "discover"
        );
        let result = message::resource_ids_request(self.object_id, instance_id, resource_ids)
            .and_then(|request| self.exchange(exchange, DISCOVER, request))
            .and_then(|response| message::parse_discover(&response));
        let response = self.settle(DISCOVER, result)?;
        if response.status == StatusCode::CONTENT {
            Ok(response.resource_ids)
        } else {
            Err(response.status)
        }
    }

    /// Create an instance. On Created the id joins the instance list.
    pub fn create<E: Exchange + ?Sized>(
        &mut self,
        exchange: &mut E,
        instance_id: u16,
        resources: &[Resource],
    ) -> StatusCode {
        if self.object_id == DEVICE_OBJECT_ID {
            return StatusCode::METHOD_NOT_ALLOWED;
        }
        debug!(
            object_id = self.object_id,
            instance_id,
            resources = resources.len(),
            "create"
        );
        let result = message::resources_request(self.object_id, instance_id, resources)
            .and_then(|request| self.exchange(exchange, CREATE, request))
            .and_then(|response| message::parse_status(&response));
        let status = self.status(CREATE, result);
        if status == StatusCode::CREATED {
            self.instances.insert(instance_id);
        }
        status
    }

    /// Delete an instance. On Deleted the id leaves the instance list.
    pub fn delete<E: Exchange + ?Sized>(&mut self, exchange: &mut E, instance_id: u16) -> StatusCode {
        if self.object_id == DEVICE_OBJECT_ID {
            return StatusCode::METHOD_NOT_ALLOWED;
        }
        debug!(object_id = self.object_id, instance_id, "delete");
        let request = message::delete_request(self.object_id, instance_id);
        let result = self
            .exchange(exchange, DELETE, request)
            .and_then(|response| message::parse_status(&response));
        let status = self.status(DELETE, result);
        if status == StatusCode::DELETED {
            self.instances.remove(instance_id);
        }
        status
    }

    /// Ask the peer to snapshot the whole object.
    pub fn backup<E: Exchange + ?Sized>(&self, exchange: &mut E) -> StatusCode {
        debug!(object_id = self.object_id, "backup");
        let request = message::object_request(self.object_id);
        let result = self
            .exchange(exchange, BACKUP, request)
            .and_then(|response| message::parse_status(&response));
        self.status(BACKUP, result)
    }

    /// Ask the peer to roll the object back to its snapshot, then re-read
    /// the instance list.
    ///
    /// The instance list is discarded whatever the peer answers; the result
    /// is the outcome of the re-synchronization.
    pub fn restore<E: Exchange + ?Sized>(&mut self, exchange: &mut E) -> StatusCode {
        debug!(object_id = self.object_id, "restore");
        let request = message::object_request(self.object_id);
        let result = self
            .exchange(exchange, RESTORE, request)
            .and_then(|response| message::parse_status(&response));
        let restored = self.status(RESTORE, result);
        debug!(object_id = self.object_id, status = %restored, "restore answered");

        self.instances.clear();
        self.instances.synchronize(self.object_id, exchange)
    }

    fn exchange<E: Exchange + ?Sized>(
        &self,
        exchange: &mut E,
        command: &str,
        request: Bytes,
    ) -> Result<Bytes> {
        exchange.request(command, &request)
    }

    /// Turn a bridge failure into the status reported upward.
    fn settle<T>(&self, command: &str, result: Result<T>) -> std::result::Result<T, StatusCode> {
        result.map_err(|err: BridgeError| {
            let status = err.status();
            warn!(object_id = self.object_id, command, error = %err, %status, "operation failed");
            status
        })
    }

    fn status(&self, command: &str, result: Result<StatusCode>) -> StatusCode {
        let status = self.settle(command, result).unwrap_or_else(|status| status);
        debug!(object_id = self.object_id, command, %status, "operation finished");
        status
    }
}
