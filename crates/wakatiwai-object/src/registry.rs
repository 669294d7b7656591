use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::channel::Exchange;
use crate::error::RegistryError;
use crate::instances::SyncState;
use crate::object::{GenericObject, DEVICE_OBJECT_ID};
use crate::status::StatusCode;

pub const SECURITY_OBJECT_ID: u16 = 0;
pub const SERVER_OBJECT_ID: u16 = 1;
pub const ACCESS_CONTROL_OBJECT_ID: u16 = 2;

/// Objects every client exposes, in registration order.
pub const MANDATORY_OBJECT_IDS: [u16; 4] = [
    SECURITY_OBJECT_ID,
    SERVER_OBJECT_ID,
    ACCESS_CONTROL_OBJECT_ID,
    DEVICE_OBJECT_ID,
];

/// Objects snapshotted before bootstrapping and rolled back if it fails.
pub const BOOTSTRAP_OBJECT_IDS: [u16; 2] = [SECURITY_OBJECT_ID, SERVER_OBJECT_ID];

/// Parse a comma-separated list of additional object ids.
///
/// An empty string is an empty list. Duplicates are dropped; mandatory ids
/// are always registered and are rejected when listed.
pub fn parse_object_ids(csv: &str) -> Result<Vec<u16>, RegistryError> {
    let csv = csv.trim();
    if csv.is_empty() {
        return Ok(Vec::new());
    }

    let mut ids = Vec::new();
    for segment in csv.split(',') {
        let segment = segment.trim();
        if segment.is_empty() {
            return Err(RegistryError::InvalidObjectList(format!(
                "empty entry in {csv:?}"
            )));
        }
        let id: u16 = segment.parse().map_err(|_| {
            RegistryError::InvalidObjectList(format!("{segment:?} is not an object id"))
        })?;
        if MANDATORY_OBJECT_IDS.contains(&id) {
            return Err(RegistryError::ReservedObjectId(id));
        }
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// One line of the object inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectSummary {
    pub object_id: u16,
    pub state: SyncState,
    pub instances: Vec<u16>,
}

/// Every object the client exposes, keyed by object id.
#[derive(Debug, Default)]
pub struct ObjectRegistry {
    objects: BTreeMap<u16, GenericObject>,
}

impl ObjectRegistry {
    /// Connect the mandatory objects and `extra`, reading each one's
    /// instances from the peer.
    ///
    /// Fails on the first object whose instances cannot be read.
    pub fn bootstrap<E: Exchange + ?Sized>(
        extra: &[u16],
        exchange: &mut E,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::default();
        for &object_id in MANDATORY_OBJECT_IDS.iter().chain(extra) {
            if registry.objects.contains_key(&object_id) {
                continue;
            }
            let object = GenericObject::connect(object_id, exchange)?;
            info!(
                object_id,
                instances = object.instances().len(),
                "object registered"
            );
            registry.insert(object);
        }
        Ok(registry)
    }

    /// Add or replace an object.
    pub fn insert(&mut self, object: GenericObject) -> Option<GenericObject> {
        self.objects.insert(object.id(), object)
    }

    pub fn get(&self, object_id: u16) -> Option<&GenericObject> {
        self.objects.get(&object_id)
    }

    pub fn get_mut(&mut self, object_id: u16) -> Option<&mut GenericObject> {
        self.objects.get_mut(&object_id)
    }

    /// Registered object ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = u16> + '_ {
        self.objects.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GenericObject> {
        self.objects.values()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Snapshot the Security and Server objects.
    pub fn backup_bootstrap_objects<E: Exchange + ?Sized>(
        &self,
        exchange: &mut E,
    ) -> Vec<(u16, StatusCode)> {
        BOOTSTRAP_OBJECT_IDS
            .iter()
            .filter_map(|&object_id| self.get(object_id))
            .map(|object| {
                let status = object.backup(exchange);
                if !status.is_success() {
                    warn!(object_id = object.id(), %status, "backup failed");
                }
                (object.id(), status)
            })
            .collect()
    }

    /// Roll the Security and Server objects back to their snapshots.
    pub fn restore_bootstrap_objects<E: Exchange + ?Sized>(
        &mut self,
        exchange: &mut E,
    ) -> Vec<(u16, StatusCode)> {
        let mut results = Vec::with_capacity(BOOTSTRAP_OBJECT_IDS.len());
        for object_id in BOOTSTRAP_OBJECT_IDS {
            if let Some(object) = self.objects.get_mut(&object_id) {
                let status = object.restore(exchange);
                if !object.instances().is_synchronized() {
                    warn!(object_id, %status, "restore failed");
                }
                results.push((object_id, status));
            }
        }
        results
    }

    pub fn summary(&self) -> Vec<ObjectSummary> {
        self.iter()
            .map(|object| ObjectSummary {
                object_id: object.id(),
                state: object.instances().state(),
                instances: object.instances().iter().collect(),
            })
            .collect()
    }
}
