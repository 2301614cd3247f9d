//! # Credential Repository
//!
//! Source of per-device bootstrap credential records.
//!
//! Records are looked up by endpoint name or by the PSK identity the device
//! presents during the handshake. The in-memory implementation can be
//! populated from a JSON file holding a list of records.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

use shared::error::{BootstrapError, BootstrapResult};

use crate::credential::{ClientSecurity, DeviceSecurityRecord};

/// Lookup of device credential records
pub trait CredentialRepository: Send + Sync {
    /// Find the record of an endpoint
    fn find_by_endpoint(&self, endpoint: &str) -> Option<DeviceSecurityRecord>;

    /// Find the record whose client PSK identity matches
    fn find_by_identity(&self, identity: &str) -> Option<DeviceSecurityRecord>;
}

/// Repository keeping all records in memory
pub struct InMemoryCredentialRepository {
    /// Key: endpoint
    records: RwLock<HashMap<String, DeviceSecurityRecord>>,
}

impl InMemoryCredentialRepository {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Create a repository holding the given records
    pub fn from_records(records: impl IntoIterator<Item = DeviceSecurityRecord>) -> Self {
        let repository = Self::new();
        for record in records {
            repository.insert(record);
        }
        repository
    }

    /// Load records from a JSON file containing a list of records
    pub async fn load_from_file(path: impl AsRef<Path>) -> BootstrapResult<Self> {
        let path = path.as_ref();
        info!(path = ?path, "Loading device credentials");

        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| BootstrapError::StorageIOError(format!("{}: {}", path.display(), e)))?;

        let records: Vec<DeviceSecurityRecord> = serde_json::from_str(&json)?;

        let repository = Self::new();
        for record in records {
            if repository.insert(record.clone()).is_some() {
                warn!(endpoint = %record.endpoint, "Duplicate credential record, keeping the last one");
            }
        }

        info!(path = ?path, records = repository.len(), "Device credentials loaded");
        Ok(repository)
    }

    /// Insert or replace the record of an endpoint
    pub fn insert(&self, record: DeviceSecurityRecord) -> Option<DeviceSecurityRecord> {
        debug!(endpoint = %record.endpoint, "Credential record stored");
        self.records.write().insert(record.endpoint.clone(), record)
    }

    /// Remove the record of an endpoint
    pub fn remove(&self, endpoint: &str) -> Option<DeviceSecurityRecord> {
        self.records.write().remove(endpoint)
    }

    /// Endpoints with a record, sorted
    pub fn endpoints(&self) -> Vec<String> {
        let mut endpoints: Vec<String> = self.records.read().keys().cloned().collect();
        endpoints.sort();
        endpoints
    }

    /// Snapshot of all records
    pub fn records(&self) -> Vec<DeviceSecurityRecord> {
        self.records.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryCredentialRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialRepository for InMemoryCredentialRepository {
    fn find_by_endpoint(&self, endpoint: &str) -> Option<DeviceSecurityRecord> {
        self.records.read().get(endpoint).cloned()
    }

    fn find_by_identity(&self, identity: &str) -> Option<DeviceSecurityRecord> {
        self.records
            .read()
            .values()
            .find(|record| {
                matches!(&record.client, ClientSecurity::Psk { identity: id, .. } if id == identity)
            })
            .cloned()
    }
}
