//! Per-endpoint object instance id bookkeeping
//!
//! Entries are opened when a bootstrap session starts and must be closed
//! when it ends; nothing here expires on its own.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::BootstrapPhase;

/// Instance ids a device already uses for Security and Server objects
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LwM2MBootstrapClientInstanceIds {
    /// Key: short server id (`None` for the bootstrap server), Value: Security instance id
    pub security_instances: BTreeMap<Option<u16>, u16>,

    /// Key: short server id, Value: Server instance id
    pub server_instances: BTreeMap<u16, u16>,

    /// Where the session is in the bootstrap sequence
    pub phase: BootstrapPhase,
}

impl LwM2MBootstrapClientInstanceIds {
    /// Security instance id of the bootstrap server, if known
    pub fn bootstrap_security_instance(&self) -> Option<u16> {
        self.security_instances.get(&None).copied()
    }

    /// Highest Security instance id used by an operational server
    pub fn max_operational_security_instance(&self) -> Option<u16> {
        self.security_instances
            .iter()
            .filter(|(ssid, _)| ssid.is_some())
            .map(|(_, iid)| *iid)
            .max()
    }

    /// Highest known Server instance id
    pub fn max_server_instance(&self) -> Option<u16> {
        self.server_instances.values().copied().max()
    }
}

/// Arena of instance id mappings keyed by endpoint
pub struct InstanceIdArena {
    entries: RwLock<HashMap<String, LwM2MBootstrapClientInstanceIds>>,
}

impl InstanceIdArena {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Open a fresh mapping for an endpoint, replacing any previous one
    ///
    /// Returns true if a previous mapping was replaced.
    pub fn open(&self, endpoint: &str) -> bool {
        let replaced = self
            .entries
            .write()
            .insert(endpoint.to_string(), LwM2MBootstrapClientInstanceIds::default())
            .is_some();
        debug!(endpoint = %endpoint, replaced, "Instance id mapping opened");
        replaced
    }

    /// Close the mapping of an endpoint
    pub fn close(&self, endpoint: &str) -> Option<LwM2MBootstrapClientInstanceIds> {
        let closed = self.entries.write().remove(endpoint);
        if closed.is_some() {
            debug!(endpoint = %endpoint, "Instance id mapping closed");
        }
        closed
    }

    pub fn get(&self, endpoint: &str) -> Option<LwM2MBootstrapClientInstanceIds> {
        self.entries.read().get(endpoint).cloned()
    }

    pub fn contains(&self, endpoint: &str) -> bool {
        self.entries.read().contains_key(endpoint)
    }

    /// Mutate the mapping of an endpoint in place
    pub fn update<R>(
        &self,
        endpoint: &str,
        f: impl FnOnce(&mut LwM2MBootstrapClientInstanceIds) -> R,
    ) -> Option<R> {
        self.entries.write().get_mut(endpoint).map(f)
    }

    /// Number of open mappings
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InstanceIdArena {
    fn default() -> Self {
        Self::new()
    }
}
