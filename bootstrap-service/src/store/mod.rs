//! # Bootstrap Configuration Store
//!
//! Per-endpoint store of validated bootstrap configurations.
//!
//! ## Invariants
//!
//! - Every stored configuration passed the `ConfigurationChecker`
//! - A bootstrap-server PSK identity (per bootstrap server URI) is owned by
//!   at most one endpoint
//!
//! All mutations happen under a single write lock, so readers observe either
//! the previous or the new configuration of an endpoint, never a mix.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use shared::{
    error::BootstrapError,
    types::{BootstrapConfig, BootstrapPskIdentity},
};

use crate::checker::{ConfigurationChecker, InvalidConfiguration};
use crate::task::BootstrapSession;

/// Errors raised when adding a configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddError {
    #[error("Invalid bootstrap configuration: {0}")]
    InvalidConfiguration(String),

    #[error("PSK identity '{identity}' already used for this bootstrap server '{url}' by endpoint '{owner}'")]
    PskCollision {
        identity: String,
        url: String,
        owner: String,
    },
}

impl From<InvalidConfiguration> for AddError {
    fn from(err: InvalidConfiguration) -> Self {
        AddError::InvalidConfiguration(err.0)
    }
}

impl From<AddError> for BootstrapError {
    fn from(err: AddError) -> Self {
        match err {
            AddError::InvalidConfiguration(message) => BootstrapError::InvalidConfiguration(message),
            AddError::PskCollision { identity, url, owner } => {
                BootstrapError::PskIdentityCollision { identity, url, owner }
            }
        }
    }
}

#[derive(Default)]
struct StoreInner {
    /// Key: endpoint
    by_endpoint: HashMap<String, Arc<BootstrapConfig>>,

    /// Key: bootstrap PSK identity, Value: owning endpoint
    by_psk_identity: HashMap<BootstrapPskIdentity, String>,
}

/// Thread-safe store of bootstrap configurations keyed by endpoint
pub struct BootstrapConfigStore {
    inner: RwLock<StoreInner>,
    checker: ConfigurationChecker,
}

impl BootstrapConfigStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::with_checker(ConfigurationChecker::new())
    }

    /// Create an empty store validating with the given checker
    pub fn with_checker(checker: ConfigurationChecker) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            checker,
        }
    }

    /// Validate and store the configuration of an endpoint
    ///
    /// Replaces any configuration the endpoint already had.
    ///
    /// # Returns
    /// The replaced configuration, if any
    pub fn add(
        &self,
        endpoint: &str,
        config: BootstrapConfig,
    ) -> Result<Option<Arc<BootstrapConfig>>, AddError> {
        let mut inner = self.inner.write();

        self.checker.verify(&config)?;

        let psk_identity = config.bootstrap_psk_identity();
        if let Some(psk) = &psk_identity {
            if let Some(owner) = inner.by_psk_identity.get(psk) {
                if owner != endpoint {
                    return Err(AddError::PskCollision {
                        identity: psk.identity.clone(),
                        url: psk.url.clone(),
                        owner: owner.clone(),
                    });
                }
            }
        }

        let previous = inner
            .by_endpoint
            .insert(endpoint.to_string(), Arc::new(config));

        inner.by_psk_identity.retain(|_, owner| owner != endpoint);
        if let Some(psk) = psk_identity {
            inner.by_psk_identity.insert(psk, endpoint.to_string());
        }

        info!(
            endpoint = %endpoint,
            replaced = previous.is_some(),
            "Bootstrap configuration stored"
        );

        Ok(previous)
    }

    /// Get the configuration of an endpoint
    pub fn get(&self, endpoint: &str) -> Option<Arc<BootstrapConfig>> {
        self.inner.read().by_endpoint.get(endpoint).cloned()
    }

    /// Get the configuration for a bootstrap session
    pub fn get_for_session(&self, session: &BootstrapSession) -> Option<Arc<BootstrapConfig>> {
        self.get(&session.endpoint)
    }

    /// Remove the configuration of an endpoint
    pub fn remove(&self, endpoint: &str) -> Option<Arc<BootstrapConfig>> {
        let mut inner = self.inner.write();
        let removed = inner.by_endpoint.remove(endpoint);
        if removed.is_some() {
            inner.by_psk_identity.retain(|_, owner| owner != endpoint);
            debug!(endpoint = %endpoint, "Bootstrap configuration removed");
        }
        removed
    }

    /// Snapshot of all stored configurations
    pub fn get_all(&self) -> HashMap<String, Arc<BootstrapConfig>> {
        self.inner.read().by_endpoint.clone()
    }

    /// Endpoint owning a bootstrap PSK identity
    pub fn psk_identity_owner(&self, psk: &BootstrapPskIdentity) -> Option<String> {
        self.inner.read().by_psk_identity.get(psk).cloned()
    }

    /// Number of stored configurations
    pub fn len(&self) -> usize {
        self.inner.read().by_endpoint.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BootstrapConfigStore {
    fn default() -> Self {
        Self::new()
    }
}
