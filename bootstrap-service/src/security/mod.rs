//! # Bootstrap Security Store
//!
//! Handshake-time credential lookup for the bootstrap server.
//!
//! ## Flow
//!
//! ```text
//! identity/endpoint ──▶ CredentialRepository ──▶ DeviceSecurityRecord
//!                                                    │ resolve
//!                                                    ▼
//!                       BootstrapConfigStore ◀── BootstrapConfig
//! ```
//!
//! Every lookup re-resolves the device's credential template and replaces
//! the endpoint's stored bootstrap configuration. The caller receives the
//! client's handshake `SecurityInfo`, or `None` when the device has no
//! bootstrap entitlement.

use std::sync::Arc;
use tracing::{debug, error, info, trace};

use shared::error::BootstrapError;

use crate::credential::{BootstrapConfigResolver, DeviceSecurityRecord, SecurityInfo};
use crate::repository::CredentialRepository;
use crate::session::{BootstrapEvent, EventLevel, TelemetryNotifier, TransportSessionRegistry};
use crate::store::{AddError, BootstrapConfigStore};

/// Resolves handshake credentials and keeps the config store current
pub struct SecurityStore {
    repository: Arc<dyn CredentialRepository>,
    store: Arc<BootstrapConfigStore>,
    sessions: Arc<TransportSessionRegistry>,
    notifier: Arc<dyn TelemetryNotifier>,
    resolver: BootstrapConfigResolver,
}

impl SecurityStore {
    pub fn new(
        repository: Arc<dyn CredentialRepository>,
        store: Arc<BootstrapConfigStore>,
        sessions: Arc<TransportSessionRegistry>,
        notifier: Arc<dyn TelemetryNotifier>,
        default_host: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            store,
            sessions,
            notifier,
            resolver: BootstrapConfigResolver::new(default_host),
        }
    }

    /// Security info for the PSK identity a device presents
    pub fn get_by_identity(&self, identity: &str) -> Option<SecurityInfo> {
        let Some(record) = self.repository.find_by_identity(identity) else {
            debug!(identity = %identity, "No credential record for PSK identity");
            return None;
        };

        self.add_value_to_store(&record, &record.endpoint)
    }

    /// Security info for an endpoint
    pub fn get_all_by_endpoint(&self, endpoint: &str) -> Option<impl Iterator<Item = SecurityInfo>> {
        let Some(record) = self.repository.find_by_endpoint(endpoint) else {
            debug!(endpoint = %endpoint, "No credential record for endpoint");
            return None;
        };

        self.add_value_to_store(&record, endpoint)
            .map(std::iter::once)
    }

    /// Resolve a record's bootstrap configuration and store it for the endpoint
    ///
    /// # Returns
    /// The client's handshake security info; `None` if the record has no
    /// usable bootstrap credentials or its client credentials need no handshake
    pub fn add_value_to_store(
        &self,
        record: &DeviceSecurityRecord,
        endpoint: &str,
    ) -> Option<SecurityInfo> {
        let session = self.sessions.register(endpoint);

        let client_info = match record.client.to_security_info(endpoint) {
            Ok(info) => info,
            Err(e) => {
                error!(endpoint = %endpoint, error = %e, "Invalid client credentials");
                return None;
            }
        };

        let mut config = match self.resolver.resolve(record) {
            Ok(config) => config,
            Err(e @ BootstrapError::SecurityModeMismatch { .. }) => {
                error!(endpoint = %endpoint, error = %e, "Bootstrap credential validation failed");
                self.notifier.notify(
                    &session,
                    BootstrapEvent::new(EventLevel::Error, endpoint, e.to_string()),
                );
                return None;
            }
            Err(e) => {
                error!(endpoint = %endpoint, error = %e, "Failed to resolve bootstrap credentials");
                return None;
            }
        };

        if !record.profile.bootstrap_server_update_enable && config.strip_bootstrap_server() {
            debug!(endpoint = %endpoint, "Bootstrap server update disabled, bootstrap entries removed");
        }

        self.store.remove(endpoint);
        match self.store.add(endpoint, config) {
            Ok(_) => {
                info!(endpoint = %endpoint, session_id = %session.id, "Bootstrap credentials resolved");
                self.notifier.notify(
                    &session,
                    BootstrapEvent::new(EventLevel::Info, endpoint, "Bootstrap configuration accepted"),
                );
            }
            Err(e @ AddError::PskCollision { .. }) => {
                trace!(endpoint = %endpoint, error = %e, "Bootstrap configuration not stored");
            }
            Err(e) => {
                error!(endpoint = %endpoint, error = %e, "Bootstrap configuration not stored");
            }
        }

        client_info
    }

    /// Config store this security store writes to
    pub fn config_store(&self) -> &Arc<BootstrapConfigStore> {
        &self.store
    }

    /// Transport sessions registered by lookups
    pub fn sessions(&self) -> &Arc<TransportSessionRegistry> {
        &self.sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{
        ClientSecurity, DeviceBootstrapCredential, ProfileBootstrapConfig, SecurityKey,
        ServerCredential, ServerTemplate,
    };
    use crate::repository::InMemoryCredentialRepository;
    use crate::session::TransportSession;
    use parking_lot::Mutex;
    use shared::types::SecurityMode;

    #[derive(Default)]
    struct RecordingNotifier {
        events: Mutex<Vec<BootstrapEvent>>,
    }

    impl TelemetryNotifier for RecordingNotifier {
        fn notify(&self, _session: &TransportSession, event: BootstrapEvent) {
            self.events.lock().push(event);
        }
    }

    fn credential(mode: SecurityMode, id: &str, key: &str) -> ServerCredential {
        ServerCredential {
            security_mode: mode,
            client_public_key_or_id: id.into(),
            client_secret_key: key.into(),
        }
    }

    fn template(short_id: u16, bootstrap: bool, mode: SecurityMode, port: u16) -> ServerTemplate {
        ServerTemplate {
            short_server_id: short_id,
            bootstrap_server_is: bootstrap,
            host: None,
            port,
            security_mode: mode,
            server_public_key: None,
            client_hold_off_time: 1,
            bootstrap_server_account_timeout: 0,
            lifetime: 300,
            default_min_period: 1,
            default_max_period: None,
            notif_if_disabled: true,
            binding: "U".into(),
        }
    }

    fn record(endpoint: &str, bs_identity: &str) -> DeviceSecurityRecord {
        DeviceSecurityRecord {
            endpoint: endpoint.into(),
            client: ClientSecurity::Psk {
                identity: format!("{endpoint}-client"),
                key: "0102".into(),
            },
            bootstrap: Some(DeviceBootstrapCredential {
                bootstrap_server: credential(SecurityMode::Psk, bs_identity, "aabb"),
                lwm2m_server: credential(SecurityMode::Psk, &format!("{endpoint}-op"), "ccdd"),
            }),
            profile: ProfileBootstrapConfig {
                bootstrap: vec![
                    template(111, true, SecurityMode::Psk, 5688),
                    template(10, false, SecurityMode::Psk, 5686),
                ],
                bootstrap_server_update_enable: true,
                auto_id_for_security_object: false,
                access_control: vec![],
            },
        }
    }

    fn security_store(records: Vec<DeviceSecurityRecord>) -> (SecurityStore, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let store = SecurityStore::new(
            Arc::new(InMemoryCredentialRepository::from_records(records)),
            Arc::new(BootstrapConfigStore::new()),
            Arc::new(TransportSessionRegistry::new()),
            notifier.clone(),
            "localhost",
        );
        (store, notifier)
    }

    #[test]
    fn test_get_by_identity_stores_config() {
        let (security, notifier) = security_store(vec![record("dev-1", "bs-1")]);

        let info = security.get_by_identity("dev-1-client").unwrap();
        assert_eq!(info.endpoint, "dev-1");
        assert!(matches!(info.key, SecurityKey::Psk { .. }));

        let config = security.config_store().get("dev-1").unwrap();
        assert_eq!(config.security.len(), 2);
        assert!(security.sessions().get_session_by_endpoint("dev-1").is_some());

        let events = notifier.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, EventLevel::Info);
    }

    #[test]
    fn test_unknown_identity_and_endpoint() {
        let (security, _) = security_store(vec![]);
        assert!(security.get_by_identity("nobody").is_none());
        assert!(security.get_all_by_endpoint("nobody").is_none());
        assert!(security.sessions().is_empty());
    }

    #[test]
    fn test_get_all_by_endpoint() {
        let (security, _) = security_store(vec![record("dev-1", "bs-1")]);
        let infos: Vec<_> = security.get_all_by_endpoint("dev-1").unwrap().collect();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].psk_identity(), Some("dev-1-client"));
    }

    #[test]
    fn test_security_mode_mismatch_notifies() {
        let mut mismatched = record("dev-1", "bs-1");
        if let Some(device) = mismatched.bootstrap.as_mut() {
            device.lwm2m_server.security_mode = SecurityMode::NoSec;
        }
        let (security, notifier) = security_store(vec![mismatched]);

        assert!(security.get_all_by_endpoint("dev-1").is_none());
        assert!(security.config_store().get("dev-1").is_none());

        let events = notifier.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, EventLevel::Error);
        assert!(events[0].message.contains("PSK"));
    }

    #[test]
    fn test_missing_bootstrap_credentials() {
        let mut no_bootstrap = record("dev-1", "bs-1");
        no_bootstrap.bootstrap = None;
        let (security, notifier) = security_store(vec![no_bootstrap]);

        assert!(security.get_by_identity("dev-1-client").is_none());
        assert!(security.config_store().is_empty());
        assert!(notifier.events.lock().is_empty());
    }

    #[test]
    fn test_psk_collision_keeps_first_owner() {
        let (security, _) = security_store(vec![record("dev-1", "shared"), record("dev-2", "shared")]);

        assert!(security.get_by_identity("dev-1-client").is_some());
        // collision is swallowed; the handshake info is still returned
        assert!(security.get_by_identity("dev-2-client").is_some());

        assert!(security.config_store().get("dev-1").is_some());
        assert!(security.config_store().get("dev-2").is_none());
    }

    #[test]
    fn test_repeated_lookup_replaces_config() {
        let (security, _) = security_store(vec![record("dev-1", "bs-1")]);
        security.get_by_identity("dev-1-client").unwrap();
        security.get_by_identity("dev-1-client").unwrap();
        assert_eq!(security.config_store().len(), 1);
    }

    #[test]
    fn test_bootstrap_update_disabled_strips_bootstrap_entry() {
        let mut record = record("dev-1", "bs-1");
        record.profile.bootstrap_server_update_enable = false;
        let (security, _) = security_store(vec![record]);

        security.get_by_identity("dev-1-client").unwrap();
        let config = security.config_store().get("dev-1").unwrap();
        assert!(config.bootstrap_security().is_none());
        assert_eq!(config.security.len(), 1);
        assert_eq!(config.servers.len(), 1);
    }
}
