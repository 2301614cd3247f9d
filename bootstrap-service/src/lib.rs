//! # LWM2M Bootstrap Service
//!
//! This service provides:
//! - Validation of bootstrap configurations (Security, Server, ACL objects)
//! - A per-endpoint configuration store with PSK identity uniqueness
//! - Handshake-time credential resolution from device credential templates
//! - The request sequence of a bootstrap session (discover, delete, write)
//!
//! ## Bootstrap flow
//!
//! ```text
//! DTLS handshake ──▶ SecurityStore ──▶ BootstrapConfigStore
//!                                             │
//! bootstrap request ──▶ TaskProvider ◀────────┘
//!                           │
//!                           ▼
//!                 Discover / Delete / Write
//! ```
//!
//! The CoAP/DTLS engine that sends the requests lives outside this crate.

pub mod checker;
pub mod credential;
pub mod link;
pub mod repository;
pub mod security;
pub mod session;
pub mod store;
pub mod task;

use std::sync::Arc;

use shared::config::BootstrapServiceConfig;

/// Components of a running bootstrap server
pub struct BootstrapContext {
    /// Configuration
    pub config: BootstrapServiceConfig,
    /// Validated configurations per endpoint
    pub config_store: Arc<store::BootstrapConfigStore>,
    /// Handshake credential resolution
    pub security_store: security::SecurityStore,
    /// Request sequencing for bootstrap sessions
    pub task_provider: task::TaskProvider,
    /// Transport sessions for telemetry
    pub sessions: Arc<session::TransportSessionRegistry>,
}

impl BootstrapContext {
    /// Wire the components around a credential repository and telemetry sink
    pub fn new(
        config: BootstrapServiceConfig,
        repository: Arc<dyn repository::CredentialRepository>,
        notifier: Arc<dyn session::TelemetryNotifier>,
    ) -> Self {
        let config_store = Arc::new(store::BootstrapConfigStore::new());
        let sessions = Arc::new(session::TransportSessionRegistry::new());

        let security_store = security::SecurityStore::new(
            repository,
            Arc::clone(&config_store),
            Arc::clone(&sessions),
            notifier,
            config.server.default_server_host.clone(),
        );
        let task_provider = task::TaskProvider::new(Arc::clone(&config_store));

        Self {
            config,
            config_store,
            security_store,
            task_provider,
            sessions,
        }
    }
}
