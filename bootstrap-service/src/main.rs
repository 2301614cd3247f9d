//! # LWM2M Bootstrap Service
//!
//! Dry-run of the bootstrap pipeline over a credential file: every device is
//! resolved into a bootstrap configuration and its request plan is logged.
//!
//! ## Running
//!
//! ```bash
//! export LWM2M_BS_CREDENTIALS_PATH=./credentials.json
//! export LWM2M_BS_DEFAULT_HOST=lwm2m.example.com
//! export LWM2M_BS_LOG_LEVEL=debug
//!
//! cargo run --release -p bootstrap-service
//! ```

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use bootstrap_service::{
    credential,
    repository::{CredentialRepository, InMemoryCredentialRepository},
    session::LoggingTelemetryNotifier,
    task::{BootstrapResponse, BootstrapSession, TransportIdentity},
    BootstrapContext,
};
use shared::config::BootstrapServiceConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = BootstrapServiceConfig::from_env()?;
    config.validate()?;

    // Initialize logging
    let level: Level = config.logging.level.parse()?;
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(config.logging.with_thread_ids)
        .init();

    info!("Starting LWM2M Bootstrap Service (dry run)");
    info!("Version: {}", shared::VERSION);
    info!(
        bind = %config.server.bind_addr(),
        secure_bind = %config.server.secure_bind_addr(),
        default_host = %config.server.default_server_host,
        "Configuration loaded"
    );

    let repository = Arc::new(
        InMemoryCredentialRepository::load_from_file(&config.storage.credentials_path).await?,
    );
    let records = repository.records();
    for (mode, count) in credential::count_by_mode(&records) {
        info!(mode = %mode, devices = count, "Client security modes");
    }

    let context = BootstrapContext::new(
        config,
        repository.clone(),
        Arc::new(LoggingTelemetryNotifier),
    );

    let mut configured = 0usize;
    for endpoint in repository.endpoints() {
        let Some(record) = repository.find_by_endpoint(&endpoint) else {
            continue;
        };

        let identity = match context.security_store.add_value_to_store(&record, &endpoint) {
            Some(info) => match info.psk_identity() {
                Some(identity) => TransportIdentity::Psk {
                    identity: identity.to_string(),
                },
                None => TransportIdentity::Unsecured {
                    address: context.config.server.secure_bind_addr(),
                },
            },
            None => TransportIdentity::Unsecured {
                address: context.config.server.bind_addr(),
            },
        };

        if context.config_store.get(&endpoint).is_none() {
            warn!(endpoint = %endpoint, "Endpoint is not configured for bootstrap");
            continue;
        }

        context.task_provider.put(&endpoint);
        let session = BootstrapSession::new(endpoint.clone(), identity);

        let mut tasks = context.task_provider.get_tasks(&session, None);
        if let Some(round) = tasks.as_ref().filter(|round| !round.last) {
            info!(endpoint = %endpoint, requests = round.requests.len(), "Discover round");
            // no device to answer, so the next round falls back to default instance ids
            let no_responses: &[BootstrapResponse] = &[];
            tasks = context.task_provider.get_tasks(&session, Some(no_responses));
        }

        if let Some(tasks) = tasks {
            for request in &tasks.requests {
                info!(endpoint = %endpoint, request = %request, "Planned request");
            }
            info!(
                endpoint = %endpoint,
                requests = tasks.requests.len(),
                supported_objects = ?tasks.supported_objects,
                "Bootstrap plan ready"
            );
            configured += 1;
        }

        context.task_provider.remove(&endpoint);
        context.sessions.remove_session_by_endpoint(&endpoint);
    }

    info!(
        devices = repository.len(),
        configured,
        "Dry run finished"
    );

    Ok(())
}
