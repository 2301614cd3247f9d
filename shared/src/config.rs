//! # Configuration for the LWM2M Bootstrap Service
//!
//! This module handles configuration loading and validation,
//! supporting environment variables and serialized configuration.

use crate::constants::*;
use crate::error::{BootstrapError, BootstrapResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

// =============================================================================
// BOOTSTRAP SERVICE CONFIGURATION
// =============================================================================

/// Configuration for the Bootstrap Service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BootstrapServiceConfig {
    /// Bootstrap server endpoint configuration
    pub server: BootstrapServerConfig,

    /// Credential storage configuration
    pub storage: StorageConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl BootstrapServiceConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> BootstrapResult<Self> {
        let mut config = Self::default();

        if let Ok(host) = env::var(ENV_BS_HOST) {
            config.server.host = host;
        }

        if let Ok(port) = env::var(ENV_BS_PORT) {
            config.server.port = parse_port(ENV_BS_PORT, &port)?;
        }

        if let Ok(port) = env::var(ENV_BS_SECURE_PORT) {
            config.server.secure_port = parse_port(ENV_BS_SECURE_PORT, &port)?;
        }

        if let Ok(host) = env::var(ENV_BS_DEFAULT_HOST) {
            config.server.default_server_host = host;
        }

        if let Ok(path) = env::var(ENV_BS_CREDENTIALS_PATH) {
            config.storage.credentials_path = PathBuf::from(path);
        }

        if let Ok(level) = env::var(ENV_BS_LOG_LEVEL) {
            config.logging.level = level;
        }

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> BootstrapResult<()> {
        self.server.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

fn parse_port(var: &str, value: &str) -> BootstrapResult<u16> {
    value
        .parse::<u16>()
        .map_err(|_| BootstrapError::ConfigurationError(format!("{} is not a valid port: '{}'", var, value)))
}

// =============================================================================
// SERVER CONFIGURATION
// =============================================================================

/// Bootstrap server endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapServerConfig {
    /// Host to bind to
    pub host: String,

    /// Unsecured CoAP port
    pub port: u16,

    /// DTLS-secured CoAP port
    pub secure_port: u16,

    /// Host used for server templates that do not name one
    pub default_server_host: String,
}

impl Default for BootstrapServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: DEFAULT_PORT_BOOTSTRAP_NO_SEC,
            secure_port: DEFAULT_PORT_BOOTSTRAP_SEC,
            default_server_host: DEFAULT_HOST.into(),
        }
    }
}

impl BootstrapServerConfig {
    /// Get the unsecured bind address
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the secured bind address
    pub fn secure_bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.secure_port)
    }

    fn validate(&self) -> BootstrapResult<()> {
        if self.port == self.secure_port {
            return Err(BootstrapError::ConfigurationError(format!(
                "port and secure port must differ (both {})",
                self.port
            )));
        }
        if self.default_server_host.is_empty() {
            return Err(BootstrapError::ConfigurationError(
                "default server host must not be empty".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// STORAGE CONFIGURATION
// =============================================================================

/// Storage configuration for device credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the JSON credential file
    pub credentials_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            credentials_path: PathBuf::from(DEFAULT_CREDENTIALS_PATH),
        }
    }
}

// =============================================================================
// LOGGING CONFIGURATION
// =============================================================================

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Maximum log level (trace, debug, info, warn, error)
    pub level: String,

    /// Include thread ids in log lines
    pub with_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            with_thread_ids: true,
        }
    }
}

impl LoggingConfig {
    fn validate(&self) -> BootstrapResult<()> {
        match self.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(BootstrapError::ConfigurationError(format!(
                "unknown log level '{}'",
                other
            ))),
        }
    }
}
