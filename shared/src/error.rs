//! # Error Types for the LWM2M Bootstrap Service
//!
//! This module defines the error type shared by every component of the
//! bootstrap service, with a category for log correlation.

use thiserror::Error;

/// Main error type for the bootstrap service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BootstrapError {
    // =========================================================================
    // CONFIGURATION STORE ERRORS
    // =========================================================================

    /// Bootstrap configuration violates an LWM2M object-model invariant
    #[error("Invalid bootstrap configuration: {0}")]
    InvalidConfiguration(String),

    /// Bootstrap-server PSK identity already owned by another endpoint
    #[error("PSK identity '{identity}' already used for this bootstrap server '{url}' by endpoint '{owner}'")]
    PskIdentityCollision {
        identity: String,
        url: String,
        owner: String,
    },

    // =========================================================================
    // CREDENTIAL ERRORS
    // =========================================================================

    /// Credential template is missing for an endpoint
    #[error("No bootstrap credential config for endpoint '{0}'")]
    MissingCredentialConfig(String),

    /// Credential template or key material is malformed
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// Device credential and profile disagree on a server's security mode
    #[error("Security mode mismatch for {role} of endpoint '{endpoint}': profile declares {profile}, device declares {device}")]
    SecurityModeMismatch {
        endpoint: String,
        role: String,
        profile: String,
        device: String,
    },

    // =========================================================================
    // PROTOCOL ERRORS
    // =========================================================================

    /// CoRE link format could not be parsed
    #[error("Invalid link format: {0}")]
    InvalidLink(String),

    /// LWM2M path could not be parsed
    #[error("Invalid LWM2M path: {0}")]
    InvalidPath(String),

    // =========================================================================
    // STORAGE ERRORS
    // =========================================================================

    /// Failed to read/write file
    #[error("Storage I/O error: {0}")]
    StorageIOError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // =========================================================================
    // SERVICE CONFIGURATION ERRORS
    // =========================================================================

    /// Invalid service configuration
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

/// Result type alias using BootstrapError
pub type BootstrapResult<T> = Result<T, BootstrapError>;

// =============================================================================
// ERROR CONVERSIONS
// =============================================================================

impl From<serde_json::Error> for BootstrapError {
    fn from(err: serde_json::Error) -> Self {
        BootstrapError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for BootstrapError {
    fn from(err: std::io::Error) -> Self {
        BootstrapError::StorageIOError(err.to_string())
    }
}

impl From<hex::FromHexError> for BootstrapError {
    fn from(err: hex::FromHexError) -> Self {
        BootstrapError::InvalidCredential(format!("invalid hex key: {}", err))
    }
}

impl From<base64::DecodeError> for BootstrapError {
    fn from(err: base64::DecodeError) -> Self {
        BootstrapError::InvalidCredential(format!("invalid base64 key: {}", err))
    }
}

// =============================================================================
// ERROR CATEGORIES (for logging)
// =============================================================================

impl BootstrapError {
    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            BootstrapError::InvalidConfiguration(_)
            | BootstrapError::PskIdentityCollision { .. } => "config_store",

            BootstrapError::MissingCredentialConfig(_)
            | BootstrapError::InvalidCredential(_)
            | BootstrapError::SecurityModeMismatch { .. } => "credential",

            BootstrapError::InvalidLink(_) | BootstrapError::InvalidPath(_) => "protocol",

            BootstrapError::StorageIOError(_) | BootstrapError::SerializationError(_) => "storage",

            BootstrapError::ConfigurationError(_) => "config",
        }
    }

    /// Whether this is the expected race between overlapping bootstrap attempts
    pub fn is_psk_collision(&self) -> bool {
        matches!(self, BootstrapError::PskIdentityCollision { .. })
    }
}
