//! # Configuration Checker
//!
//! Pure structural validation of a `BootstrapConfig` before it is stored.
//!
//! ## Rules
//!
//! - Every Security entry carries the key material its mode needs
//! - EST is not supported
//! - At most one bootstrap-server Security entry, with short server id 0
//! - Operational Security entries use distinct short server ids
//! - Every Server entry has exactly one matching Security entry
//! - Operational short server ids stay out of the reserved range

use std::collections::HashSet;

use shared::{
    constants::*,
    types::{BootstrapConfig, SecurityCredentials, ServerSecurity},
};

/// Error raised when a configuration violates an object-model invariant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct InvalidConfiguration(pub String);

impl From<InvalidConfiguration> for shared::BootstrapError {
    fn from(err: InvalidConfiguration) -> Self {
        shared::BootstrapError::InvalidConfiguration(err.0)
    }
}

fn invalid<T>(message: impl Into<String>) -> Result<T, InvalidConfiguration> {
    Err(InvalidConfiguration(message.into()))
}

/// Validates bootstrap configurations
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigurationChecker;

impl ConfigurationChecker {
    pub fn new() -> Self {
        Self
    }

    /// Verify a configuration, failing on the first violated rule
    pub fn verify(&self, config: &BootstrapConfig) -> Result<(), InvalidConfiguration> {
        let mut bootstrap_entries = 0usize;
        let mut short_server_ids = HashSet::new();

        for (key, security) in &config.security {
            Self::verify_credentials(*key, security)?;

            if security.bootstrap_server {
                bootstrap_entries += 1;
                if security.short_server_id() != BOOTSTRAP_SHORT_SERVER_ID {
                    return invalid(format!(
                        "security[{}]: bootstrap server entry must use short server id {}, got {}",
                        key,
                        BOOTSTRAP_SHORT_SERVER_ID,
                        security.short_server_id()
                    ));
                }
            } else {
                let Some(short_id) = security.server_id else {
                    return invalid(format!(
                        "security[{}]: LWM2M server entry has no short server id",
                        key
                    ));
                };
                if !short_server_ids.insert(short_id) {
                    return invalid(format!(
                        "security[{}]: short server id {} is used by more than one security entry",
                        key, short_id
                    ));
                }
            }
        }

        if bootstrap_entries > 1 {
            return invalid(format!(
                "only one bootstrap server security entry is allowed, found {}",
                bootstrap_entries
            ));
        }

        for (key, server) in &config.servers {
            let mut matches = Self::matching_security(config, server.short_id);
            let Some(security) = matches.next() else {
                return invalid(format!(
                    "no security entry for server instance {} (short id {})",
                    key, server.short_id
                ));
            };
            if matches.next().is_some() {
                return invalid(format!(
                    "server[{}]: more than one security entry for short id {}",
                    key, server.short_id
                ));
            }

            if security.bootstrap_server {
                if server.short_id != BOOTSTRAP_SHORT_SERVER_ID {
                    return invalid(format!(
                        "server[{}]: short id of the bootstrap server must be {}",
                        key, BOOTSTRAP_SHORT_SERVER_ID
                    ));
                }
            } else if !is_operational_short_server_id(server.short_id) {
                return invalid(format!(
                    "server[{}]: short id {} is reserved and must not identify an LWM2M server (allowed {}..={})",
                    key, server.short_id, MIN_SHORT_SERVER_ID, MAX_SHORT_SERVER_ID
                ));
            }
        }

        Ok(())
    }

    /// Security entries a short server id refers to
    fn matching_security(
        config: &BootstrapConfig,
        short_id: u16,
    ) -> impl Iterator<Item = &ServerSecurity> {
        config.security.values().filter(move |sec| match sec.server_id {
            None => short_id == BOOTSTRAP_SHORT_SERVER_ID,
            Some(id) => id == short_id,
        })
    }

    fn verify_credentials(key: u16, security: &ServerSecurity) -> Result<(), InvalidConfiguration> {
        match &security.credentials {
            SecurityCredentials::NoSec => Ok(()),
            SecurityCredentials::Psk { identity, key: secret } => {
                if identity.is_empty() {
                    return invalid(format!("security[{}]: pre-shared-key mode, no identity", key));
                }
                if std::str::from_utf8(identity).is_err() {
                    return invalid(format!(
                        "security[{}]: pre-shared-key mode, identity is not valid UTF-8",
                        key
                    ));
                }
                if secret.is_empty() {
                    return invalid(format!("security[{}]: pre-shared-key mode, no secret key", key));
                }
                Ok(())
            }
            SecurityCredentials::Rpk {
                public_key,
                private_key,
                server_public_key,
            } => {
                if public_key.is_empty() {
                    return invalid(format!("security[{}]: raw-public-key mode, no public key", key));
                }
                if private_key.is_empty() {
                    return invalid(format!("security[{}]: raw-public-key mode, no secret key", key));
                }
                if server_public_key.is_empty() {
                    return invalid(format!(
                        "security[{}]: raw-public-key mode, no server public key",
                        key
                    ));
                }
                Ok(())
            }
            SecurityCredentials::X509 {
                certificate,
                private_key,
                server_certificate,
            } => {
                if certificate.is_empty() {
                    return invalid(format!("security[{}]: x509 mode, no certificate", key));
                }
                if private_key.is_empty() {
                    return invalid(format!("security[{}]: x509 mode, no secret key", key));
                }
                if server_certificate.is_empty() {
                    return invalid(format!("security[{}]: x509 mode, no server certificate", key));
                }
                Ok(())
            }
            SecurityCredentials::Est => {
                invalid(format!("security[{}]: EST is not currently supported", key))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::types::ServerConfig;

    fn security(server_id: Option<u16>, bootstrap: bool, credentials: SecurityCredentials) -> ServerSecurity {
        ServerSecurity {
            uri: "coap://localhost:5685".into(),
            bootstrap_server: bootstrap,
            server_id,
            client_hold_off_time: None,
            bootstrap_server_account_timeout: None,
            credentials,
        }
    }

    fn psk() -> SecurityCredentials {
        SecurityCredentials::Psk {
            identity: b"id".to_vec(),
            key: vec![0xAB],
        }
    }

    fn valid_config() -> BootstrapConfig {
        let mut config = BootstrapConfig::default();
        config.security.insert(0, security(None, true, SecurityCredentials::NoSec));
        config.security.insert(1, security(Some(10), false, psk()));
        config.servers.insert(0, ServerConfig::new(10));
        config
    }

    #[test]
    fn test_valid_config() {
        assert!(ConfigurationChecker::new().verify(&valid_config()).is_ok());
    }

    #[test]
    fn test_rejects_short_id_zero_for_operational_server() {
        let mut config = BootstrapConfig::default();
        config.security.insert(0, security(Some(0), false, SecurityCredentials::NoSec));
        config.servers.insert(0, ServerConfig::new(0));

        let err = ConfigurationChecker::new().verify(&config).unwrap_err();
        assert!(err.0.contains("reserved"));
    }

    #[test]
    fn test_rejects_reserved_short_id() {
        let mut config = BootstrapConfig::default();
        config.security.insert(0, security(Some(RESERVED_SHORT_SERVER_ID), false, psk()));
        config.servers.insert(0, ServerConfig::new(RESERVED_SHORT_SERVER_ID));

        assert!(ConfigurationChecker::new().verify(&config).is_err());
    }

    #[test]
    fn test_rejects_est_regardless_of_fields() {
        let mut config = valid_config();
        config.security.insert(2, security(Some(11), false, SecurityCredentials::Est));

        let err = ConfigurationChecker::new().verify(&config).unwrap_err();
        assert!(err.0.contains("EST"));
    }

    #[test]
    fn test_rejects_missing_security_for_server() {
        let mut config = valid_config();
        config.servers.insert(1, ServerConfig::new(42));

        let err = ConfigurationChecker::new().verify(&config).unwrap_err();
        assert!(err.0.contains("no security entry for server instance"));
    }

    #[test]
    fn test_rejects_incomplete_psk() {
        let mut config = valid_config();
        config.security.insert(
            1,
            security(
                Some(10),
                false,
                SecurityCredentials::Psk {
                    identity: b"id".to_vec(),
                    key: vec![],
                },
            ),
        );

        let err = ConfigurationChecker::new().verify(&config).unwrap_err();
        assert!(err.0.contains("no secret key"));
    }

    #[test]
    fn test_rejects_incomplete_rpk_and_x509() {
        let mut config = valid_config();
        config.security.insert(
            1,
            security(
                Some(10),
                false,
                SecurityCredentials::Rpk {
                    public_key: vec![1],
                    private_key: vec![2],
                    server_public_key: vec![],
                },
            ),
        );
        assert!(ConfigurationChecker::new().verify(&config).is_err());

        config.security.insert(
            1,
            security(
                Some(10),
                false,
                SecurityCredentials::X509 {
                    certificate: vec![],
                    private_key: vec![2],
                    server_certificate: vec![3],
                },
            ),
        );
        let err = ConfigurationChecker::new().verify(&config).unwrap_err();
        assert!(err.0.contains("no certificate"));
    }

    #[test]
    fn test_rejects_bootstrap_server_with_non_zero_short_id() {
        let mut config = BootstrapConfig::default();
        config.security.insert(0, security(Some(111), true, SecurityCredentials::NoSec));

        assert!(ConfigurationChecker::new().verify(&config).is_err());
    }

    #[test]
    fn test_rejects_two_bootstrap_entries() {
        let mut config = valid_config();
        config.security.insert(5, security(Some(0), true, SecurityCredentials::NoSec));

        let err = ConfigurationChecker::new().verify(&config).unwrap_err();
        assert!(err.0.contains("only one bootstrap server"));
    }

    #[test]
    fn test_bootstrap_server_config_must_use_short_id_zero() {
        let mut config = valid_config();
        config.servers.insert(1, ServerConfig::new(0));
        assert!(ConfigurationChecker::new().verify(&config).is_ok());
    }

    #[test]
    fn test_rejects_duplicate_operational_short_ids() {
        let mut config = valid_config();
        config.security.insert(2, security(Some(10), false, SecurityCredentials::NoSec));

        let err = ConfigurationChecker::new().verify(&config).unwrap_err();
        assert!(err.0.contains("more than one security entry"));

        config.servers.clear();
        assert!(ConfigurationChecker::new().verify(&config).is_err());
    }

    #[test]
    fn test_rejects_server_matching_two_security_entries() {
        let mut config = BootstrapConfig::default();
        config.security.insert(0, security(None, true, SecurityCredentials::NoSec));
        config.security.insert(1, security(Some(0), false, SecurityCredentials::NoSec));
        config.servers.insert(0, ServerConfig::new(0));

        let err = ConfigurationChecker::new().verify(&config).unwrap_err();
        assert!(err.0.contains("more than one security entry for short id 0"));
    }

    #[test]
    fn test_rejects_non_utf8_psk_identity() {
        let mut config = valid_config();
        config.security.insert(
            1,
            security(
                Some(10),
                false,
                SecurityCredentials::Psk {
                    identity: vec![0xff, 0xfe],
                    key: vec![0xAB],
                },
            ),
        );

        let err = ConfigurationChecker::new().verify(&config).unwrap_err();
        assert!(err.0.contains("UTF-8"));
    }

    #[test]
    fn test_rejects_operational_entry_without_short_id() {
        let mut config = BootstrapConfig::default();
        config.security.insert(0, security(None, false, psk()));

        let err = ConfigurationChecker::new().verify(&config).unwrap_err();
        assert!(err.0.contains("no short server id"));
    }
}
