//! # Bootstrap Credential Templates
//!
//! This module handles:
//! - The device's own handshake credentials (`ClientSecurity`)
//! - The device's keys towards the bootstrap and LWM2M servers
//! - The profile's server templates
//! - Resolving all of the above into a concrete `BootstrapConfig`
//!
//! ## Key encodings
//!
//! - PSK keys: hex
//! - RPK keys and X.509 certificates: base64 (standard alphabet)

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use shared::{
    constants::*,
    error::{BootstrapError, BootstrapResult},
    types::{
        AclConfig, BootstrapConfig, SecurityCredentials, SecurityMode, ServerConfig,
        ServerSecurity,
    },
};

// =============================================================================
// CLIENT (HANDSHAKE) CREDENTIALS
// =============================================================================

/// Credentials the device presents when connecting to the bootstrap server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "securityConfigClientMode", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientSecurity {
    NoSec,
    Psk {
        /// PSK identity
        identity: String,
        /// Pre-shared key, hex encoded
        key: String,
    },
    Rpk {
        /// Client public key, base64 encoded
        key: String,
    },
    #[serde(rename = "X509")]
    X509 {
        /// Client certificate, base64 encoded (trust-store validated if absent)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cert: Option<String>,
    },
}

impl ClientSecurity {
    pub fn mode(&self) -> SecurityMode {
        match self {
            ClientSecurity::NoSec => SecurityMode::NoSec,
            ClientSecurity::Psk { .. } => SecurityMode::Psk,
            ClientSecurity::Rpk { .. } => SecurityMode::Rpk,
            ClientSecurity::X509 { .. } => SecurityMode::X509,
        }
    }

    /// Handshake security info for an endpoint
    ///
    /// # Returns
    /// `None` for NoSec clients, which perform no DTLS handshake
    pub fn to_security_info(&self, endpoint: &str) -> BootstrapResult<Option<SecurityInfo>> {
        let key = match self {
            ClientSecurity::NoSec => return Ok(None),
            ClientSecurity::Psk { identity, key } => {
                if identity.is_empty() {
                    return Err(BootstrapError::InvalidCredential(format!(
                        "endpoint '{}': empty PSK identity",
                        endpoint
                    )));
                }
                SecurityKey::Psk {
                    identity: identity.clone(),
                    key: hex::decode(key)?,
                }
            }
            ClientSecurity::Rpk { key } => SecurityKey::Rpk {
                public_key: decode_base64(key)?,
            },
            ClientSecurity::X509 { cert } => SecurityKey::X509 {
                certificate: cert.as_deref().map(decode_base64).transpose()?,
            },
        };

        Ok(Some(SecurityInfo {
            endpoint: endpoint.to_string(),
            key,
        }))
    }
}

/// Security info used to authenticate a device during the DTLS handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityInfo {
    pub endpoint: String,
    pub key: SecurityKey,
}

impl SecurityInfo {
    /// PSK identity, if this is PSK security info
    pub fn psk_identity(&self) -> Option<&str> {
        match &self.key {
            SecurityKey::Psk { identity, .. } => Some(identity),
            _ => None,
        }
    }
}

/// Handshake key material
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityKey {
    Psk { identity: String, key: Vec<u8> },
    Rpk { public_key: Vec<u8> },
    X509 { certificate: Option<Vec<u8>> },
}

// =============================================================================
// DEVICE BOOTSTRAP CREDENTIALS
// =============================================================================

/// Keys the device uses towards one server role
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServerCredential {
    pub security_mode: SecurityMode,

    /// PSK identity, RPK public key or X.509 certificate
    #[serde(default)]
    pub client_public_key_or_id: String,

    /// PSK key (hex) or private key (base64)
    #[serde(default)]
    pub client_secret_key: String,
}

/// Device keys for the bootstrap server and the LWM2M servers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceBootstrapCredential {
    pub bootstrap_server: ServerCredential,
    pub lwm2m_server: ServerCredential,
}

// =============================================================================
// PROFILE SERVER TEMPLATES
// =============================================================================

/// Profile-level description of one server the device should know
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServerTemplate {
    pub short_server_id: u16,

    #[serde(default)]
    pub bootstrap_server_is: bool,

    #[serde(default)]
    pub host: Option<String>,

    pub port: u16,

    pub security_mode: SecurityMode,

    /// Server public key (RPK) or certificate (X.509), base64 encoded
    #[serde(default)]
    pub server_public_key: Option<String>,

    #[serde(default = "default_client_hold_off_time")]
    pub client_hold_off_time: u32,

    #[serde(default = "default_bootstrap_server_account_timeout")]
    pub bootstrap_server_account_timeout: u32,

    #[serde(default = "default_lifetime")]
    pub lifetime: u32,

    #[serde(default = "default_min_period")]
    pub default_min_period: u32,

    #[serde(default)]
    pub default_max_period: Option<u32>,

    #[serde(default = "default_true")]
    pub notif_if_disabled: bool,

    #[serde(default = "default_binding")]
    pub binding: String,
}

impl ServerTemplate {
    /// Port a server of this role and security mode listens on
    pub fn expected_port(&self) -> u16 {
        match (self.bootstrap_server_is, self.security_mode) {
            (true, SecurityMode::NoSec) => DEFAULT_PORT_BOOTSTRAP_NO_SEC,
            (true, _) => DEFAULT_PORT_BOOTSTRAP_SEC,
            (false, SecurityMode::NoSec) => DEFAULT_PORT_SERVER_NO_SEC,
            (false, _) => DEFAULT_PORT_SERVER_SEC,
        }
    }

    fn role(&self) -> &'static str {
        if self.bootstrap_server_is {
            "Bootstrap Server"
        } else {
            "LwM2M Server"
        }
    }
}

fn default_client_hold_off_time() -> u32 {
    DEFAULT_CLIENT_HOLD_OFF_TIME_SECS
}

fn default_bootstrap_server_account_timeout() -> u32 {
    DEFAULT_BOOTSTRAP_SERVER_ACCOUNT_TIMEOUT_SECS
}

fn default_lifetime() -> u32 {
    DEFAULT_LIFETIME_SECS
}

fn default_min_period() -> u32 {
    DEFAULT_MIN_PERIOD_SECS
}

fn default_true() -> bool {
    true
}

fn default_binding() -> String {
    DEFAULT_BINDING.into()
}

/// Profile-level bootstrap settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileBootstrapConfig {
    /// Servers to provision
    #[serde(default)]
    pub bootstrap: Vec<ServerTemplate>,

    /// Whether the bootstrap server's own instances may be rewritten
    #[serde(default)]
    pub bootstrap_server_update_enable: bool,

    /// Discover existing instances before writing
    #[serde(default)]
    pub auto_id_for_security_object: bool,

    /// Access Control instances to write
    #[serde(default)]
    pub access_control: Vec<AclConfig>,
}

/// Everything known about one device's bootstrap entitlement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSecurityRecord {
    pub endpoint: String,

    pub client: ClientSecurity,

    #[serde(default)]
    pub bootstrap: Option<DeviceBootstrapCredential>,

    #[serde(default)]
    pub profile: ProfileBootstrapConfig,
}

// =============================================================================
// RESOLUTION
// =============================================================================

/// Resolves credential templates into bootstrap configurations
#[derive(Debug, Clone)]
pub struct BootstrapConfigResolver {
    /// Host used for templates that name none
    default_host: String,
}

impl BootstrapConfigResolver {
    pub fn new(default_host: impl Into<String>) -> Self {
        Self {
            default_host: default_host.into(),
        }
    }

    /// Resolve a device record into a concrete bootstrap configuration
    pub fn resolve(&self, record: &DeviceSecurityRecord) -> BootstrapResult<BootstrapConfig> {
        let endpoint = record.endpoint.as_str();
        let device = record
            .bootstrap
            .as_ref()
            .ok_or_else(|| BootstrapError::MissingCredentialConfig(endpoint.to_string()))?;

        if record.profile.bootstrap.is_empty() {
            return Err(BootstrapError::MissingCredentialConfig(endpoint.to_string()));
        }

        validate_templates(&record.profile.bootstrap)?;

        let mut config = BootstrapConfig {
            auto_id_for_security_object: record.profile.auto_id_for_security_object,
            ..BootstrapConfig::default()
        };

        let mut server_index: u16 = 0;
        for (index, template) in record.profile.bootstrap.iter().enumerate() {
            let credential = if template.bootstrap_server_is {
                &device.bootstrap_server
            } else {
                &device.lwm2m_server
            };

            if credential.security_mode != template.security_mode {
                return Err(BootstrapError::SecurityModeMismatch {
                    endpoint: endpoint.to_string(),
                    role: template.role().to_string(),
                    profile: template.security_mode.to_string(),
                    device: credential.security_mode.to_string(),
                });
            }

            let security = self.build_security(template, credential)?;
            let key = u16::try_from(index).map_err(|_| {
                BootstrapError::InvalidCredential(format!("endpoint '{}': too many servers", endpoint))
            })?;
            config.security.insert(key, security);

            if !template.bootstrap_server_is {
                config.servers.insert(
                    server_index,
                    ServerConfig {
                        short_id: template.short_server_id,
                        lifetime: template.lifetime,
                        default_min_period: Some(template.default_min_period),
                        default_max_period: template.default_max_period,
                        disable_timeout: None,
                        notif_if_disabled: template.notif_if_disabled,
                        binding: template.binding.clone(),
                    },
                );
                server_index += 1;
            }
        }

        for (index, acl) in record.profile.access_control.iter().enumerate() {
            let key = u16::try_from(index).map_err(|_| {
                BootstrapError::InvalidCredential(format!("endpoint '{}': too many ACLs", endpoint))
            })?;
            config.acls.insert(key, acl.clone());
        }

        debug!(
            endpoint = %endpoint,
            security_entries = config.security.len(),
            server_entries = config.servers.len(),
            acl_entries = config.acls.len(),
            "Bootstrap credential config resolved"
        );

        Ok(config)
    }

    fn build_security(
        &self,
        template: &ServerTemplate,
        credential: &ServerCredential,
    ) -> BootstrapResult<ServerSecurity> {
        let host = template.host.as_deref().unwrap_or(&self.default_host);
        let uri = format!("{}://{}:{}", template.security_mode.scheme(), host, template.port);

        let credentials = match template.security_mode {
            SecurityMode::NoSec => SecurityCredentials::NoSec,
            SecurityMode::Psk => SecurityCredentials::Psk {
                identity: credential.client_public_key_or_id.as_bytes().to_vec(),
                key: hex::decode(&credential.client_secret_key)?,
            },
            SecurityMode::Rpk => SecurityCredentials::Rpk {
                public_key: decode_base64(&credential.client_public_key_or_id)?,
                private_key: decode_base64(&credential.client_secret_key)?,
                server_public_key: decode_base64(template.server_public_key.as_deref().unwrap_or_default())?,
            },
            SecurityMode::X509 => SecurityCredentials::X509 {
                certificate: decode_base64(&credential.client_public_key_or_id)?,
                private_key: decode_base64(&credential.client_secret_key)?,
                server_certificate: decode_base64(template.server_public_key.as_deref().unwrap_or_default())?,
            },
            SecurityMode::Est => SecurityCredentials::Est,
        };

        Ok(ServerSecurity {
            uri,
            bootstrap_server: template.bootstrap_server_is,
            server_id: if template.bootstrap_server_is {
                None
            } else {
                Some(template.short_server_id)
            },
            client_hold_off_time: Some(template.client_hold_off_time),
            bootstrap_server_account_timeout: template
                .bootstrap_server_is
                .then_some(template.bootstrap_server_account_timeout),
            credentials,
        })
    }
}

/// Validate profile server templates before resolution
pub fn validate_templates(templates: &[ServerTemplate]) -> BootstrapResult<()> {
    let mut short_server_ids = HashSet::new();
    let mut uris = HashSet::new();

    for template in templates {
        let server = template.role();

        if !is_operational_short_server_id(template.short_server_id) {
            return Err(BootstrapError::InvalidCredential(format!(
                "{} shortServerId {} must be between {} and {}",
                server, template.short_server_id, MIN_SHORT_SERVER_ID, MAX_SHORT_SERVER_ID
            )));
        }
        if !short_server_ids.insert(template.short_server_id) {
            return Err(BootstrapError::InvalidCredential(format!(
                "{} shortServerId {} must be unique for all servers",
                server, template.short_server_id
            )));
        }

        let uri = format!("{}:{}", template.host.as_deref().unwrap_or_default(), template.port);
        if !uris.insert(uri.clone()) {
            return Err(BootstrapError::InvalidCredential(format!(
                "{} host and port '{}' must be unique for all servers",
                server, uri
            )));
        }

        let port = template.expected_port();
        if template.port != port {
            return Err(BootstrapError::InvalidCredential(format!(
                "{} port {} for security {} must be {}",
                server, template.port, template.security_mode, port
            )));
        }

        match template.security_mode {
            SecurityMode::Rpk | SecurityMode::X509 => {
                let key = template.server_public_key.as_deref().unwrap_or_default();
                if key.trim().is_empty() {
                    return Err(BootstrapError::InvalidCredential(format!(
                        "{} {} server key must be specified",
                        server, template.security_mode
                    )));
                }
                decode_base64(key)?;
            }
            SecurityMode::NoSec | SecurityMode::Psk | SecurityMode::Est => {}
        }
    }

    Ok(())
}

/// Decode base64 key material, ignoring embedded line breaks
fn decode_base64(value: &str) -> BootstrapResult<Vec<u8>> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(base64::engine::general_purpose::STANDARD.decode(compact)?)
}

/// Group records by security mode (for startup summaries)
pub fn count_by_mode<'a>(records: impl IntoIterator<Item = &'a DeviceSecurityRecord>) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        *counts.entry(record.client.mode().to_string()).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(short_id: u16, bootstrap: bool, mode: SecurityMode, port: u16) -> ServerTemplate {
        ServerTemplate {
            short_server_id: short_id,
            bootstrap_server_is: bootstrap,
            host: Some("localhost".into()),
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

    fn record() -> DeviceSecurityRecord {
        DeviceSecurityRecord {
            endpoint: "dev-1".into(),
            client: ClientSecurity::Psk {
                identity: "dev-1-identity".into(),
                key: "0a0b0c".into(),
            },
            bootstrap: Some(DeviceBootstrapCredential {
                bootstrap_server: ServerCredential {
                    security_mode: SecurityMode::NoSec,
                    client_public_key_or_id: String::new(),
                    client_secret_key: String::new(),
                },
                lwm2m_server: ServerCredential {
                    security_mode: SecurityMode::Psk,
                    client_public_key_or_id: "dev-1-op".into(),
                    client_secret_key: "deadbeef".into(),
                },
            }),
            profile: ProfileBootstrapConfig {
                bootstrap: vec![
                    template(111, true, SecurityMode::NoSec, DEFAULT_PORT_BOOTSTRAP_NO_SEC),
                    template(10, false, SecurityMode::Psk, DEFAULT_PORT_SERVER_SEC),
                ],
                bootstrap_server_update_enable: true,
                auto_id_for_security_object: false,
                access_control: vec![],
            },
        }
    }

    #[test]
    fn test_resolve_record() {
        let config = BootstrapConfigResolver::new(DEFAULT_HOST).resolve(&record()).unwrap();

        assert_eq!(config.security.len(), 2);
        let (_, bootstrap) = config.bootstrap_security().unwrap();
        assert_eq!(bootstrap.server_id, None);
        assert_eq!(bootstrap.uri, "coap://localhost:5687");

        let operational = &config.security[&1];
        assert_eq!(operational.server_id, Some(10));
        assert_eq!(operational.uri, "coaps://localhost:5686");
        assert_eq!(
            operational.credentials,
            SecurityCredentials::Psk {
                identity: b"dev-1-op".to_vec(),
                key: vec![0xde, 0xad, 0xbe, 0xef],
            }
        );

        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.servers[&0].short_id, 10);
    }

    #[test]
    fn test_security_mode_mismatch() {
        let mut record = record();
        if let Some(device) = record.bootstrap.as_mut() {
            device.lwm2m_server.security_mode = SecurityMode::NoSec;
        }

        let err = BootstrapConfigResolver::new(DEFAULT_HOST).resolve(&record).unwrap_err();
        match err {
            BootstrapError::SecurityModeMismatch { role, profile, device, .. } => {
                assert_eq!(role, "LwM2M Server");
                assert_eq!(profile, "PSK");
                assert_eq!(device, "NO_SEC");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_credential_config() {
        let mut record = record();
        record.bootstrap = None;
        let err = BootstrapConfigResolver::new(DEFAULT_HOST).resolve(&record).unwrap_err();
        assert!(matches!(err, BootstrapError::MissingCredentialConfig(_)));

        let mut record = self::record();
        record.profile.bootstrap.clear();
        assert!(BootstrapConfigResolver::new(DEFAULT_HOST).resolve(&record).is_err());
    }

    #[test]
    fn test_malformed_psk_key() {
        let mut record = record();
        if let Some(device) = record.bootstrap.as_mut() {
            device.lwm2m_server.client_secret_key = "not-hex".into();
        }
        let err = BootstrapConfigResolver::new(DEFAULT_HOST).resolve(&record).unwrap_err();
        assert_eq!(err.category(), "credential");
    }

    #[test]
    fn test_validate_templates() {
        let duplicate_ids = vec![
            template(10, false, SecurityMode::NoSec, 5685),
            template(10, false, SecurityMode::NoSec, 5695),
        ];
        assert!(validate_templates(&duplicate_ids).is_err());

        let duplicate_uris = vec![
            template(10, false, SecurityMode::NoSec, 5685),
            template(11, false, SecurityMode::NoSec, 5685),
        ];
        assert!(validate_templates(&duplicate_uris).is_err());

        let reserved = vec![template(RESERVED_SHORT_SERVER_ID, false, SecurityMode::NoSec, 5685)];
        assert!(validate_templates(&reserved).is_err());

        let rpk_without_key = vec![template(10, false, SecurityMode::Rpk, 5686)];
        assert!(validate_templates(&rpk_without_key).is_err());

        let mut rpk = template(10, false, SecurityMode::Rpk, 5686);
        rpk.server_public_key = Some("AQID".into());
        assert!(validate_templates(&[rpk]).is_ok());
    }

    #[test]
    fn test_validate_template_ports() {
        let nosec_bootstrap_on_secure_port = vec![template(111, true, SecurityMode::NoSec, 5686)];
        let err = validate_templates(&nosec_bootstrap_on_secure_port).unwrap_err();
        assert!(err.to_string().contains("must be 5687"));

        let psk_server_on_plain_port = vec![template(10, false, SecurityMode::Psk, 5685)];
        assert!(validate_templates(&psk_server_on_plain_port).is_err());

        let valid = vec![
            template(111, true, SecurityMode::Psk, DEFAULT_PORT_BOOTSTRAP_SEC),
            template(10, false, SecurityMode::NoSec, DEFAULT_PORT_SERVER_NO_SEC),
        ];
        assert!(validate_templates(&valid).is_ok());
    }

    #[test]
    fn test_validate_bootstrap_template_short_id() {
        let zero = vec![template(0, true, SecurityMode::NoSec, 5687)];
        assert!(validate_templates(&zero).is_err());

        let shared_id = vec![
            template(10, true, SecurityMode::NoSec, 5687),
            template(10, false, SecurityMode::NoSec, 5685),
        ];
        let err = validate_templates(&shared_id).unwrap_err();
        assert!(err.to_string().contains("unique"));
    }

    #[test]
    fn test_client_security_info() {
        let info = record().client.to_security_info("dev-1").unwrap().unwrap();
        assert_eq!(info.psk_identity(), Some("dev-1-identity"));
        assert_eq!(
            info.key,
            SecurityKey::Psk {
                identity: "dev-1-identity".into(),
                key: vec![0x0a, 0x0b, 0x0c],
            }
        );

        assert!(ClientSecurity::NoSec.to_security_info("dev-1").unwrap().is_none());

        let rpk = ClientSecurity::Rpk { key: "AQID".into() };
        let info = rpk.to_security_info("dev-1").unwrap().unwrap();
        assert_eq!(info.key, SecurityKey::Rpk { public_key: vec![1, 2, 3] });
    }

    #[test]
    fn test_record_deserialization() {
        let json = r#"{
            "endpoint": "dev-7",
            "client": { "securityConfigClientMode": "PSK", "identity": "dev-7-id", "key": "0102" },
            "bootstrap": {
                "bootstrapServer": { "securityMode": "NO_SEC" },
                "lwm2mServer": { "securityMode": "NO_SEC" }
            },
            "profile": {
                "autoIdForSecurityObject": true,
                "bootstrap": [
                    { "shortServerId": 123, "port": 5685, "securityMode": "NO_SEC" }
                ]
            }
        }"#;

        let record: DeviceSecurityRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.client.mode(), SecurityMode::Psk);
        assert!(record.profile.auto_id_for_security_object);
        assert!(!record.profile.bootstrap_server_update_enable);
        assert_eq!(record.profile.bootstrap[0].lifetime, DEFAULT_LIFETIME_SECS);
        assert_eq!(record.profile.bootstrap[0].binding, DEFAULT_BINDING);
    }

    #[test]
    fn test_count_by_mode() {
        let mut nosec = record();
        nosec.client = ClientSecurity::NoSec;
        let records = vec![record(), record(), nosec];

        let counts = count_by_mode(&records);
        assert_eq!(counts.get("PSK"), Some(&2));
        assert_eq!(counts.get("NO_SEC"), Some(&1));
    }
}
