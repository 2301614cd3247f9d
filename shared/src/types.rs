//! # LWM2M Bootstrap Data Model
//!
//! This module defines the validated, endpoint-scoped bootstrap intent
//! (`BootstrapConfig`) and the object-model types it is built from.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::constants::*;
use crate::error::BootstrapError;

// =============================================================================
// SECURITY MODE
// =============================================================================

/// Security mode of one Security object instance
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityMode {
    /// No security (plain CoAP)
    NoSec,
    /// Pre-shared key
    Psk,
    /// Raw public key
    Rpk,
    /// X.509 certificate
    #[serde(rename = "X509")]
    X509,
    /// Enrollment over secure transport
    Est,
}

impl SecurityMode {
    /// Numeric value of the Security object's "Security Mode" resource
    pub fn code(&self) -> u8 {
        match self {
            SecurityMode::Psk => 0,
            SecurityMode::Rpk => 1,
            SecurityMode::X509 => 2,
            SecurityMode::NoSec => 3,
            SecurityMode::Est => 4,
        }
    }

    /// URI scheme a server using this mode is reached with
    pub fn scheme(&self) -> &'static str {
        match self {
            SecurityMode::NoSec => COAP_SCHEME,
            _ => COAPS_SCHEME,
        }
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityMode::NoSec => write!(f, "NO_SEC"),
            SecurityMode::Psk => write!(f, "PSK"),
            SecurityMode::Rpk => write!(f, "RPK"),
            SecurityMode::X509 => write!(f, "X509"),
            SecurityMode::Est => write!(f, "EST"),
        }
    }
}

/// Mode-specific key material of a Security object instance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityCredentials {
    NoSec,
    Psk {
        identity: Vec<u8>,
        key: Vec<u8>,
    },
    Rpk {
        public_key: Vec<u8>,
        private_key: Vec<u8>,
        server_public_key: Vec<u8>,
    },
    #[serde(rename = "X509")]
    X509 {
        certificate: Vec<u8>,
        private_key: Vec<u8>,
        server_certificate: Vec<u8>,
    },
    Est,
}

impl SecurityCredentials {
    /// The security mode these credentials belong to
    pub fn mode(&self) -> SecurityMode {
        match self {
            SecurityCredentials::NoSec => SecurityMode::NoSec,
            SecurityCredentials::Psk { .. } => SecurityMode::Psk,
            SecurityCredentials::Rpk { .. } => SecurityMode::Rpk,
            SecurityCredentials::X509 { .. } => SecurityMode::X509,
            SecurityCredentials::Est => SecurityMode::Est,
        }
    }
}

// =============================================================================
// OBJECT INSTANCES
// =============================================================================

/// One Security object instance (credentials towards one server)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerSecurity {
    /// Server URI (e.g. "coaps://host:5686")
    pub uri: String,

    /// Whether this entry describes the bootstrap server
    pub bootstrap_server: bool,

    /// Short server id; `None` marks the bootstrap server's own entry
    pub server_id: Option<u16>,

    /// Client hold-off time in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_hold_off_time: Option<u32>,

    /// Bootstrap-server account timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootstrap_server_account_timeout: Option<u32>,

    /// Mode-specific key material
    pub credentials: SecurityCredentials,
}

impl ServerSecurity {
    /// Security mode of this entry
    pub fn security_mode(&self) -> SecurityMode {
        self.credentials.mode()
    }

    /// Short server id this entry answers to (`None` counts as 0)
    pub fn short_server_id(&self) -> u16 {
        self.server_id.unwrap_or(BOOTSTRAP_SHORT_SERVER_ID)
    }
}

/// One Server object instance (registration parameters for one server)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    /// Short server id
    pub short_id: u16,

    /// Registration lifetime in seconds
    pub lifetime: u32,

    /// Default minimum observation period
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_min_period: Option<u32>,

    /// Default maximum observation period
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_max_period: Option<u32>,

    /// Disable timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_timeout: Option<u32>,

    /// Store notifications while the server is disabled
    pub notif_if_disabled: bool,

    /// Transport binding (e.g. "U")
    pub binding: String,
}

impl ServerConfig {
    /// Server config with default registration parameters
    pub fn new(short_id: u16) -> Self {
        Self {
            short_id,
            lifetime: DEFAULT_LIFETIME_SECS,
            default_min_period: Some(DEFAULT_MIN_PERIOD_SECS),
            default_max_period: None,
            disable_timeout: None,
            notif_if_disabled: true,
            binding: DEFAULT_BINDING.into(),
        }
    }
}

/// One Access Control object instance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AclConfig {
    /// Object the access rights apply to
    pub object_id: u16,

    /// Object instance the access rights apply to
    pub object_instance_id: u16,

    /// Access bits per short server id
    #[serde(default)]
    pub acls: BTreeMap<u16, u16>,

    /// Short server id owning this access control instance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_control_owner: Option<u16>,
}

// =============================================================================
// CONTENT FORMAT
// =============================================================================

/// Content format used to encode write payloads
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentFormat {
    /// OMA TLV
    #[default]
    Tlv,
    /// OMA LWM2M JSON
    Json,
    /// SenML JSON
    SenmlJson,
    /// SenML CBOR
    SenmlCbor,
}

impl ContentFormat {
    /// CoAP content-format code
    pub fn code(&self) -> u16 {
        match self {
            ContentFormat::Tlv => 11542,
            ContentFormat::Json => 11543,
            ContentFormat::SenmlJson => 110,
            ContentFormat::SenmlCbor => 112,
        }
    }
}

// =============================================================================
// BOOTSTRAP CONFIGURATION
// =============================================================================

/// Bootstrap-server PSK identity, unique per bootstrap server URI
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BootstrapPskIdentity {
    /// PSK identity the client presents to the bootstrap server
    pub identity: String,

    /// Bootstrap server URI
    pub url: String,
}

/// The validated bootstrap intent for one endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BootstrapConfig {
    /// Security object instances, keyed 0..N
    pub security: BTreeMap<u16, ServerSecurity>,

    /// Server object instances
    pub servers: BTreeMap<u16, ServerConfig>,

    /// Access Control object instances
    pub acls: BTreeMap<u16, AclConfig>,

    /// Discover existing instances before writing the Security object
    pub auto_id_for_security_object: bool,

    /// Content format override for write requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_format: Option<ContentFormat>,
}

impl BootstrapConfig {
    /// Get the bootstrap-server security entry, if any
    pub fn bootstrap_security(&self) -> Option<(u16, &ServerSecurity)> {
        self.security
            .iter()
            .find(|(_, sec)| sec.bootstrap_server)
            .map(|(key, sec)| (*key, sec))
    }

    /// Iterate the operational (non-bootstrap) security entries in key order
    pub fn operational_security(&self) -> impl Iterator<Item = (u16, &ServerSecurity)> {
        self.security
            .iter()
            .filter(|(_, sec)| !sec.bootstrap_server)
            .map(|(key, sec)| (*key, sec))
    }

    /// Find the server entry for a short server id
    pub fn server_by_short_id(&self, short_id: u16) -> Option<&ServerConfig> {
        self.servers.values().find(|srv| srv.short_id == short_id)
    }

    /// PSK identity used towards the bootstrap server, if it is PSK-secured
    ///
    /// Identities that are not valid UTF-8 have no index key.
    pub fn bootstrap_psk_identity(&self) -> Option<BootstrapPskIdentity> {
        let (_, security) = self.bootstrap_security()?;
        match &security.credentials {
            SecurityCredentials::Psk { identity, .. } => Some(BootstrapPskIdentity {
                identity: String::from_utf8(identity.clone()).ok()?,
                url: security.uri.clone(),
            }),
            _ => None,
        }
    }

    /// Remove the bootstrap-server security entry and its server entry
    ///
    /// Returns true if anything was removed.
    pub fn strip_bootstrap_server(&mut self) -> bool {
        let bootstrap_keys: Vec<(u16, u16)> = self
            .security
            .iter()
            .filter(|(_, sec)| sec.bootstrap_server)
            .map(|(key, sec)| (*key, sec.short_server_id()))
            .collect();

        for (key, short_id) in &bootstrap_keys {
            self.security.remove(key);
            self.servers.retain(|_, srv| srv.short_id != *short_id);
        }

        !bootstrap_keys.is_empty()
    }
}

// =============================================================================
// LWM2M PATH
// =============================================================================

/// Path to an LWM2M node ("/", "/0", "/0/1", "/0/1/2")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LwM2mPath {
    pub object_id: Option<u16>,
    pub object_instance_id: Option<u16>,
    pub resource_id: Option<u16>,
}

impl LwM2mPath {
    /// The root path "/"
    pub fn root() -> Self {
        Self {
            object_id: None,
            object_instance_id: None,
            resource_id: None,
        }
    }

    /// Path to an object
    pub fn object(object_id: u16) -> Self {
        Self {
            object_id: Some(object_id),
            ..Self::root()
        }
    }

    /// Path to an object instance
    pub fn instance(object_id: u16, object_instance_id: u16) -> Self {
        Self {
            object_id: Some(object_id),
            object_instance_id: Some(object_instance_id),
            resource_id: None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.object_id.is_none()
    }

    pub fn is_object(&self) -> bool {
        self.object_id.is_some() && self.object_instance_id.is_none()
    }

    pub fn is_object_instance(&self) -> bool {
        self.object_instance_id.is_some() && self.resource_id.is_none()
    }
}

impl FromStr for LwM2mPath {
    type Err = BootstrapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s
            .strip_prefix('/')
            .ok_or_else(|| BootstrapError::InvalidPath(format!("'{}' must start with '/'", s)))?;

        if trimmed.is_empty() {
            return Ok(Self::root());
        }

        let mut ids = Vec::with_capacity(3);
        for segment in trimmed.trim_end_matches('/').split('/') {
            let id = segment
                .parse::<u16>()
                .map_err(|_| BootstrapError::InvalidPath(format!("'{}' has a non-numeric segment", s)))?;
            ids.push(id);
        }

        if ids.len() > 3 {
            return Err(BootstrapError::InvalidPath(format!(
                "'{}' is deeper than a resource",
                s
            )));
        }

        Ok(Self {
            object_id: ids.first().copied(),
            object_instance_id: ids.get(1).copied(),
            resource_id: ids.get(2).copied(),
        })
    }
}

impl fmt::Display for LwM2mPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let segments: Vec<String> = [self.object_id, self.object_instance_id, self.resource_id]
            .iter()
            .flatten()
            .map(|id| id.to_string())
            .collect();
        write!(f, "/{}", segments.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn psk_bootstrap_security() -> ServerSecurity {
        ServerSecurity {
            uri: "coaps://localhost:5688".into(),
            bootstrap_server: true,
            server_id: None,
            client_hold_off_time: None,
            bootstrap_server_account_timeout: None,
            credentials: SecurityCredentials::Psk {
                identity: b"dev-1-bs".to_vec(),
                key: vec![0x01, 0x02],
            },
        }
    }

    #[test]
    fn test_security_mode_serde_names() {
        let json = serde_json::to_string(&SecurityMode::NoSec).unwrap();
        assert_eq!(json, "\"NO_SEC\"");
        let mode: SecurityMode = serde_json::from_str("\"X509\"").unwrap();
        assert_eq!(mode, SecurityMode::X509);
        assert_eq!(SecurityMode::Psk.to_string(), "PSK");
    }

    #[test]
    fn test_bootstrap_psk_identity() {
        let mut config = BootstrapConfig::default();
        config.security.insert(0, psk_bootstrap_security());

        let psk = config.bootstrap_psk_identity().unwrap();
        assert_eq!(psk.identity, "dev-1-bs");
        assert_eq!(psk.url, "coaps://localhost:5688");
    }

    #[test]
    fn test_non_utf8_psk_identity_has_no_index_key() {
        let mut security = psk_bootstrap_security();
        security.credentials = SecurityCredentials::Psk {
            identity: vec![0xff, 0x01],
            key: vec![0x01],
        };
        let mut config = BootstrapConfig::default();
        config.security.insert(0, security);

        assert!(config.bootstrap_psk_identity().is_none());
    }

    #[test]
    fn test_strip_bootstrap_server() {
        let mut config = BootstrapConfig::default();
        config.security.insert(0, psk_bootstrap_security());
        config.servers.insert(0, ServerConfig::new(BOOTSTRAP_SHORT_SERVER_ID));
        config.servers.insert(1, ServerConfig::new(123));

        assert!(config.strip_bootstrap_server());
        assert!(config.security.is_empty());
        assert_eq!(config.servers.len(), 1);
        assert!(config.server_by_short_id(123).is_some());
        assert!(!config.strip_bootstrap_server());
    }

    #[test]
    fn test_path_parse_and_display() {
        let path: LwM2mPath = "/0/1".parse().unwrap();
        assert_eq!(path, LwM2mPath::instance(0, 1));
        assert!(path.is_object_instance());
        assert_eq!(path.to_string(), "/0/1");

        let root: LwM2mPath = "/".parse().unwrap();
        assert!(root.is_root());
        assert_eq!(root.to_string(), "/");

        let object: LwM2mPath = "/3".parse().unwrap();
        assert!(object.is_object());

        assert!("0/1".parse::<LwM2mPath>().is_err());
        assert!("/0/x".parse::<LwM2mPath>().is_err());
        assert!("/0/1/2/3".parse::<LwM2mPath>().is_err());
    }
}
