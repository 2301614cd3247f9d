//! # Constants for the LWM2M Bootstrap Service
//!
//! Object identifiers, short-server-id ranges, default ports and the
//! environment variable names used by the bootstrap service.

// =============================================================================
// LWM2M OBJECT IDENTIFIERS
// =============================================================================

/// LWM2M Security object (holds one instance per server credential set)
pub const SECURITY_OBJECT_ID: u16 = 0;

/// LWM2M Server object (holds one instance per operational server)
pub const SERVER_OBJECT_ID: u16 = 1;

/// LWM2M Access Control object
pub const ACCESS_CONTROL_OBJECT_ID: u16 = 2;

/// Objects the bootstrap server writes to
pub const BOOTSTRAP_OBJECT_IDS: [u16; 3] = [
    SECURITY_OBJECT_ID,
    SERVER_OBJECT_ID,
    ACCESS_CONTROL_OBJECT_ID,
];

// =============================================================================
// SHORT SERVER IDS
// =============================================================================

/// Short server id of the bootstrap server
pub const BOOTSTRAP_SHORT_SERVER_ID: u16 = 0;

/// Lowest short server id usable by an operational server
pub const MIN_SHORT_SERVER_ID: u16 = 1;

/// Highest short server id usable by an operational server
pub const MAX_SHORT_SERVER_ID: u16 = 65534;

/// Reserved short server id ("do not use for identifying an LWM2M server")
pub const RESERVED_SHORT_SERVER_ID: u16 = 65535;

// =============================================================================
// DEFAULT INSTANCE IDS
// =============================================================================

/// Security object instance assumed when no discover response is available
pub const DEFAULT_SECURITY_INSTANCE_ID: u16 = 0;

/// Server object instance assumed when no discover response is available
pub const DEFAULT_SERVER_INSTANCE_ID: u16 = 0;

/// Access Control object instance assumed when no discover response is available
pub const DEFAULT_ACCESS_CONTROL_INSTANCE_ID: u16 = 0;

// =============================================================================
// OBJECT VERSIONS
// =============================================================================

/// Version assumed for objects that advertise none
pub const DEFAULT_LWM2M_VERSION: &str = "1.0";

/// Default version of the Security object
pub const DEFAULT_SECURITY_OBJECT_VERSION: &str = "1.1";

/// Default version of the Server object
pub const DEFAULT_SERVER_OBJECT_VERSION: &str = "1.1";

/// Default version of the Access Control object
pub const DEFAULT_ACCESS_CONTROL_OBJECT_VERSION: &str = "1.0";

// =============================================================================
// CORE LINK FORMAT ATTRIBUTES
// =============================================================================

/// Short server id attribute on Security/Server instance links
pub const LINK_PARAM_SSID: &str = "ssid";

/// Object version attribute on object links
pub const LINK_PARAM_VERSION: &str = "ver";

/// Enabler version attribute on the root link
pub const LINK_PARAM_LWM2M: &str = "lwm2m";

// =============================================================================
// SERVER DEFAULTS
// =============================================================================

/// Default CoAP port of an operational server
pub const DEFAULT_PORT_SERVER_NO_SEC: u16 = 5685;

/// Default CoAPs port of an operational server
pub const DEFAULT_PORT_SERVER_SEC: u16 = 5686;

/// Default CoAP port of the bootstrap server
pub const DEFAULT_PORT_BOOTSTRAP_NO_SEC: u16 = 5687;

/// Default CoAPs port of the bootstrap server
pub const DEFAULT_PORT_BOOTSTRAP_SEC: u16 = 5688;

/// Default registration lifetime (seconds)
pub const DEFAULT_LIFETIME_SECS: u32 = 300;

/// Default minimum observation period (seconds)
pub const DEFAULT_MIN_PERIOD_SECS: u32 = 1;

/// Default client hold-off time (seconds)
pub const DEFAULT_CLIENT_HOLD_OFF_TIME_SECS: u32 = 1;

/// Default bootstrap-server account timeout (0 = never)
pub const DEFAULT_BOOTSTRAP_SERVER_ACCOUNT_TIMEOUT_SECS: u32 = 0;

/// Default transport binding (UDP)
pub const DEFAULT_BINDING: &str = "U";

/// Default host used when a server template omits one
pub const DEFAULT_HOST: &str = "localhost";

/// URI scheme for unsecured servers
pub const COAP_SCHEME: &str = "coap";

/// URI scheme for DTLS-secured servers
pub const COAPS_SCHEME: &str = "coaps";

// =============================================================================
// STORAGE PATHS
// =============================================================================

/// Default path of the device credential file
pub const DEFAULT_CREDENTIALS_PATH: &str = "./credentials.json";

// =============================================================================
// ENVIRONMENT VARIABLE NAMES
// =============================================================================

/// Environment variable for the bootstrap server bind host
pub const ENV_BS_HOST: &str = "LWM2M_BS_HOST";

/// Environment variable for the unsecured bootstrap port
pub const ENV_BS_PORT: &str = "LWM2M_BS_PORT";

/// Environment variable for the secured bootstrap port
pub const ENV_BS_SECURE_PORT: &str = "LWM2M_BS_SECURE_PORT";

/// Environment variable for the host substituted into server templates
pub const ENV_BS_DEFAULT_HOST: &str = "LWM2M_BS_DEFAULT_HOST";

/// Environment variable for the credential file path
pub const ENV_BS_CREDENTIALS_PATH: &str = "LWM2M_BS_CREDENTIALS_PATH";

/// Environment variable for the log level
pub const ENV_BS_LOG_LEVEL: &str = "LWM2M_BS_LOG_LEVEL";

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Whether a short server id may identify an operational server
pub fn is_operational_short_server_id(short_id: u16) -> bool {
    (MIN_SHORT_SERVER_ID..=MAX_SHORT_SERVER_ID).contains(&short_id)
}

/// Default version of one of the bootstrap objects
pub fn default_object_version(object_id: u16) -> &'static str {
    match object_id {
        SECURITY_OBJECT_ID => DEFAULT_SECURITY_OBJECT_VERSION,
        SERVER_OBJECT_ID => DEFAULT_SERVER_OBJECT_VERSION,
        ACCESS_CONTROL_OBJECT_ID => DEFAULT_ACCESS_CONTROL_OBJECT_VERSION,
        _ => DEFAULT_LWM2M_VERSION,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operational_short_server_id_range() {
        assert!(!is_operational_short_server_id(BOOTSTRAP_SHORT_SERVER_ID));
        assert!(is_operational_short_server_id(MIN_SHORT_SERVER_ID));
        assert!(is_operational_short_server_id(123));
        assert!(is_operational_short_server_id(MAX_SHORT_SERVER_ID));
        assert!(!is_operational_short_server_id(RESERVED_SHORT_SERVER_ID));
    }

    #[test]
    fn test_default_object_version() {
        assert_eq!(default_object_version(SECURITY_OBJECT_ID), "1.1");
        assert_eq!(default_object_version(ACCESS_CONTROL_OBJECT_ID), "1.0");
        assert_eq!(default_object_version(3), DEFAULT_LWM2M_VERSION);
    }
}
