//! # Bootstrap Task Provider
//!
//! Turns a stored `BootstrapConfig` into the ordered downlink requests of a
//! bootstrap session.
//!
//! ## Session phases
//!
//! ```text
//! Start ──(auto id)──▶ AwaitDiscover ──▶ EmitRequests ──▶ Done
//!   └───────────────────────────────────────▲
//! ```
//!
//! With `auto_id_for_security_object` set, the first round only discovers
//! the device's existing objects. The discover response tells which Security
//! and Server instances the device already holds, so re-provisioned servers
//! keep their instance ids and new servers get fresh ones.
//!
//! ## Request order
//!
//! All deletes are emitted before all writes. The bootstrap server never
//! gets a second Security instance: a discovered one is deleted and written
//! again at the same id.

mod instances;

pub use instances::{InstanceIdArena, LwM2MBootstrapClientInstanceIds};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use shared::{
    constants::*,
    error::BootstrapResult,
    types::{AclConfig, BootstrapConfig, ContentFormat, LwM2mPath, ServerConfig, ServerSecurity},
};

use crate::link::{parse_links, Link};
use crate::store::BootstrapConfigStore;

// =============================================================================
// SESSION AND RESPONSES
// =============================================================================

/// Identity the device authenticated with at the transport layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportIdentity {
    Unsecured { address: String },
    Psk { identity: String },
    Rpk { public_key: Vec<u8> },
    X509 { common_name: String },
}

/// Bootstrap session as seen by the task provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapSession {
    /// Endpoint name of the device
    pub endpoint: String,

    /// Content format negotiated for the session
    pub content_format: ContentFormat,

    /// Transport identity of the device
    pub identity: TransportIdentity,
}

impl BootstrapSession {
    pub fn new(endpoint: impl Into<String>, identity: TransportIdentity) -> Self {
        Self {
            endpoint: endpoint.into(),
            content_format: ContentFormat::default(),
            identity,
        }
    }
}

/// CoAP response code of a device response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseCode {
    Content,
    Changed,
    Deleted,
    BadRequest,
    Unauthorized,
    NotFound,
    MethodNotAllowed,
    NotAcceptable,
    InternalServerError,
}

impl ResponseCode {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ResponseCode::Content | ResponseCode::Changed | ResponseCode::Deleted
        )
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            ResponseCode::Content => "2.05",
            ResponseCode::Changed => "2.04",
            ResponseCode::Deleted => "2.02",
            ResponseCode::BadRequest => "4.00",
            ResponseCode::Unauthorized => "4.01",
            ResponseCode::NotFound => "4.04",
            ResponseCode::MethodNotAllowed => "4.05",
            ResponseCode::NotAcceptable => "4.06",
            ResponseCode::InternalServerError => "5.00",
        };
        f.write_str(code)
    }
}

/// Response to a Bootstrap-Discover request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoverResponse {
    pub code: ResponseCode,
    pub object_links: Vec<Link>,
}

impl DiscoverResponse {
    /// Successful discover response carrying a link-format payload
    pub fn from_payload(payload: &str) -> BootstrapResult<Self> {
        Ok(Self {
            code: ResponseCode::Content,
            object_links: parse_links(payload)?,
        })
    }

    /// Failed discover response
    pub fn failure(code: ResponseCode) -> Self {
        Self {
            code,
            object_links: Vec::new(),
        }
    }
}

/// Device response from a previous round
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapResponse {
    Discover(DiscoverResponse),
    Write { code: ResponseCode },
    Delete { code: ResponseCode },
}

// =============================================================================
// REQUESTS
// =============================================================================

/// Object instance content of a write request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WritePayload {
    Security(ServerSecurity),
    Server(ServerConfig),
    AccessControl(AclConfig),
}

/// Downlink request for the protocol engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapDownlinkRequest {
    /// Discover a single object, or everything when `None`
    Discover { object_id: Option<u16> },
    Delete { path: LwM2mPath },
    Write {
        path: LwM2mPath,
        content_format: ContentFormat,
        payload: WritePayload,
    },
}

impl BootstrapDownlinkRequest {
    pub fn path(&self) -> LwM2mPath {
        match self {
            BootstrapDownlinkRequest::Discover { object_id: None } => LwM2mPath::root(),
            BootstrapDownlinkRequest::Discover { object_id: Some(id) } => LwM2mPath::object(*id),
            BootstrapDownlinkRequest::Delete { path } => *path,
            BootstrapDownlinkRequest::Write { path, .. } => *path,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, BootstrapDownlinkRequest::Delete { .. })
    }

    pub fn is_write(&self) -> bool {
        matches!(self, BootstrapDownlinkRequest::Write { .. })
    }
}

impl fmt::Display for BootstrapDownlinkRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let method = match self {
            BootstrapDownlinkRequest::Discover { .. } => "DISCOVER",
            BootstrapDownlinkRequest::Delete { .. } => "DELETE",
            BootstrapDownlinkRequest::Write { .. } => "WRITE",
        };
        write!(f, "{} {}", method, self.path())
    }
}

/// Phase of a bootstrap session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapPhase {
    #[default]
    Start,
    AwaitDiscover,
    EmitRequests,
    Done,
}

/// Requests of one bootstrap round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tasks {
    /// Requests, in the order they must be sent
    pub requests: Vec<BootstrapDownlinkRequest>,

    /// Key: object id, Value: object version used for encoding
    pub supported_objects: BTreeMap<u16, String>,

    /// Whether this is the final round
    pub last: bool,
}

impl Tasks {
    pub fn deletes(&self) -> impl Iterator<Item = &BootstrapDownlinkRequest> {
        self.requests.iter().filter(|r| r.is_delete())
    }

    pub fn writes(&self) -> impl Iterator<Item = &BootstrapDownlinkRequest> {
        self.requests.iter().filter(|r| r.is_write())
    }
}

fn default_supported_objects() -> BTreeMap<u16, String> {
    BOOTSTRAP_OBJECT_IDS
        .iter()
        .map(|id| (*id, default_object_version(*id).to_string()))
        .collect()
}

// =============================================================================
// TASK PROVIDER
// =============================================================================

/// Computes bootstrap requests and tracks per-endpoint instance ids
pub struct TaskProvider {
    store: Arc<BootstrapConfigStore>,
    instances: InstanceIdArena,
}

impl TaskProvider {
    pub fn new(store: Arc<BootstrapConfigStore>) -> Self {
        Self {
            store,
            instances: InstanceIdArena::new(),
        }
    }

    /// Open the instance id mapping of a starting bootstrap session
    pub fn put(&self, endpoint: &str) {
        self.instances.open(endpoint);
    }

    /// Close the instance id mapping of a finished bootstrap session
    pub fn remove(&self, endpoint: &str) -> Option<LwM2MBootstrapClientInstanceIds> {
        self.instances.close(endpoint)
    }

    pub fn phase(&self, endpoint: &str) -> Option<BootstrapPhase> {
        self.instances.get(endpoint).map(|ids| ids.phase)
    }

    pub fn instance_ids(&self, endpoint: &str) -> Option<LwM2MBootstrapClientInstanceIds> {
        self.instances.get(endpoint)
    }

    /// Number of open sessions
    pub fn open_sessions(&self) -> usize {
        self.instances.len()
    }

    /// Requests for the next round of a bootstrap session
    ///
    /// # Arguments
    /// * `session` - The bootstrap session
    /// * `previous` - Device responses to the previous round, if any
    ///
    /// # Returns
    /// `None` if the endpoint has no bootstrap configuration
    pub fn get_tasks(
        &self,
        session: &BootstrapSession,
        previous: Option<&[BootstrapResponse]>,
    ) -> Option<Tasks> {
        let endpoint = session.endpoint.as_str();

        let Some(config) = self.store.get_for_session(session) else {
            debug!(endpoint = %endpoint, "No bootstrap configuration, nothing to do");
            return None;
        };

        if !self.instances.contains(endpoint) {
            warn!(endpoint = %endpoint, "No open bootstrap session, opening one");
            self.instances.open(endpoint);
        }

        if config.auto_id_for_security_object && previous.is_none() {
            self.set_phase(endpoint, BootstrapPhase::AwaitDiscover);
            debug!(endpoint = %endpoint, "Discovering existing objects");
            return Some(Tasks {
                requests: vec![BootstrapDownlinkRequest::Discover { object_id: None }],
                supported_objects: default_supported_objects(),
                last: false,
            });
        }

        let mut ids = LwM2MBootstrapClientInstanceIds::default();
        let mut supported_objects = default_supported_objects();

        if config.auto_id_for_security_object {
            let discover = previous.into_iter().flatten().find_map(|response| match response {
                BootstrapResponse::Discover(discover) => Some(discover),
                _ => None,
            });

            match discover {
                Some(discover) if discover.code.is_success() => {
                    apply_discover(endpoint, &discover.object_links, &mut ids, &mut supported_objects);
                }
                Some(discover) => {
                    warn!(
                        endpoint = %endpoint,
                        code = %discover.code,
                        "Bootstrap discover failed, using default instance ids"
                    );
                }
                None => {
                    warn!(endpoint = %endpoint, "No discover response, using default instance ids");
                }
            }
        }

        self.set_phase(endpoint, BootstrapPhase::EmitRequests);

        let content_format = config.content_format.unwrap_or(session.content_format);
        let requests = emit_requests(endpoint, &config, &mut ids, content_format);

        info!(
            endpoint = %endpoint,
            requests = requests.len(),
            security_instances = ids.security_instances.len(),
            server_instances = ids.server_instances.len(),
            "Bootstrap requests computed"
        );

        self.instances.update(endpoint, |entry| {
            entry.security_instances = ids.security_instances;
            entry.server_instances = ids.server_instances;
            entry.phase = BootstrapPhase::Done;
        });

        Some(Tasks {
            requests,
            supported_objects,
            last: true,
        })
    }

    fn set_phase(&self, endpoint: &str, phase: BootstrapPhase) {
        self.instances.update(endpoint, |ids| ids.phase = phase);
    }
}

// =============================================================================
// DISCOVER PARSING
// =============================================================================

/// Record discovered object versions and Security/Server instance ids
fn apply_discover(
    endpoint: &str,
    links: &[Link],
    ids: &mut LwM2MBootstrapClientInstanceIds,
    supported_objects: &mut BTreeMap<u16, String>,
) {
    let root_version = links
        .iter()
        .find(|link| link.uri_reference == "/")
        .and_then(|link| link.param(LINK_PARAM_LWM2M))
        .unwrap_or(DEFAULT_LWM2M_VERSION);

    for link in links {
        let path = match link.path() {
            Ok(path) => path,
            Err(e) => {
                warn!(endpoint = %endpoint, link = %link, error = %e, "Skipping discovered link");
                continue;
            }
        };

        let (Some(object_id), instance_id) = (path.object_id, path.object_instance_id) else {
            continue;
        };

        let Some(instance_id) = instance_id else {
            let version = link.param(LINK_PARAM_VERSION).unwrap_or(root_version);
            supported_objects.insert(object_id, version.to_string());
            continue;
        };

        if !path.is_object_instance() {
            continue;
        }

        let ssid = match link.param(LINK_PARAM_SSID).map(str::parse::<u16>) {
            None => None,
            Some(Ok(ssid)) => Some(ssid),
            Some(Err(_)) => {
                warn!(endpoint = %endpoint, link = %link, "Skipping link with invalid ssid");
                continue;
            }
        };

        match (object_id, ssid) {
            (SECURITY_OBJECT_ID, ssid) => {
                if ids.security_instances.contains_key(&ssid) {
                    warn!(endpoint = %endpoint, link = %link, "Duplicate Security instance for ssid");
                    continue;
                }
                ids.security_instances.insert(ssid, instance_id);
            }
            (SERVER_OBJECT_ID, Some(ssid)) => {
                if ids.server_instances.contains_key(&ssid) {
                    warn!(endpoint = %endpoint, link = %link, "Duplicate Server instance for ssid");
                    continue;
                }
                ids.server_instances.insert(ssid, instance_id);
            }
            _ => {}
        }
    }

    debug!(
        endpoint = %endpoint,
        security = ?ids.security_instances,
        server = ?ids.server_instances,
        "Discovered instance ids"
    );
}

// =============================================================================
// REQUEST EMISSION
// =============================================================================

/// Hands out instance ids above the highest known one
struct IdAllocator {
    next: u32,
    skip: Option<u16>,
}

impl IdAllocator {
    fn above(max: Option<u16>, skip: Option<u16>) -> Self {
        Self {
            next: max.map_or(0, |max| u32::from(max) + 1),
            skip,
        }
    }

    fn allocate(&mut self) -> Option<u16> {
        loop {
            let candidate = self.next;
            self.next += 1;
            if self.skip.map(u32::from) == Some(candidate) {
                continue;
            }
            return u16::try_from(candidate).ok();
        }
    }
}

/// Instance id for the bootstrap server's Security instance
fn bootstrap_security_instance(ids: &LwM2MBootstrapClientInstanceIds) -> u16 {
    if let Some(iid) = ids.bootstrap_security_instance() {
        return iid;
    }

    let used: BTreeSet<u16> = ids
        .security_instances
        .iter()
        .filter(|(ssid, _)| ssid.is_some())
        .map(|(_, iid)| *iid)
        .collect();

    (DEFAULT_SECURITY_INSTANCE_ID..=u16::MAX)
        .find(|iid| !used.contains(iid))
        .unwrap_or(DEFAULT_SECURITY_INSTANCE_ID)
}

#[derive(Default)]
struct RequestPlan {
    deletes: Vec<BootstrapDownlinkRequest>,
    writes: Vec<BootstrapDownlinkRequest>,
}

impl RequestPlan {
    fn write(&mut self, path: LwM2mPath, content_format: ContentFormat, payload: WritePayload, replace: bool) {
        if replace {
            self.deletes.push(BootstrapDownlinkRequest::Delete { path });
        }
        self.writes.push(BootstrapDownlinkRequest::Write {
            path,
            content_format,
            payload,
        });
    }

    fn into_requests(self) -> Vec<BootstrapDownlinkRequest> {
        let mut requests = self.deletes;
        requests.extend(self.writes);
        requests
    }
}

/// Compute the delete/write requests for a configuration
///
/// Newly allocated instance ids are recorded into `ids`.
fn emit_requests(
    endpoint: &str,
    config: &BootstrapConfig,
    ids: &mut LwM2MBootstrapClientInstanceIds,
    content_format: ContentFormat,
) -> Vec<BootstrapDownlinkRequest> {
    let mut plan = RequestPlan::default();

    let bootstrap_iid = bootstrap_security_instance(ids);
    if let Some((_, security)) = config.bootstrap_security() {
        let replace = ids.bootstrap_security_instance().is_some();
        plan.write(
            LwM2mPath::instance(SECURITY_OBJECT_ID, bootstrap_iid),
            content_format,
            WritePayload::Security(security.clone()),
            replace,
        );
        ids.security_instances.insert(None, bootstrap_iid);
    }

    let mut security_ids =
        IdAllocator::above(ids.max_operational_security_instance(), Some(bootstrap_iid));
    let mut server_ids = IdAllocator::above(ids.max_server_instance(), None);

    let mut provisioned = BTreeSet::new();
    for (key, security) in config.operational_security() {
        let ssid = security.short_server_id();
        if !provisioned.insert(ssid) {
            warn!(endpoint = %endpoint, security = key, ssid, "Duplicate short server id, entry skipped");
            continue;
        }

        let existing = ids.security_instances.get(&Some(ssid)).copied();
        let Some(security_iid) = existing.or_else(|| security_ids.allocate()) else {
            warn!(endpoint = %endpoint, security = key, "No free Security instance id");
            continue;
        };
        plan.write(
            LwM2mPath::instance(SECURITY_OBJECT_ID, security_iid),
            content_format,
            WritePayload::Security(security.clone()),
            existing.is_some(),
        );
        ids.security_instances.insert(Some(ssid), security_iid);

        let Some(server) = config.server_by_short_id(ssid) else {
            continue;
        };

        let existing = ids.server_instances.get(&ssid).copied();
        let Some(server_iid) = existing.or_else(|| server_ids.allocate()) else {
            warn!(endpoint = %endpoint, ssid, "No free Server instance id");
            continue;
        };
        plan.write(
            LwM2mPath::instance(SERVER_OBJECT_ID, server_iid),
            content_format,
            WritePayload::Server(server.clone()),
            existing.is_some(),
        );
        ids.server_instances.insert(ssid, server_iid);
    }

    for (key, acl) in &config.acls {
        plan.write(
            LwM2mPath::instance(ACCESS_CONTROL_OBJECT_ID, *key),
            content_format,
            WritePayload::AccessControl(acl.clone()),
            false,
        );
    }

    let requests = plan.into_requests();
    for request in &requests {
        debug!(endpoint = %endpoint, request = %request, "Bootstrap request");
    }
    requests
}
