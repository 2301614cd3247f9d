//! # Transport Sessions and Telemetry
//!
//! Correlates a bootstrap attempt with a transport session so that events
//! about the bootstrap process (accepted configuration, validation errors)
//! can be reported upstream.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Transport session registered for an endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportSession {
    /// Session identifier
    pub id: Uuid,

    /// Endpoint the session belongs to
    pub endpoint: String,

    /// When the session was registered
    pub created_at: DateTime<Utc>,
}

/// Severity of a bootstrap telemetry event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

/// Telemetry event about a bootstrap attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapEvent {
    pub level: EventLevel,
    pub endpoint: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl BootstrapEvent {
    pub fn new(level: EventLevel, endpoint: &str, message: impl Into<String>) -> Self {
        Self {
            level,
            endpoint: endpoint.to_string(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Upstream sink for bootstrap telemetry
pub trait TelemetryNotifier: Send + Sync {
    fn notify(&self, session: &TransportSession, event: BootstrapEvent);
}

/// Notifier that writes events to the log
#[derive(Debug, Default)]
pub struct LoggingTelemetryNotifier;

impl TelemetryNotifier for LoggingTelemetryNotifier {
    fn notify(&self, session: &TransportSession, event: BootstrapEvent) {
        match event.level {
            EventLevel::Info => info!(
                session_id = %session.id,
                endpoint = %event.endpoint,
                "{}", event.message
            ),
            EventLevel::Warn => warn!(
                session_id = %session.id,
                endpoint = %event.endpoint,
                "{}", event.message
            ),
            EventLevel::Error => error!(
                session_id = %session.id,
                endpoint = %event.endpoint,
                "{}", event.message
            ),
        }
    }
}

/// Registry of transport sessions keyed by endpoint
pub struct TransportSessionRegistry {
    sessions: RwLock<HashMap<String, TransportSession>>,
}

impl TransportSessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a session for an endpoint, reusing an existing one
    pub fn register(&self, endpoint: &str) -> TransportSession {
        let mut sessions = self.sessions.write();
        if let Some(existing) = sessions.get(endpoint) {
            return existing.clone();
        }

        let session = TransportSession {
            id: Uuid::new_v4(),
            endpoint: endpoint.to_string(),
            created_at: Utc::now(),
        };
        sessions.insert(endpoint.to_string(), session.clone());

        debug!(endpoint = %endpoint, session_id = %session.id, "Transport session registered");
        session
    }

    pub fn get_session_by_endpoint(&self, endpoint: &str) -> Option<TransportSession> {
        self.sessions.read().get(endpoint).cloned()
    }

    pub fn remove_session_by_endpoint(&self, endpoint: &str) -> Option<TransportSession> {
        let removed = self.sessions.write().remove(endpoint);
        if let Some(session) = &removed {
            debug!(endpoint = %endpoint, session_id = %session.id, "Transport session removed");
        }
        removed
    }

    /// Number of registered sessions
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TransportSessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_reuses_session() {
        let registry = TransportSessionRegistry::new();

        let first = registry.register("dev-1");
        let second = registry.register("dev-1");
        assert_eq!(first.id, second.id);
        assert_eq!(registry.len(), 1);

        let other = registry.register("dev-2");
        assert_ne!(first.id, other.id);
    }

    #[test]
    fn test_get_and_remove() {
        let registry = TransportSessionRegistry::new();
        assert!(registry.get_session_by_endpoint("dev-1").is_none());

        let session = registry.register("dev-1");
        assert_eq!(registry.get_session_by_endpoint("dev-1"), Some(session.clone()));

        assert_eq!(registry.remove_session_by_endpoint("dev-1"), Some(session));
        assert!(registry.remove_session_by_endpoint("dev-1").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_event_serialization() {
        let event = BootstrapEvent::new(EventLevel::Error, "dev-1", "mismatch");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["level"], "error");
        assert_eq!(json["endpoint"], "dev-1");
    }
}
