//! Session transport and registry.
//!
//! A session correlates one long-lived SSE push stream with its inbound
//! side-channel POSTs. The transport owns the push half through an
//! unbounded channel whose receiver is drained by the SSE handler; the
//! registry is the process-wide id → transport map.

use std::sync::{Arc, Mutex, OnceLock};

use chrono::{DateTime, Duration, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    mcp::types::JsonRpcRequest,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Created,
    Started,
    Active,
    Closed,
}

/// One framed message bound for the push stream.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    pub event: String,
    pub data: String,
}

#[derive(Debug)]
pub struct SessionTransport {
    id: OnceLock<String>,
    state: Mutex<TransportState>,
    sender: mpsc::UnboundedSender<OutboundFrame>,
    created_at: DateTime<Utc>,
    last_activity: Mutex<DateTime<Utc>>,
}

impl SessionTransport {
    /// Create a transport in the `Created` state together with the
    /// receiving half its SSE stream will drain.
    pub fn connect() -> (Arc<Self>, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let now = Utc::now();
        let transport = Arc::new(Self {
            id: OnceLock::new(),
            state: Mutex::new(TransportState::Created),
            sender,
            created_at: now,
            last_activity: Mutex::new(now),
        });
        (transport, receiver)
    }

    /// Handshake: assign the session id and move `Created → Started`.
    /// Calling this on an already-started transport is a transport error.
    pub fn start(&self) -> Result<String> {
        let mut state = self.state.lock().expect("transport state lock");
        if *state != TransportState::Created {
            return Err(AppError::Transport(
                "handshake failed: transport already started".to_string(),
            ));
        }
        let id = Uuid::new_v4().to_string();
        self.id
            .set(id.clone())
            .map_err(|_| AppError::Transport("handshake failed: id already assigned".to_string()))?;
        *state = TransportState::Started;
        debug!("Session transport started: {}", id);
        Ok(id)
    }

    pub fn id(&self) -> Option<&str> {
        self.id.get().map(|s| s.as_str())
    }

    /// Push a JSON-RPC message over the stream. The first successful send
    /// moves `Started → Active`.
    pub fn send(&self, message: Value) -> Result<()> {
        self.send_frame("message", message.to_string())
    }

    pub fn send_frame(&self, event: &str, data: String) -> Result<()> {
        let mut state = self.state.lock().expect("transport state lock");
        match *state {
            TransportState::Created | TransportState::Closed => {
                return Err(AppError::Transport("not connected".to_string()));
            }
            TransportState::Started | TransportState::Active => {}
        }
        let frame = OutboundFrame {
            event: event.to_string(),
            data,
        };
        if self.sender.send(frame).is_err() {
            // Receiver gone means the stream ended underneath us.
            *state = TransportState::Closed;
            return Err(AppError::Transport(
                "send failed: push stream has ended".to_string(),
            ));
        }
        *state = TransportState::Active;
        drop(state);
        self.touch();
        Ok(())
    }

    /// Parse a correlated inbound request body. Failures are reported back
    /// on the inbound channel by the caller; they never close the session.
    pub fn handle_inbound(&self, raw_body: &str) -> Result<JsonRpcRequest> {
        self.touch();
        serde_json::from_str::<JsonRpcRequest>(raw_body)
            .map_err(|e| AppError::Validation(format!("Parse error: {}", e)))
    }

    /// Idempotent close; returns whether this call performed the transition.
    pub fn close(&self) -> bool {
        let mut state = self.state.lock().expect("transport state lock");
        if *state == TransportState::Closed {
            return false;
        }
        *state = TransportState::Closed;
        if let Some(id) = self.id() {
            debug!("Session transport closed: {}", id);
        }
        true
    }

    pub fn state(&self) -> TransportState {
        *self.state.lock().expect("transport state lock")
    }

    pub fn is_closed(&self) -> bool {
        self.state() == TransportState::Closed
    }

    pub fn is_connected(&self) -> bool {
        matches!(
            self.state(),
            TransportState::Started | TransportState::Active
        ) && !self.sender.is_closed()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        *self.last_activity.lock().expect("activity lock")
    }

    pub(crate) fn touch(&self) {
        *self.last_activity.lock().expect("activity lock") = Utc::now();
    }

    pub fn idle_for(&self) -> Duration {
        Utc::now() - self.last_activity()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub is_connected: bool,
    pub has_underlying_transport: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Process-wide session map. Entries are written once at creation and
/// removed once at disposal; a single concurrent map is the only guard.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, Arc<SessionTransport>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a started transport under its assigned id. A collision with
    /// a live session is a programming error: it is logged loudly and
    /// refused. A collision with an already-closed session is replaced.
    pub fn register(&self, transport: Arc<SessionTransport>) -> Result<()> {
        let id = transport
            .id()
            .ok_or_else(|| {
                AppError::Transport("cannot register a transport before handshake".to_string())
            })?
            .to_string();

        match self.sessions.entry(id.clone()) {
            Entry::Occupied(mut existing) => {
                if existing.get().is_closed() {
                    existing.insert(transport);
                    debug!("Replaced closed session entry: {}", id);
                    Ok(())
                } else {
                    error!(
                        "Session id collision with a live session: {} (refusing registration)",
                        id
                    );
                    Err(AppError::Transport(format!(
                        "session id collision: {}",
                        id
                    )))
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(transport);
                info!("Session registered: {}", id);
                Ok(())
            }
        }
    }

    pub fn resolve(&self, id: &str) -> Result<Arc<SessionTransport>> {
        self.sessions
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| AppError::SessionNotFound(id.to_string()))
    }

    /// Idempotent removal; closes the transport if still open. Safe to call
    /// from the transport's own stream-end path.
    pub fn remove(&self, id: &str) {
        if let Some((_, transport)) = self.sessions.remove(id) {
            transport.close();
            info!("Session removed: {}", id);
        }
    }

    /// Number of sessions that have not transitioned to `Closed`.
    pub fn count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| !entry.value().is_closed())
            .count()
    }

    pub fn ids(&self) -> Vec<String> {
        self.sessions
            .iter()
            .filter(|entry| !entry.value().is_closed())
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn snapshot(&self) -> Vec<SessionSummary> {
        self.sessions
            .iter()
            .map(|entry| {
                let transport = entry.value();
                SessionSummary {
                    session_id: entry.key().clone(),
                    is_connected: transport.is_connected(),
                    has_underlying_transport: !transport.sender.is_closed(),
                    created_at: transport.created_at(),
                    last_activity: transport.last_activity(),
                }
            })
            .collect()
    }

    pub fn close_all(&self) {
        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.remove(&id);
        }
    }

    /// Close and drop sessions idle past `timeout`, plus any entries whose
    /// transport is already closed. Returns the number evicted.
    pub fn evict_idle(&self, timeout: Duration) -> usize {
        let stale: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| {
                let transport = entry.value();
                transport.is_closed() || transport.idle_for() > timeout
            })
            .map(|entry| entry.key().clone())
            .collect();

        for id in &stale {
            warn!("Evicting idle session: {}", id);
            self.remove(id);
        }
        stale.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transport_walks_the_state_machine() {
        let (transport, mut rx) = SessionTransport::connect();
        assert_eq!(transport.state(), TransportState::Created);

        // send before handshake
        let err = transport.send(json!({"x": 1})).unwrap_err();
        assert!(err.to_string().contains("not connected"));

        let id = transport.start().unwrap();
        assert_eq!(transport.id(), Some(id.as_str()));
        assert_eq!(transport.state(), TransportState::Started);

        transport.send(json!({"x": 1})).unwrap();
        assert_eq!(transport.state(), TransportState::Active);
        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.event, "message");

        // double start
        let err = transport.start().unwrap_err();
        assert!(err.to_string().contains("handshake failed"));

        assert!(transport.close());
        assert!(!transport.close(), "second close is a no-op");
        assert!(transport.send(json!({})).is_err());
    }

    #[test]
    fn send_detects_a_dropped_stream() {
        let (transport, rx) = SessionTransport::connect();
        transport.start().unwrap();
        drop(rx);
        let err = transport.send(json!({})).unwrap_err();
        assert!(matches!(err, AppError::Transport(_)));
        assert!(transport.is_closed());
    }

    #[test]
    fn session_ids_are_pairwise_distinct() {
        let mut ids = std::collections::HashSet::new();
        for _ in 0..64 {
            let (transport, _rx) = SessionTransport::connect();
            assert!(ids.insert(transport.start().unwrap()));
        }
    }

    #[test]
    fn registry_counts_only_live_sessions() {
        let registry = SessionRegistry::new();
        let (a, _rx_a) = SessionTransport::connect();
        let (b, _rx_b) = SessionTransport::connect();
        a.start().unwrap();
        b.start().unwrap();
        registry.register(Arc::clone(&a)).unwrap();
        registry.register(Arc::clone(&b)).unwrap();
        assert_eq!(registry.count(), 2);

        a.close();
        assert_eq!(registry.count(), 1);

        registry.remove(a.id().unwrap());
        registry.remove(a.id().unwrap()); // idempotent
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn registry_rejects_unstarted_and_unknown() {
        let registry = SessionRegistry::new();
        let (transport, _rx) = SessionTransport::connect();
        assert!(registry.register(Arc::clone(&transport)).is_err());

        let err = registry.resolve("missing").unwrap_err();
        assert!(matches!(err, AppError::SessionNotFound(_)));
    }

    #[test]
    fn eviction_reaps_idle_and_closed_sessions() {
        let registry = SessionRegistry::new();
        let (transport, _rx) = SessionTransport::connect();
        transport.start().unwrap();
        registry.register(Arc::clone(&transport)).unwrap();

        assert_eq!(registry.evict_idle(Duration::seconds(60)), 0);
        assert_eq!(registry.evict_idle(Duration::seconds(-1)), 1);
        assert_eq!(registry.count(), 0);
        assert!(transport.is_closed());
    }

    #[test]
    fn inbound_parse_failure_does_not_close_the_session() {
        let (transport, _rx) = SessionTransport::connect();
        transport.start().unwrap();
        let err = transport.handle_inbound("{not json").unwrap_err();
        assert!(err.to_string().contains("Parse error"));
        assert!(!transport.is_closed());
    }
}
