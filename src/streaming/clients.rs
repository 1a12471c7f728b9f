use crate::core::frame::monotonic_us;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Connection lifecycle as tracked by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClientState {
    /// Accepted, no complete request yet
    Idle,
    /// Response headers sent, frames flowing
    Streaming,
    /// Marked for teardown after a send failure or EOF
    Closing,
}

/// Per-connection session record: state, request kind, delivery cursor and
/// pacing counters.
pub struct ClientSession {
    id: u64,
    peer: SocketAddr,
    connected_at_us: u64,
    state: Mutex<ClientState>,
    kind: Mutex<&'static str>,
    last_sequence: AtomicU64,
    frames_sent: AtomicU64,
}

impl ClientSession {
    fn new(id: u64, peer: SocketAddr) -> Arc<Self> {
        Arc::new(Self {
            id,
            peer,
            connected_at_us: monotonic_us(),
            state: Mutex::new(ClientState::Idle),
            kind: Mutex::new("none"),
            last_sequence: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn connected_at_us(&self) -> u64 {
        self.connected_at_us
    }

    pub fn state(&self) -> ClientState {
        *self.state.lock()
    }

    /// Transition `Idle -> Streaming` once the request is parsed and
    /// response headers are on the wire
    pub fn mark_streaming(&self, kind: &'static str) {
        *self.state.lock() = ClientState::Streaming;
        *self.kind.lock() = kind;
    }

    /// Transition to `Closing`; the connection task tears down afterwards
    pub fn mark_closing(&self) {
        *self.state.lock() = ClientState::Closing;
    }

    pub fn kind(&self) -> &'static str {
        *self.kind.lock()
    }

    /// Record one delivered frame
    pub fn record_frame(&self, sequence: u64) {
        self.last_sequence.store(sequence, Ordering::Relaxed);
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence.load(Ordering::Relaxed)
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }
}

/// Snapshot of one session for the stats surface
#[derive(Debug, Clone, Serialize)]
pub struct ClientSnapshot {
    pub id: u64,
    pub peer: String,
    pub state: ClientState,
    pub kind: &'static str,
    pub last_sequence: u64,
    pub frames_sent: u64,
    pub connected_seconds: u64,
}

/// Fixed-capacity client registry shared between the accept loop and the
/// handlers. Admission fails once `max_clients` connections are live; every
/// accepted connection holds a guard that frees its slot on drop.
#[derive(Clone)]
pub struct ClientRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    max_clients: usize,
    next_id: AtomicU64,
    sessions: Mutex<HashMap<u64, Arc<ClientSession>>>,
}

impl ClientRegistry {
    pub fn new(max_clients: usize) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                max_clients: max_clients.max(1),
                next_id: AtomicU64::new(1),
                sessions: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Admit a connection, or refuse when all slots are taken
    pub fn try_admit(&self, peer: SocketAddr) -> Option<ConnectionGuard> {
        let mut sessions = self.inner.sessions.lock();
        if sessions.len() >= self.inner.max_clients {
            return None;
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let session = ClientSession::new(id, peer);
        sessions.insert(id, Arc::clone(&session));
        Some(ConnectionGuard {
            registry: self.clone(),
            session,
        })
    }

    pub fn active_count(&self) -> usize {
        self.inner.sessions.lock().len()
    }

    pub fn max_clients(&self) -> usize {
        self.inner.max_clients
    }

    pub fn snapshot(&self) -> Vec<ClientSnapshot> {
        let now = monotonic_us();
        self.inner
            .sessions
            .lock()
            .values()
            .map(|s| ClientSnapshot {
                id: s.id(),
                peer: s.peer().to_string(),
                state: s.state(),
                kind: s.kind(),
                last_sequence: s.last_sequence(),
                frames_sent: s.frames_sent(),
                connected_seconds: now.saturating_sub(s.connected_at_us()) / 1_000_000,
            })
            .collect()
    }

    fn release(&self, id: u64) {
        self.inner.sessions.lock().remove(&id);
    }
}

/// Holds one registry slot for the lifetime of a connection
pub struct ConnectionGuard {
    registry: ClientRegistry,
    session: Arc<ClientSession>,
}

impl ConnectionGuard {
    pub fn session(&self) -> Arc<ClientSession> {
        Arc::clone(&self.session)
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.release(self.session.id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[test]
    fn test_admission_up_to_capacity() {
        let registry = ClientRegistry::new(2);
        let g1 = registry.try_admit(peer()).unwrap();
        let _g2 = registry.try_admit(peer()).unwrap();
        assert_eq!(registry.active_count(), 2);

        assert!(registry.try_admit(peer()).is_none());

        drop(g1);
        assert_eq!(registry.active_count(), 1);
        assert!(registry.try_admit(peer()).is_some());
    }

    #[test]
    fn test_session_state_transitions() {
        let registry = ClientRegistry::new(4);
        let guard = registry.try_admit(peer()).unwrap();
        let session = guard.session();

        assert_eq!(session.state(), ClientState::Idle);
        session.mark_streaming("stream");
        assert_eq!(session.state(), ClientState::Streaming);
        assert_eq!(session.kind(), "stream");
        session.mark_closing();
        assert_eq!(session.state(), ClientState::Closing);
    }

    #[test]
    fn test_frame_accounting() {
        let registry = ClientRegistry::new(4);
        let guard = registry.try_admit(peer()).unwrap();
        let session = guard.session();

        session.record_frame(7);
        session.record_frame(9);
        assert_eq!(session.last_sequence(), 9);
        assert_eq!(session.frames_sent(), 2);
    }

    #[test]
    fn test_snapshot_lists_sessions() {
        let registry = ClientRegistry::new(4);
        let guard = registry.try_admit(peer()).unwrap();
        guard.session().mark_streaming("flv");

        let snap = registry.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].kind, "flv");
        assert_eq!(snap[0].state, ClientState::Streaming);

        drop(guard);
        assert!(registry.snapshot().is_empty());
    }
}
