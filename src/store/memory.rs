use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use super::{Clock, Mutator, SessionStore, StoreResult, SystemClock};
use crate::types::{ClientId, Session};

/// In-process document host.
///
/// Transactions are serialized behind a single write lock, so each body is
/// applied exactly once and atomically.
pub struct MemoryStore {
    session: RwLock<Session>,
    version: AtomicU64,
    connected: RwLock<HashSet<ClientId>>,
    changes: broadcast::Sender<u64>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_session(Session::default(), clock)
    }

    pub fn with_session(session: Session, clock: Arc<dyn Clock>) -> Self {
        let (changes, _rx) = broadcast::channel(256);
        Self {
            session: RwLock::new(session),
            version: AtomicU64::new(1),
            connected: RwLock::new(HashSet::new()),
            changes,
            clock,
        }
    }

    /// Store backed by the system clock
    pub fn system() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    fn bump(&self) -> u64 {
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        // No subscribers is fine
        let _ = self.changes.send(version);
        version
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::system()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn snapshot(&self) -> Session {
        self.session.read().await.clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<u64> {
        self.changes.subscribe()
    }

    async fn submit_transaction(&self, mut mutator: Mutator) -> StoreResult<u64> {
        let mut session = self.session.write().await;
        mutator(&mut *session);
        drop(session);
        Ok(self.bump())
    }

    fn server_timestamp(&self) -> i64 {
        self.clock.now_ms()
    }

    async fn connected_clients(&self) -> HashSet<ClientId> {
        self.connected.read().await.clone()
    }

    async fn connect(&self, client_id: &str) {
        let inserted = self.connected.write().await.insert(client_id.to_string());
        if inserted {
            tracing::info!("Client connected: {}", client_id);
            self.bump();
        }
    }

    async fn disconnect(&self, client_id: &str) {
        let removed = self.connected.write().await.remove(client_id);
        if removed {
            tracing::info!("Client disconnected: {}", client_id);
            self.bump();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ManualClock;

    #[tokio::test]
    async fn test_transaction_bumps_version_and_notifies() {
        let store = MemoryStore::new(Arc::new(ManualClock::new(0)));
        let mut rx = store.subscribe();
        let before = store.version();

        let version = store
            .submit_transaction(Box::new(|s: &mut Session| s.started = true))
            .await
            .unwrap();

        assert_eq!(version, before + 1);
        assert_eq!(rx.recv().await.unwrap(), version);
        assert!(store.snapshot().await.started);
    }

    #[tokio::test]
    async fn test_presence_changes_notify_once() {
        let store = MemoryStore::new(Arc::new(ManualClock::new(0)));
        let mut rx = store.subscribe();

        store.connect("h1").await;
        store.connect("h1").await;
        assert!(rx.recv().await.is_ok());
        assert!(rx.try_recv().is_err());
        assert!(store.connected_clients().await.contains("h1"));

        store.disconnect("h1").await;
        assert!(store.connected_clients().await.is_empty());
    }
}
