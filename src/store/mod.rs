//! Replicated state store seam
//!
//! Peers never share memory. Everything they agree on goes through a
//! [`SessionStore`]: a versioned document mutated only by transaction callbacks,
//! plus presence information and a server-synchronized clock.

mod memory;

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;

use crate::types::{ClientId, Session};

pub use memory::MemoryStore;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Transaction timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transaction was acknowledged but never applied")]
    NotApplied,
}

/// Transaction body. May be applied more than once (at-least-once delivery),
/// so it must derive everything from the document it is handed.
pub type Mutator = Box<dyn FnMut(&mut Session) + Send>;

/// Source of server-synchronized time in milliseconds
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Wall clock of the process hosting the document
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to (tests and simulations)
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// The shared document every peer reads and writes
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Current snapshot of the document
    async fn snapshot(&self) -> Session;

    /// Change notifications carrying the new document version
    fn subscribe(&self) -> broadcast::Receiver<u64>;

    /// Atomically apply `mutator` and return the resulting version
    async fn submit_transaction(&self, mutator: Mutator) -> StoreResult<u64>;

    /// Server-synchronized timestamp in milliseconds; the only time source for game logic
    fn server_timestamp(&self) -> i64;

    /// Clients currently connected to the document
    async fn connected_clients(&self) -> HashSet<ClientId>;

    async fn connect(&self, client_id: &str);

    async fn disconnect(&self, client_id: &str);
}

/// Run a transaction and hand back the value computed by its last application.
pub async fn transact<R, F>(store: &dyn SessionStore, mut body: F) -> StoreResult<R>
where
    F: FnMut(&mut Session) -> R + Send + 'static,
    R: Send + 'static,
{
    let slot: Arc<Mutex<Option<R>>> = Arc::new(Mutex::new(None));
    let out = Arc::clone(&slot);

    store
        .submit_transaction(Box::new(move |session: &mut Session| {
            let value = body(session);
            *out.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
        }))
        .await?;

    let value = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    value.ok_or(StoreError::NotApplied)
}

/// [`transact`] raced against `timeout`
pub async fn transact_within<R, F>(
    store: &dyn SessionStore,
    timeout: Duration,
    body: F,
) -> StoreResult<R>
where
    F: FnMut(&mut Session) -> R + Send + 'static,
    R: Send + 'static,
{
    tokio::time::timeout(timeout, transact(store, body))
        .await
        .map_err(|_| StoreError::Timeout(timeout))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now_ms(), 1_250);
        clock.set(10);
        assert_eq!(clock.now_ms(), 10);
    }

    #[tokio::test]
    async fn test_transact_returns_body_value() {
        let store = MemoryStore::new(Arc::new(ManualClock::new(0)));
        let count = transact(&store, |s| {
            s.host_ids.push("h1".to_string());
            s.host_ids.len()
        })
        .await
        .unwrap();
        assert_eq!(count, 1);
        assert_eq!(store.snapshot().await.host_ids, vec!["h1".to_string()]);
    }
}
