use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A guard held longer than this is considered stuck and may be taken over
pub const EXPLOSION_OVERDUE_MS: i64 = 10_000;

/// Hard limit for one explosion handler run
pub const EXPLOSION_TIMEOUT: Duration = Duration::from_secs(8);

const FREE: i64 = i64::MIN;

/// Non-reentrant busy flag for explosion handling, owned by one peer.
///
/// Stores the server time it was acquired at, so a holder that never
/// finishes can be detected and overridden.
#[derive(Debug, Clone)]
pub struct ExplosionGuard {
    acquired_at: Arc<AtomicI64>,
}

impl Default for ExplosionGuard {
    fn default() -> Self {
        Self {
            acquired_at: Arc::new(AtomicI64::new(FREE)),
        }
    }
}

impl ExplosionGuard {
    /// Try to take the guard at server time `now`.
    ///
    /// Returns None while another handler holds it, unless that holder is
    /// overdue, in which case the guard is forcibly taken over.
    pub fn try_acquire(&self, now: i64) -> Option<ExplosionPermit> {
        let current = self.acquired_at.load(Ordering::SeqCst);
        if current != FREE {
            let held_for = now - current;
            if held_for < EXPLOSION_OVERDUE_MS {
                return None;
            }
            tracing::warn!(
                "Explosion guard held for {}ms, forcing unlock",
                held_for
            );
        }

        self.acquired_at
            .compare_exchange(current, now, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| ExplosionPermit {
                slot: Arc::clone(&self.acquired_at),
                token: now,
            })
    }

    pub fn is_held(&self) -> bool {
        self.acquired_at.load(Ordering::SeqCst) != FREE
    }
}

/// Releases the guard on drop, unless it was taken over in the meantime
#[derive(Debug)]
pub struct ExplosionPermit {
    slot: Arc<AtomicI64>,
    token: i64,
}

impl Drop for ExplosionPermit {
    fn drop(&mut self) {
        let _ = self
            .slot
            .compare_exchange(self.token, FREE, Ordering::SeqCst, Ordering::SeqCst);
    }
}
