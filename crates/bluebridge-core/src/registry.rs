//! Exactly-once continuation registry for pending stack operations.
//!
//! This is the bridge between fire-and-forget triggers and the callbacks
//! that eventually (or never) answer them. Each registry instance tracks at
//! most one pending operation per key; resolution removes the entry and
//! delivers the outcome through a one-shot channel in the same critical
//! section, so a given operation can only ever be resolved once, no matter
//! how many callbacks, duplicates, or timers race for it.
//!
//! The guarantees, concretely:
//!
//! - [`register`](ContinuationRegistry::register) refuses a second entry for
//!   a key that already has one, instead of silently replacing it (which
//!   would strand the first caller forever).
//! - [`resolve`](ContinuationRegistry::resolve) is remove-then-send under a
//!   single lock; a second resolver for the same key observes "absent" and
//!   becomes a no-op. Late or stray callbacks are discarded the same way.
//! - The result slot is a `tokio::sync::oneshot` sender, consumed on send;
//!   writing twice is unrepresentable, not merely forbidden.
//! - [`expire_after`](ContinuationRegistry::expire_after) races a timer
//!   against the real callback through the exact same `resolve` path.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use bluebridge_types::{DeviceId, OperationKind};

use crate::error::{Error, Result};

/// A pending operation: diagnostics metadata plus the single-use result slot.
struct Pending<T> {
    name: Option<String>,
    registered_at: Instant,
    tx: oneshot::Sender<Result<T>>,
}

struct Inner<K, T> {
    kind: OperationKind,
    pending: Mutex<HashMap<K, Pending<T>>>,
}

/// Thread-safe map from an operation key to exactly one pending,
/// resolvable result slot.
///
/// Clones share the same underlying map; a clone is what the timeout task
/// holds. Traffic is one entry per in-flight device operation, so a single
/// coarse lock over the whole map is sufficient.
pub struct ContinuationRegistry<K, T> {
    inner: Arc<Inner<K, T>>,
}

impl<K, T> Clone for ContinuationRegistry<K, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Awaitable handle for a registered operation.
///
/// Yields whatever outcome won the race between the success callback, the
/// failure callback, and the timeout.
pub struct PendingHandle<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> PendingHandle<T> {
    /// Suspend until the operation is resolved.
    ///
    /// Returns [`Error::Cancelled`] if the registry disappeared before
    /// delivering a result (manager shutdown).
    pub async fn wait(self) -> Result<T> {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::Cancelled),
        }
    }
}

impl<K, T> ContinuationRegistry<K, T>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static,
    T: Send + 'static,
{
    /// Create an empty registry for the given operation kind.
    pub fn new(kind: OperationKind) -> Self {
        Self {
            inner: Arc::new(Inner {
                kind,
                pending: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The operation kind this registry tracks.
    pub fn kind(&self) -> OperationKind {
        self.inner.kind
    }

    /// Register a new pending operation under `key`.
    ///
    /// Fails with [`Error::AlreadyInProgress`] if an operation for this key
    /// is already outstanding. On success, returns the handle the caller
    /// suspends on; `name` is kept for diagnostics only.
    pub async fn register(&self, key: K, name: Option<&str>) -> Result<PendingHandle<T>> {
        let mut pending = self.inner.pending.lock().await;
        if pending.contains_key(&key) {
            return Err(Error::already_in_progress(
                DeviceId::new(key.to_string()),
                self.inner.kind,
            ));
        }

        debug!(
            kind = %self.inner.kind,
            device = %key,
            name = name.unwrap_or(""),
            "registered pending operation"
        );

        let (tx, rx) = oneshot::channel();
        pending.insert(
            key,
            Pending {
                name: name.map(str::to_owned),
                registered_at: Instant::now(),
                tx,
            },
        );
        Ok(PendingHandle { rx })
    }

    /// Resolve the pending operation for `key` with `outcome`.
    ///
    /// Returns `true` if an entry was present and the outcome was delivered.
    /// An absent key (never registered, already resolved, or timed out)
    /// makes this a no-op returning `false`; the event is discarded with a
    /// diagnostic log only, since stray callbacks are an expected race.
    pub async fn resolve(&self, key: &K, outcome: Result<T>) -> bool {
        let entry = self.inner.pending.lock().await.remove(key);
        match entry {
            Some(op) => {
                debug!(
                    kind = %self.inner.kind,
                    device = %key,
                    name = op.name.as_deref().unwrap_or(""),
                    elapsed = ?op.registered_at.elapsed(),
                    "resolving pending operation"
                );
                // The waiter may have gone away; nothing left to notify then.
                let _ = op.tx.send(outcome);
                true
            }
            None => {
                debug!(
                    kind = %self.inner.kind,
                    device = %key,
                    "no pending operation for callback, discarding"
                );
                false
            }
        }
    }

    /// Schedule a timeout for `key`.
    ///
    /// If the entry is still present when the timer fires, it is resolved
    /// with [`Error::Timeout`] through the normal [`resolve`] path; if the
    /// real callback won the race, the timer observes an absent key and
    /// does nothing.
    ///
    /// [`resolve`]: ContinuationRegistry::resolve
    pub fn expire_after(&self, key: K, after: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            sleep(after).await;
            let kind = registry.kind();
            if registry
                .resolve(&key, Err(Error::timeout(kind, after)))
                .await
            {
                warn!(%kind, device = %key, timeout = ?after, "operation timed out");
            }
        })
    }

    /// Number of operations currently pending.
    pub async fn in_flight(&self) -> usize {
        self.inner.pending.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ContinuationRegistry<DeviceId, u32> {
        ContinuationRegistry::new(OperationKind::Connecting)
    }

    #[tokio::test]
    async fn test_register_twice_fails() {
        let registry = registry();
        let id = DeviceId::new("AA");

        let _first = registry.register(id.clone(), Some("Device A")).await.unwrap();
        let second = registry.register(id.clone(), None).await;

        match second {
            Err(Error::AlreadyInProgress { device_id, kind }) => {
                assert_eq!(device_id, id);
                assert_eq!(kind, OperationKind::Connecting);
            }
            other => panic!("expected AlreadyInProgress, got {:?}", other.map(|_| ())),
        }
        assert_eq!(registry.in_flight().await, 1);
    }

    #[tokio::test]
    async fn test_resolve_delivers_exactly_once() {
        let registry = registry();
        let id = DeviceId::new("AA");

        let handle = registry.register(id.clone(), None).await.unwrap();
        assert!(registry.resolve(&id, Ok(7)).await);
        // Entry is gone; a second resolver is a no-op.
        assert!(!registry.resolve(&id, Ok(8)).await);
        assert_eq!(registry.in_flight().await, 0);

        assert_eq!(handle.wait().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_resolve_unknown_key_is_noop() {
        let registry = registry();
        assert!(!registry.resolve(&DeviceId::new("nobody"), Ok(1)).await);
    }

    #[tokio::test]
    async fn test_key_freed_after_resolution() {
        let registry = registry();
        let id = DeviceId::new("AA");

        let handle = registry.register(id.clone(), None).await.unwrap();
        registry.resolve(&id, Ok(1)).await;
        handle.wait().await.unwrap();

        // Re-registration is allowed once the previous operation completed.
        let handle = registry.register(id.clone(), None).await.unwrap();
        registry.resolve(&id, Ok(2)).await;
        assert_eq!(handle.wait().await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_resolves_pending_entry() {
        let registry = registry();
        let id = DeviceId::new("AA");

        let handle = registry.register(id.clone(), None).await.unwrap();
        let _timer = registry.expire_after(id.clone(), Duration::from_secs(1));

        match handle.wait().await {
            Err(Error::Timeout {
                operation,
                duration,
            }) => {
                assert_eq!(operation, OperationKind::Connecting);
                assert_eq!(duration, Duration::from_secs(1));
            }
            other => panic!("expected Timeout, got {:?}", other.map(|_| ())),
        }

        // The late "real" callback is discarded without error.
        assert!(!registry.resolve(&id, Ok(9)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_beats_timeout() {
        let registry = registry();
        let id = DeviceId::new("AA");

        let handle = registry.register(id.clone(), None).await.unwrap();
        let timer = registry.expire_after(id.clone(), Duration::from_secs(30));

        assert!(registry.resolve(&id, Ok(5)).await);
        assert_eq!(handle.wait().await.unwrap(), 5);

        // Let the timer fire against the now-absent key; it must be a no-op.
        timer.await.unwrap();
        assert_eq!(registry.in_flight().await, 0);
    }

    #[tokio::test]
    async fn test_dropped_registry_cancels_waiters() {
        let registry = registry();
        let id = DeviceId::new("AA");

        let handle = registry.register(id.clone(), None).await.unwrap();
        drop(registry);

        assert!(matches!(handle.wait().await, Err(Error::Cancelled)));
    }
}
