//! Single request/response cycles against the external stack.
//!
//! An [`OperationService`] owns one [`ContinuationRegistry`] for one
//! [`OperationKind`] and drives the full register → trigger → await cycle
//! for it. Kinds get separate services precisely so that a connect in
//! flight and a service discovery in flight on the same device never
//! collide in the registry.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::debug;

use bluebridge_types::{DeviceId, OperationKind};

use crate::error::Result;
use crate::registry::ContinuationRegistry;

/// Drives one external-stack action to completion per call, translating
/// its eventual callback into a return value or error.
pub struct OperationService<T> {
    registry: ContinuationRegistry<DeviceId, T>,
    timeout: Duration,
    attempts: AtomicU64,
}

impl<T: Send + 'static> OperationService<T> {
    /// Create a service for `kind` with the given callback timeout.
    pub fn new(kind: OperationKind, timeout: Duration) -> Self {
        Self {
            registry: ContinuationRegistry::new(kind),
            timeout,
            attempts: AtomicU64::new(0),
        }
    }

    /// The operation kind this service performs.
    pub fn kind(&self) -> OperationKind {
        self.registry.kind()
    }

    /// The configured callback timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Total attempts started since creation (diagnostics).
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Number of operations currently awaiting a callback.
    pub async fn in_flight(&self) -> usize {
        self.registry.in_flight().await
    }

    /// Perform one operation for `device_id`.
    ///
    /// Registers a pending entry (failing fast with
    /// [`Error::AlreadyInProgress`](crate::Error::AlreadyInProgress) if one
    /// is outstanding), runs `trigger`, and suspends until a callback or
    /// the timeout resolves the entry.
    ///
    /// A `trigger` that returns an error resolves the just-registered entry
    /// with that error immediately instead of waiting out the timeout; this
    /// is the path for precondition failures and for submissions the stack
    /// rejected outright.
    pub async fn perform<F, Fut>(
        &self,
        device_id: &DeviceId,
        name: Option<&str>,
        trigger: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let handle = self.registry.register(device_id.clone(), name).await?;
        self.attempts.fetch_add(1, Ordering::Relaxed);
        debug!(kind = %self.kind(), device = %device_id, "operation started");

        match trigger().await {
            Ok(()) => {
                let _ = self.registry.expire_after(device_id.clone(), self.timeout);
            }
            Err(err) => {
                // The stack was never engaged; no callback will ever come.
                self.registry.resolve(device_id, Err(err)).await;
            }
        }

        handle.wait().await
    }

    /// Resolve the pending operation for `device_id` from a callback.
    ///
    /// Returns `false` (a safe no-op) when no operation is pending for the
    /// device, i.e. a stray, duplicate, or post-timeout callback.
    pub async fn complete(&self, device_id: &DeviceId, outcome: Result<T>) -> bool {
        self.registry.resolve(device_id, outcome).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::{Error, PreconditionFailure};

    fn service(timeout: Duration) -> Arc<OperationService<u32>> {
        Arc::new(OperationService::new(OperationKind::Connecting, timeout))
    }

    #[tokio::test]
    async fn test_perform_resolves_from_callback() {
        let svc = service(Duration::from_secs(5));
        let id = DeviceId::new("AA");

        let resolver = {
            let svc = Arc::clone(&svc);
            let id = id.clone();
            async move {
                // Give perform a chance to register first.
                tokio::task::yield_now().await;
                assert!(svc.complete(&id, Ok(42)).await);
            }
        };

        let (result, ()) = tokio::join!(
            svc.perform(&id, Some("Device A"), || async { Ok(()) }),
            resolver
        );
        assert_eq!(result.unwrap(), 42);
        assert_eq!(svc.attempts(), 1);
        assert_eq!(svc.in_flight().await, 0);
    }

    #[tokio::test]
    async fn test_failed_trigger_resolves_immediately() {
        let svc = service(Duration::from_secs(3600));
        let id = DeviceId::new("AA");

        // A one-hour timeout would hang the test if the failed trigger did
        // not short-circuit the wait.
        let result = svc
            .perform(&id, None, || async {
                Err(Error::precondition_failed(
                    DeviceId::new("AA"),
                    PreconditionFailure::NotConnected,
                ))
            })
            .await;

        assert!(matches!(
            result,
            Err(Error::PreconditionFailed {
                reason: PreconditionFailure::NotConnected,
                ..
            })
        ));
        assert_eq!(svc.in_flight().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_perform_times_out_without_callback() {
        let svc = service(Duration::from_secs(2));
        let id = DeviceId::new("AA");

        let result = svc.perform(&id, None, || async { Ok(()) }).await;

        match result {
            Err(Error::Timeout {
                operation,
                duration,
            }) => {
                assert_eq!(operation, OperationKind::Connecting);
                assert_eq!(duration, Duration::from_secs(2));
            }
            other => panic!("expected Timeout, got {:?}", other.map(|_| ())),
        }

        // The late callback is discarded without error.
        assert!(!svc.complete(&id, Ok(1)).await);
    }

    #[tokio::test]
    async fn test_second_perform_fails_while_first_pending() {
        let svc = service(Duration::from_secs(5));
        let id = DeviceId::new("AA");

        let first = {
            let svc = Arc::clone(&svc);
            let id = id.clone();
            tokio::spawn(async move { svc.perform(&id, None, || async { Ok(()) }).await })
        };

        // Wait until the first attempt is registered.
        while svc.in_flight().await == 0 {
            tokio::task::yield_now().await;
        }

        let second = svc.perform(&id, None, || async { Ok(()) }).await;
        assert!(matches!(second, Err(Error::AlreadyInProgress { .. })));

        // The first caller is unaffected and still resolves normally.
        assert!(svc.complete(&id, Ok(11)).await);
        assert_eq!(first.await.unwrap().unwrap(), 11);
    }
}
