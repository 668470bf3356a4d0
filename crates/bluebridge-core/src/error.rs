//! Error types for bluebridge-core.
//!
//! Every operation failure is returned to the original caller as a typed
//! error; nothing in this crate panics on a failed operation. Stray
//! callbacks for devices with no pending registration are an expected race,
//! not an error, and never surface here (see
//! [`ContinuationRegistry::resolve`](crate::registry::ContinuationRegistry::resolve)).
//!
//! # Recovery
//!
//! | Error | Strategy |
//! |-------|----------|
//! | [`Error::AlreadyInProgress`] | Wait for the pending operation, then retry |
//! | [`Error::PreconditionFailed`] | Fix the device state (e.g. connect first) |
//! | [`Error::Backend`] | Often transient; retry with backoff |
//! | [`Error::Timeout`] | Retry; the late callback, if any, is discarded safely |
//! | [`Error::Cancelled`] | The manager shut down; not retryable |

use std::time::Duration;

use thiserror::Error;

use bluebridge_types::{DeviceId, OperationKind};

use crate::traits::BackendError;

/// Errors surfaced by bluebridge operations.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A second operation of the same kind was requested for a device that
    /// already has one pending.
    #[error("{kind} already in progress for {device_id}")]
    AlreadyInProgress {
        /// The device the duplicate request targeted.
        device_id: DeviceId,
        /// The kind of operation that is already pending.
        kind: OperationKind,
    },

    /// The device is not in the required state for the requested action.
    ///
    /// Surfaced immediately, without waiting for a timeout; the external
    /// stack is never invoked.
    #[error("precondition failed for {device_id}: {reason}")]
    PreconditionFailed {
        /// The device the request targeted.
        device_id: DeviceId,
        /// The structured reason the precondition did not hold.
        reason: PreconditionFailure,
    },

    /// The platform stack reported an error.
    #[error("Bluetooth stack failure: {source}")]
    Backend {
        /// The device involved, when the failure is device-scoped.
        device_id: Option<DeviceId>,
        /// The underlying cause.
        #[source]
        source: BackendError,
    },

    /// No callback arrived within the configured window.
    #[error("operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: OperationKind,
        /// The timeout duration.
        duration: Duration,
    },

    /// The pending operation's owner went away before a result was
    /// delivered (manager shutdown).
    #[error("operation cancelled")]
    Cancelled,
}

/// Structured reasons for a failed precondition.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PreconditionFailure {
    /// The action requires an established connection and there is none.
    NotConnected,
    /// Other reason.
    Other(String),
}

impl std::fmt::Display for PreconditionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConnected => write!(f, "device not connected"),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl Error {
    /// Create an already-in-progress error.
    pub fn already_in_progress(device_id: DeviceId, kind: OperationKind) -> Self {
        Self::AlreadyInProgress { device_id, kind }
    }

    /// Create a precondition failure for a device.
    pub fn precondition_failed(device_id: DeviceId, reason: PreconditionFailure) -> Self {
        Self::PreconditionFailed { device_id, reason }
    }

    /// Wrap a backend error, optionally scoped to a device.
    pub fn backend(device_id: Option<DeviceId>, source: BackendError) -> Self {
        Self::Backend { device_id, source }
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: OperationKind, duration: Duration) -> Self {
        Self::Timeout {
            operation,
            duration,
        }
    }
}

/// Result type alias using bluebridge-core's [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let id = DeviceId::new("AA:BB:CC:DD:EE:FF");

        let err = Error::already_in_progress(id.clone(), OperationKind::Connecting);
        assert!(err.to_string().contains("connect already in progress"));
        assert!(err.to_string().contains("AA:BB:CC:DD:EE:FF"));

        let err = Error::precondition_failed(id.clone(), PreconditionFailure::NotConnected);
        assert!(err.to_string().contains("device not connected"));

        let err = Error::timeout(OperationKind::Discovering, Duration::from_secs(5));
        assert!(err.to_string().contains("discover-services"));
        assert!(err.to_string().contains("5s"));

        let err = Error::backend(Some(id), BackendError::Stack("radio fell over".into()));
        assert!(err.to_string().contains("Bluetooth stack failure"));
    }

    #[test]
    fn test_backend_error_source_is_preserved() {
        use std::error::Error as _;

        let err = Error::backend(None, BackendError::NoAdapter);
        let source = err.source().expect("source");
        assert!(source.to_string().contains("no Bluetooth adapter"));
    }

    #[test]
    fn test_precondition_failure_display() {
        assert_eq!(
            PreconditionFailure::NotConnected.to_string(),
            "device not connected"
        );
        assert_eq!(
            PreconditionFailure::Other("busy".into()).to_string(),
            "busy"
        );
    }
}
