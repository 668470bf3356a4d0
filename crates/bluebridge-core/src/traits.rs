//! Trait abstraction over the platform BLE central stack.
//!
//! The [`CentralBackend`] trait is the seam between the awaitable adapter
//! layer and whatever actually drives the radio. The production
//! implementation is [`BtleplugBackend`](crate::platform::BtleplugBackend);
//! tests use [`MockBackend`](crate::mock::MockBackend).
//!
//! All triggers are fire-and-forget from the adapter's point of view: a
//! returned `Ok(())` means the request was handed to the stack, nothing
//! more. Outcomes arrive later on the backend's event channel (see
//! [`crate::events`]), or never, in which case the operation's timeout
//! resolves the waiting caller.

use async_trait::async_trait;
use thiserror::Error;

use bluebridge_types::DeviceId;

/// Errors originating in the platform stack.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BackendError {
    /// Bluetooth Low Energy error from the platform stack.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// No Bluetooth adapter is available on this host.
    #[error("no Bluetooth adapter available")]
    NoAdapter,

    /// The backend has never seen this peripheral.
    #[error("unknown peripheral: {0}")]
    UnknownPeripheral(DeviceId),

    /// Free-form stack failure (used by test doubles and by synthesized
    /// failure events).
    #[error("{0}")]
    Stack(String),
}

/// Result type alias for backend operations.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// The collaborator contract with the platform BLE central stack.
///
/// Implementations must be cheap to call from async contexts and must not
/// block the caller on radio round-trips: anything that completes later is
/// reported through the event channel, not through the trigger's return
/// value.
#[async_trait]
pub trait CentralBackend: Send + Sync {
    /// Begin scanning for peripherals. Discoveries arrive as
    /// [`BackendEvent::DeviceDiscovered`](crate::events::BackendEvent) events.
    async fn start_scan(&self) -> BackendResult<()>;

    /// Stop an in-progress scan.
    async fn stop_scan(&self) -> BackendResult<()>;

    /// Request a connection to a peripheral. The outcome arrives as a
    /// `DeviceConnected` or `DeviceConnectFailed` event.
    async fn connect(&self, id: &DeviceId) -> BackendResult<()>;

    /// Request connection teardown. The outcome arrives as a
    /// `DeviceDisconnected` event.
    async fn cancel_connection(&self, id: &DeviceId) -> BackendResult<()>;

    /// Request service enumeration on a connected peripheral. The outcome
    /// arrives as a `ServicesDiscovered` event.
    async fn discover_services(&self, id: &DeviceId) -> BackendResult<()>;

    /// Whether the stack currently reports the peripheral as connected.
    ///
    /// Unlike the triggers above this is a synchronous-answer query, used
    /// by operation preconditions.
    async fn is_connected(&self, id: &DeviceId) -> BackendResult<bool>;
}
