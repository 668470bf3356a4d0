//! The callback surface of the platform stack, as typed events.
//!
//! Backends translate whatever delegate/callback mechanism the platform
//! uses into [`BackendEvent`] values on an unbounded mpsc channel. The
//! [`CentralManager`](crate::manager::CentralManager) consumes the channel
//! on a dispatch task and routes each event into the pending-operation
//! registries or the discovery aggregator.
//!
//! Events are unordered, may be duplicated, and may reference devices with
//! no pending registration; the registry's absent-key rule makes all of
//! that safe.

use tokio::sync::mpsc;

use bluebridge_types::{AdapterState, DeviceId, DeviceRecord};

use crate::traits::BackendError;

/// An asynchronous notification from the platform stack.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug)]
#[non_exhaustive]
pub enum BackendEvent {
    /// The adapter's radio state changed.
    AdapterStateChanged(AdapterState),
    /// A peripheral was observed during scanning.
    DeviceDiscovered(DeviceRecord),
    /// A connection attempt succeeded.
    DeviceConnected(DeviceId),
    /// A connection attempt failed.
    DeviceConnectFailed {
        /// The peripheral that failed to connect.
        id: DeviceId,
        /// The reported cause.
        error: BackendError,
    },
    /// A connection ended, cleanly (`error: None`) or otherwise.
    DeviceDisconnected {
        /// The peripheral that disconnected.
        id: DeviceId,
        /// The reported cause, if the teardown was not clean.
        error: Option<BackendError>,
    },
    /// Service enumeration finished.
    ServicesDiscovered {
        /// The peripheral whose services were enumerated.
        id: DeviceId,
        /// The reported cause, if enumeration failed.
        error: Option<BackendError>,
    },
}

/// Sender half of a backend event channel.
pub type EventSender = mpsc::UnboundedSender<BackendEvent>;

/// Receiver half of a backend event channel.
pub type EventReceiver = mpsc::UnboundedReceiver<BackendEvent>;

/// Create a backend event channel.
///
/// Backends keep the sender; the receiver is handed to
/// [`CentralManager::new`](crate::manager::CentralManager::new).
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
