//! Awaitable adapter over callback-driven BLE central stacks.
//!
//! The platform Bluetooth stack speaks in callbacks: you fire a trigger and
//! some time later (or never) a delegate method tells you what happened,
//! possibly twice, possibly for a device you stopped caring about. This
//! crate turns that surface into ordinary awaitable calls and observable
//! streams:
//!
//! - **Continuation registry** ([`registry`]): at most one pending
//!   operation per device and operation kind, resolved exactly once by
//!   whichever of {success callback, failure callback, timeout} arrives
//!   first. Stray and duplicate callbacks are discarded safely.
//! - **Operation services** ([`operation`]): the register → trigger →
//!   await cycle for connect, disconnect, and service discovery, with
//!   precondition short-circuiting and per-kind timeouts.
//! - **Discovery aggregator** ([`aggregator`]): an append-only,
//!   deduplicated device list republished as full snapshots, and the
//!   adapter-state stream with its first-`PoweredOff` suppression rule.
//! - **Backends** ([`traits`]): the stack itself stays behind the
//!   [`CentralBackend`] trait, with [`platform::BtleplugBackend`] in
//!   production and [`mock::MockBackend`] in tests.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use bluebridge_core::{BtleplugBackend, CentralManager, DeviceId, ManagerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (backend, events) = BtleplugBackend::new().await?;
//!     let manager = CentralManager::new(backend, events, ManagerConfig::default());
//!
//!     manager.start_scan().await?;
//!     tokio::time::sleep(Duration::from_secs(5)).await;
//!     manager.stop_scan().await?;
//!
//!     let devices = manager.devices().await;
//!     if let Some(record) = devices.first() {
//!         let connected = manager.connect(&record.id).await?;
//!         println!("connected to {}", connected.display_name());
//!         manager.discover_services(&connected.id).await?;
//!         manager.disconnect(&connected.id).await?;
//!     }
//!
//!     manager.shutdown();
//!     Ok(())
//! }
//! ```

pub mod aggregator;
pub mod error;
pub mod events;
pub mod manager;
pub mod mock;
pub mod operation;
pub mod platform;
pub mod registry;
pub mod traits;
pub mod util;

pub use aggregator::DiscoveryAggregator;
pub use error::{Error, PreconditionFailure, Result};
pub use events::{BackendEvent, EventReceiver, EventSender, event_channel};
pub use manager::{CentralManager, ManagerConfig};
pub use mock::{MockBackend, MockCall};
pub use operation::OperationService;
pub use platform::BtleplugBackend;
pub use registry::{ContinuationRegistry, PendingHandle};
pub use traits::{BackendError, BackendResult, CentralBackend};

// Re-export the shared data model.
pub use bluebridge_types::{AdapterState, DeviceId, DeviceRecord, OperationKind};
