//! Platform-agnostic types for the bluebridge BLE adapter.
//!
//! This crate provides the shared data model used by `bluebridge-core` and
//! any frontends built on top of it: device identifiers, adapter states,
//! operation tags, and discovered-device records. It carries no Bluetooth
//! dependencies of its own, so it can be used in contexts where the native
//! stack is unavailable.
//!
//! # Example
//!
//! ```
//! use bluebridge_types::{AdapterState, DeviceId, DeviceRecord};
//!
//! let id = DeviceId::new("AA:BB:CC:DD:EE:FF");
//! let record = DeviceRecord::new(id).with_name("Heart Monitor");
//! assert_eq!(record.display_name(), "Heart Monitor");
//! assert!(AdapterState::PoweredOn.is_usable());
//! ```

pub mod types;

pub use types::{AdapterState, DeviceId, DeviceRecord, OperationKind};
