//! Core types for the bluebridge adapter boundary.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Opaque, stable identifier for a physical peripheral.
///
/// The underlying value is whatever the platform stack reports as a stable
/// handle for the device: a MAC address on Linux/Windows, a CoreBluetooth
/// UUID on macOS. The only operations the adapter layer performs on it are
/// equality comparison and map keying; the contents are never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a device identifier from a platform-provided handle string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DeviceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Tag distinguishing the independent pending-operation registries.
///
/// A connect in flight and a service discovery in flight on the same device
/// are tracked separately; only two operations of the *same* kind on the
/// same device collide.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new operation
/// kinds in future versions without breaking downstream code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[non_exhaustive]
pub enum OperationKind {
    /// Establishing a connection to a peripheral.
    Connecting,
    /// Tearing down a connection to a peripheral.
    Disconnecting,
    /// Enumerating the services of a connected peripheral.
    Discovering,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Connecting => write!(f, "connect"),
            OperationKind::Disconnecting => write!(f, "disconnect"),
            OperationKind::Discovering => write!(f, "discover-services"),
        }
    }
}

/// State of the platform Bluetooth adapter.
///
/// Mirrors the states the native stacks report. `Unknown` is the reading
/// before the stack has initialized; many platforms briefly report
/// `PoweredOff` in the same window, which is why the state stream suppresses
/// a leading `PoweredOff` (see `bluebridge-core`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum AdapterState {
    /// State not yet known.
    #[default]
    Unknown,
    /// The adapter is resetting.
    Resetting,
    /// The platform has no usable Bluetooth support.
    Unsupported,
    /// The application is not authorized to use Bluetooth.
    Unauthorized,
    /// The radio is off.
    PoweredOff,
    /// The radio is on and ready.
    PoweredOn,
}

impl AdapterState {
    /// Whether operations can be attempted in this state.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        matches!(self, AdapterState::PoweredOn)
    }
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterState::Unknown => write!(f, "unknown"),
            AdapterState::Resetting => write!(f, "resetting"),
            AdapterState::Unsupported => write!(f, "unsupported"),
            AdapterState::Unauthorized => write!(f, "unauthorized"),
            AdapterState::PoweredOff => write!(f, "powered off"),
            AdapterState::PoweredOn => write!(f, "powered on"),
        }
    }
}

/// A peripheral observed during scanning.
///
/// Holds the stable identifier plus the advertised metadata that is useful
/// to consumers. The platform-level handle (peripheral object, GATT client)
/// stays inside the backend, keyed by [`DeviceId`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceRecord {
    /// Stable identifier used for all subsequent operations.
    pub id: DeviceId,
    /// Advertised local name, if any.
    pub name: Option<String>,
    /// Signal strength at discovery time, in dBm.
    pub rssi: Option<i16>,
}

impl DeviceRecord {
    /// Create a record with no advertised metadata.
    pub fn new(id: DeviceId) -> Self {
        Self {
            id,
            name: None,
            rssi: None,
        }
    }

    /// Set the advertised name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the discovery-time RSSI.
    #[must_use]
    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }

    /// Name for display purposes, falling back to the identifier.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_equality_and_display() {
        let a = DeviceId::new("AA:BB:CC:DD:EE:FF");
        let b = DeviceId::from("AA:BB:CC:DD:EE:FF");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "AA:BB:CC:DD:EE:FF");
        assert_ne!(a, DeviceId::new("11:22:33:44:55:66"));
    }

    #[test]
    fn test_operation_kind_display() {
        assert_eq!(OperationKind::Connecting.to_string(), "connect");
        assert_eq!(OperationKind::Disconnecting.to_string(), "disconnect");
        assert_eq!(OperationKind::Discovering.to_string(), "discover-services");
    }

    #[test]
    fn test_adapter_state_usability() {
        assert!(AdapterState::PoweredOn.is_usable());
        assert!(!AdapterState::PoweredOff.is_usable());
        assert!(!AdapterState::Unknown.is_usable());
        assert_eq!(AdapterState::default(), AdapterState::Unknown);
    }

    #[test]
    fn test_device_record_display_name() {
        let id = DeviceId::new("AA:BB:CC:DD:EE:FF");
        let bare = DeviceRecord::new(id.clone());
        assert_eq!(bare.display_name(), "AA:BB:CC:DD:EE:FF");

        let named = DeviceRecord::new(id).with_name("Heart Monitor").with_rssi(-42);
        assert_eq!(named.display_name(), "Heart Monitor");
        assert_eq!(named.rssi, Some(-42));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_round_trip() {
        let record = DeviceRecord::new(DeviceId::new("AA:BB")).with_name("X");
        let json = serde_json::to_string(&record).unwrap();
        let back: DeviceRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);

        let state = serde_json::to_string(&AdapterState::PoweredOff).unwrap();
        assert_eq!(state, "\"powered_off\"");
    }
}
