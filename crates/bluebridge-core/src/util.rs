//! Utility functions for bluebridge-core.

use btleplug::platform::PeripheralId;

use bluebridge_types::DeviceId;

/// Derive the stable [`DeviceId`] for a peripheral.
///
/// On macOS peripheral IDs are CoreBluetooth UUIDs; elsewhere they wrap the
/// MAC address. Either way the debug form carries the useful identifier,
/// which we strip of its wrapper.
pub fn device_id(id: &PeripheralId) -> DeviceId {
    let formatted = format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string();
    DeviceId::new(formatted)
}
