//! Discovery deduplication and adapter-state fan-out.
//!
//! Two independent flows live here, both fed by the backend's callback
//! surface and both published to any number of subscribers:
//!
//! - an append-only, identifier-deduplicated list of discovered devices,
//!   republished as a full snapshot on every discovery event;
//! - the raw adapter-state stream, with one wrinkle: the very first value
//!   is suppressed iff it is `PoweredOff`, because several platforms report
//!   a default powered-off reading before the real state is known, and
//!   surfacing it causes a spurious "Bluetooth is off" flash downstream.
//!   Every later value, including later `PoweredOff`s, is delivered.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, broadcast, watch};
use tracing::debug;

use bluebridge_types::{AdapterState, DeviceId, DeviceRecord};

/// Deduplicates discovered-device events and fans out adapter-state
/// changes.
pub struct DiscoveryAggregator {
    devices: Mutex<Vec<DeviceRecord>>,
    devices_tx: broadcast::Sender<Vec<DeviceRecord>>,
    state_tx: broadcast::Sender<AdapterState>,
    latest_state: watch::Sender<AdapterState>,
    // Kept so the watch channel stays open with no outside subscribers.
    latest_state_rx: watch::Receiver<AdapterState>,
    saw_first_state: AtomicBool,
}

impl DiscoveryAggregator {
    /// Create an aggregator whose streams buffer `capacity` values per
    /// subscriber.
    pub fn new(capacity: usize) -> Self {
        let (devices_tx, _) = broadcast::channel(capacity);
        let (state_tx, _) = broadcast::channel(capacity);
        let (latest_state, latest_state_rx) = watch::channel(AdapterState::Unknown);
        Self {
            devices: Mutex::new(Vec::new()),
            devices_tx,
            state_tx,
            latest_state,
            latest_state_rx,
            saw_first_state: AtomicBool::new(false),
        }
    }

    /// Record a discovery event.
    ///
    /// The record is appended only if no known device shares its
    /// identifier; insertion order is preserved and is the order
    /// subscribers observe. The full current list is republished either
    /// way; a redundant snapshot is cheaper than making subscribers
    /// reason about diffs.
    pub async fn on_discovered(&self, record: DeviceRecord) {
        let devices = {
            let mut devices = self.devices.lock().await;
            if !devices.iter().any(|known| known.id == record.id) {
                debug!(device = %record.id, name = record.display_name(), "discovered device");
                devices.push(record);
            }
            devices.clone()
        };
        let _ = self.devices_tx.send(devices);
    }

    /// Record an adapter-state change.
    ///
    /// The latest-value cell is written unconditionally; the stream
    /// applies the first-`PoweredOff` suppression rule.
    pub fn on_adapter_state_changed(&self, state: AdapterState) {
        self.latest_state.send_replace(state);

        let first = !self.saw_first_state.swap(true, Ordering::AcqRel);
        if first && state == AdapterState::PoweredOff {
            debug!("suppressing initial powered-off adapter state");
            return;
        }
        let _ = self.state_tx.send(state);
    }

    /// Subscribe to full-snapshot device list updates.
    pub fn subscribe_devices(&self) -> broadcast::Receiver<Vec<DeviceRecord>> {
        self.devices_tx.subscribe()
    }

    /// Subscribe to adapter-state changes.
    pub fn subscribe_state(&self) -> broadcast::Receiver<AdapterState> {
        self.state_tx.subscribe()
    }

    /// Snapshot of the discovered-device list.
    pub async fn devices(&self) -> Vec<DeviceRecord> {
        self.devices.lock().await.clone()
    }

    /// Look up a discovered device by identifier.
    pub async fn find(&self, id: &DeviceId) -> Option<DeviceRecord> {
        self.devices
            .lock()
            .await
            .iter()
            .find(|record| &record.id == id)
            .cloned()
    }

    /// The most recently reported adapter state (`Unknown` before the
    /// first callback).
    pub fn adapter_state(&self) -> AdapterState {
        *self.latest_state_rx.borrow()
    }
}

impl Default for DiscoveryAggregator {
    fn default() -> Self {
        Self::new(32)
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;

    fn record(id: &str) -> DeviceRecord {
        DeviceRecord::new(DeviceId::new(id))
    }

    #[tokio::test]
    async fn test_discovery_dedup_preserves_first_seen_order() {
        let aggregator = DiscoveryAggregator::default();

        aggregator.on_discovered(record("a")).await;
        aggregator.on_discovered(record("b")).await;
        aggregator.on_discovered(record("a")).await;
        aggregator.on_discovered(record("c")).await;

        let devices = aggregator.devices().await;
        let ids: Vec<_> = devices.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_discovery_republishes_even_without_change() {
        let aggregator = DiscoveryAggregator::default();
        let mut rx = aggregator.subscribe_devices();

        aggregator.on_discovered(record("a")).await;
        aggregator.on_discovered(record("a")).await;

        assert_eq!(rx.recv().await.unwrap().len(), 1);
        // The duplicate still produced a (redundant) snapshot.
        assert_eq!(rx.recv().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_find_returns_discovered_record() {
        let aggregator = DiscoveryAggregator::default();
        aggregator
            .on_discovered(record("a").with_name("Sensor"))
            .await;

        let found = aggregator.find(&DeviceId::new("a")).await.unwrap();
        assert_eq!(found.name.as_deref(), Some("Sensor"));
        assert!(aggregator.find(&DeviceId::new("z")).await.is_none());
    }

    #[tokio::test]
    async fn test_first_powered_off_is_suppressed() {
        let aggregator = DiscoveryAggregator::default();
        let mut rx = aggregator.subscribe_state();

        aggregator.on_adapter_state_changed(AdapterState::PoweredOff);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        // The cell still tracks the suppressed value.
        assert_eq!(aggregator.adapter_state(), AdapterState::PoweredOff);

        aggregator.on_adapter_state_changed(AdapterState::PoweredOn);
        assert_eq!(rx.try_recv().unwrap(), AdapterState::PoweredOn);

        // A later powered-off is delivered normally.
        aggregator.on_adapter_state_changed(AdapterState::PoweredOff);
        assert_eq!(rx.try_recv().unwrap(), AdapterState::PoweredOff);
    }

    #[tokio::test]
    async fn test_first_powered_on_is_delivered() {
        let aggregator = DiscoveryAggregator::default();
        let mut rx = aggregator.subscribe_state();

        aggregator.on_adapter_state_changed(AdapterState::PoweredOn);
        assert_eq!(rx.try_recv().unwrap(), AdapterState::PoweredOn);

        // Suppression was a one-shot chance; nothing else is ever dropped.
        aggregator.on_adapter_state_changed(AdapterState::PoweredOff);
        assert_eq!(rx.try_recv().unwrap(), AdapterState::PoweredOff);
    }

    #[tokio::test]
    async fn test_adapter_state_cell_defaults_to_unknown() {
        let aggregator = DiscoveryAggregator::default();
        assert_eq!(aggregator.adapter_state(), AdapterState::Unknown);
    }
}
