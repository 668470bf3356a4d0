//! Mock backend implementation for testing.
//!
//! [`MockBackend`] implements [`CentralBackend`] without touching any
//! hardware. Tests drive the callback surface by hand through the `emit_*`
//! helpers, inspect which triggers were invoked through
//! [`calls`](MockBackend::calls), and inject trigger failures with
//! [`set_should_fail`](MockBackend::set_should_fail).
//!
//! The `emit_*` helpers only fire events; the connected-device set that
//! backs [`is_connected`](CentralBackend::is_connected) is controlled
//! separately via [`set_connected`](MockBackend::set_connected), so tests
//! can stage inconsistent views deliberately (e.g. a disconnect callback
//! for a device the stack never reported connected).

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use bluebridge_types::{AdapterState, DeviceId, DeviceRecord};

use crate::events::{BackendEvent, EventReceiver, EventSender, event_channel};
use crate::traits::{BackendError, BackendResult, CentralBackend};

/// A trigger invocation recorded by the mock, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    /// `start_scan` was invoked.
    StartScan,
    /// `stop_scan` was invoked.
    StopScan,
    /// `connect` was invoked for the device.
    Connect(DeviceId),
    /// `cancel_connection` was invoked for the device.
    CancelConnection(DeviceId),
    /// `discover_services` was invoked for the device.
    DiscoverServices(DeviceId),
}

/// A scriptable [`CentralBackend`] for tests.
pub struct MockBackend {
    events: EventSender,
    calls: Mutex<Vec<MockCall>>,
    connected: Mutex<HashSet<DeviceId>>,
    should_fail: AtomicBool,
}

impl MockBackend {
    /// Create a mock backend and the event receiver to hand to
    /// [`CentralManager::new`](crate::manager::CentralManager::new).
    pub fn new() -> (Arc<Self>, EventReceiver) {
        let (tx, rx) = event_channel();
        (
            Arc::new(Self {
                events: tx,
                calls: Mutex::new(Vec::new()),
                connected: Mutex::new(HashSet::new()),
                should_fail: AtomicBool::new(false),
            }),
            rx,
        )
    }

    /// Make subsequent triggers fail their submission.
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }

    /// Set whether `is_connected` reports the device as connected.
    pub async fn set_connected(&self, id: &DeviceId, connected: bool) {
        let mut set = self.connected.lock().await;
        if connected {
            set.insert(id.clone());
        } else {
            set.remove(id);
        }
    }

    /// The triggers invoked so far, in order.
    pub async fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().await.clone()
    }

    async fn record(&self, call: MockCall) {
        self.calls.lock().await.push(call);
    }

    fn maybe_fail(&self) -> BackendResult<()> {
        if self.should_fail.load(Ordering::Relaxed) {
            Err(BackendError::Stack("mock backend failure".into()))
        } else {
            Ok(())
        }
    }

    // --- Callback surface ---

    /// Fire an adapter-state-changed callback.
    pub fn emit_adapter_state(&self, state: AdapterState) {
        let _ = self.events.send(BackendEvent::AdapterStateChanged(state));
    }

    /// Fire a device-discovered callback.
    pub fn emit_discovered(&self, record: DeviceRecord) {
        let _ = self.events.send(BackendEvent::DeviceDiscovered(record));
    }

    /// Fire a device-connected callback.
    pub fn emit_connected(&self, id: &DeviceId) {
        let _ = self
            .events
            .send(BackendEvent::DeviceConnected(id.clone()));
    }

    /// Fire a device-failed-to-connect callback.
    pub fn emit_connect_failed(&self, id: &DeviceId, message: &str) {
        let _ = self.events.send(BackendEvent::DeviceConnectFailed {
            id: id.clone(),
            error: BackendError::Stack(message.to_string()),
        });
    }

    /// Fire a clean device-disconnected callback.
    pub fn emit_disconnected(&self, id: &DeviceId) {
        let _ = self.events.send(BackendEvent::DeviceDisconnected {
            id: id.clone(),
            error: None,
        });
    }

    /// Fire an errored device-disconnected callback.
    pub fn emit_disconnected_with_error(&self, id: &DeviceId, message: &str) {
        let _ = self.events.send(BackendEvent::DeviceDisconnected {
            id: id.clone(),
            error: Some(BackendError::Stack(message.to_string())),
        });
    }

    /// Fire a successful services-discovered callback.
    pub fn emit_services_discovered(&self, id: &DeviceId) {
        let _ = self.events.send(BackendEvent::ServicesDiscovered {
            id: id.clone(),
            error: None,
        });
    }

    /// Fire a failed services-discovered callback.
    pub fn emit_services_discovery_failed(&self, id: &DeviceId, message: &str) {
        let _ = self.events.send(BackendEvent::ServicesDiscovered {
            id: id.clone(),
            error: Some(BackendError::Stack(message.to_string())),
        });
    }
}

#[async_trait]
impl CentralBackend for MockBackend {
    async fn start_scan(&self) -> BackendResult<()> {
        self.record(MockCall::StartScan).await;
        self.maybe_fail()
    }

    async fn stop_scan(&self) -> BackendResult<()> {
        self.record(MockCall::StopScan).await;
        self.maybe_fail()
    }

    async fn connect(&self, id: &DeviceId) -> BackendResult<()> {
        self.record(MockCall::Connect(id.clone())).await;
        self.maybe_fail()
    }

    async fn cancel_connection(&self, id: &DeviceId) -> BackendResult<()> {
        self.record(MockCall::CancelConnection(id.clone())).await;
        self.maybe_fail()
    }

    async fn discover_services(&self, id: &DeviceId) -> BackendResult<()> {
        self.record(MockCall::DiscoverServices(id.clone())).await;
        self.maybe_fail()
    }

    async fn is_connected(&self, id: &DeviceId) -> BackendResult<bool> {
        Ok(self.connected.lock().await.contains(id))
    }
}
