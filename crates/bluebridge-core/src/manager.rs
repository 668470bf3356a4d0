//! The public adapter boundary: awaitable operations plus observable
//! streams over a callback-driven backend.
//!
//! A [`CentralManager`] owns one [`OperationService`] per operation kind
//! and a [`DiscoveryAggregator`], and runs a dispatch task that drains the
//! backend's event channel and routes each event to whichever of those is
//! waiting for it. Callback handlers never block the delivery task beyond
//! the registry's own lock; resolution is a remove-and-send.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use bluebridge_types::{AdapterState, DeviceId, DeviceRecord, OperationKind};

use crate::aggregator::DiscoveryAggregator;
use crate::error::{Error, PreconditionFailure, Result};
use crate::events::{BackendEvent, EventReceiver};
use crate::operation::OperationService;
use crate::traits::{BackendError, CentralBackend};

/// Configuration for a [`CentralManager`].
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// How long to wait for a connect callback.
    pub connect_timeout: Duration,
    /// How long to wait for a disconnect callback.
    pub disconnect_timeout: Duration,
    /// How long to wait for a service-discovery callback.
    pub discover_timeout: Duration,
    /// Per-subscriber buffer size for the published streams.
    pub channel_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            disconnect_timeout: Duration::from_secs(5),
            discover_timeout: Duration::from_secs(5),
            channel_capacity: 32,
        }
    }
}

impl ManagerConfig {
    /// Create a config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the disconnect timeout.
    #[must_use]
    pub fn disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.disconnect_timeout = timeout;
        self
    }

    /// Set the service-discovery timeout.
    #[must_use]
    pub fn discover_timeout(mut self, timeout: Duration) -> Self {
        self.discover_timeout = timeout;
        self
    }

    /// Set the stream buffer capacity.
    #[must_use]
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }
}

/// Awaitable front end over a [`CentralBackend`].
pub struct CentralManager {
    backend: Arc<dyn CentralBackend>,
    aggregator: DiscoveryAggregator,
    connects: OperationService<DeviceRecord>,
    disconnects: OperationService<DeviceRecord>,
    discoveries: OperationService<()>,
    config: ManagerConfig,
    cancel: CancellationToken,
}

impl CentralManager {
    /// Create a manager over `backend`, consuming the matching event
    /// channel receiver, and start the dispatch task.
    ///
    /// The dispatch task runs until [`shutdown`](Self::shutdown) is called
    /// or the backend drops its event sender.
    pub fn new(
        backend: Arc<dyn CentralBackend>,
        events: EventReceiver,
        config: ManagerConfig,
    ) -> Arc<Self> {
        let manager = Arc::new(Self {
            backend,
            aggregator: DiscoveryAggregator::new(config.channel_capacity),
            connects: OperationService::new(OperationKind::Connecting, config.connect_timeout),
            disconnects: OperationService::new(
                OperationKind::Disconnecting,
                config.disconnect_timeout,
            ),
            discoveries: OperationService::new(OperationKind::Discovering, config.discover_timeout),
            config,
            cancel: CancellationToken::new(),
        });
        let _ = manager.spawn_dispatch(events);
        manager
    }

    fn spawn_dispatch(self: &Arc<Self>, mut events: EventReceiver) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let cancel = manager.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("event dispatch cancelled, shutting down");
                        break;
                    }
                    event = events.recv() => match event {
                        Some(event) => manager.handle_event(event).await,
                        None => {
                            info!("backend event channel closed");
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Route one backend event. Pure translation: build an outcome, hand it
    /// to the matching registry, let the absent-key rule discard strays.
    async fn handle_event(&self, event: BackendEvent) {
        match event {
            BackendEvent::AdapterStateChanged(state) => {
                debug!(%state, "adapter state changed");
                self.aggregator.on_adapter_state_changed(state);
            }
            BackendEvent::DeviceDiscovered(record) => {
                self.aggregator.on_discovered(record).await;
            }
            BackendEvent::DeviceConnected(id) => {
                let record = self.record_for(&id).await;
                self.connects.complete(&id, Ok(record)).await;
            }
            BackendEvent::DeviceConnectFailed { id, error } => {
                let outcome = Err(Error::backend(Some(id.clone()), error));
                self.connects.complete(&id, outcome).await;
            }
            BackendEvent::DeviceDisconnected { id, error } => {
                let detail = match &error {
                    Some(error) => format!("device disconnected: {error}"),
                    None => "device disconnected".to_string(),
                };
                match error {
                    None => {
                        let record = self.record_for(&id).await;
                        self.disconnects.complete(&id, Ok(record)).await;
                    }
                    Some(error) => {
                        let outcome = Err(Error::backend(Some(id.clone()), error));
                        self.disconnects.complete(&id, outcome).await;
                    }
                }
                // A drop mid-connect or mid-discovery means those callbacks
                // will never arrive; fail their waiters through the same
                // resolve path so nothing is left pending forever.
                self.connects
                    .complete(
                        &id,
                        Err(Error::backend(
                            Some(id.clone()),
                            BackendError::Stack(detail.clone()),
                        )),
                    )
                    .await;
                self.discoveries
                    .complete(
                        &id,
                        Err(Error::backend(Some(id.clone()), BackendError::Stack(detail))),
                    )
                    .await;
            }
            BackendEvent::ServicesDiscovered { id, error } => {
                let outcome = match error {
                    None => Ok(()),
                    Some(error) => Err(Error::backend(Some(id.clone()), error)),
                };
                self.discoveries.complete(&id, outcome).await;
            }
        }
    }

    /// The discovered record for `id`, or a bare record when the device
    /// was never seen during scanning (e.g. connected by identifier).
    async fn record_for(&self, id: &DeviceId) -> DeviceRecord {
        self.aggregator
            .find(id)
            .await
            .unwrap_or_else(|| DeviceRecord::new(id.clone()))
    }

    async fn device_name(&self, id: &DeviceId) -> Option<String> {
        self.aggregator.find(id).await.and_then(|record| record.name)
    }

    /// Connect to a device, suspending until the stack reports the outcome.
    pub async fn connect(&self, id: &DeviceId) -> Result<DeviceRecord> {
        let name = self.device_name(id).await;
        self.connects
            .perform(id, name.as_deref(), || async {
                self.backend
                    .connect(id)
                    .await
                    .map_err(|e| Error::backend(Some(id.clone()), e))
            })
            .await
    }

    /// Disconnect from a device, suspending until the stack reports the
    /// outcome.
    ///
    /// Fails immediately with
    /// [`PreconditionFailure::NotConnected`] when the stack does not
    /// report the device as connected; there is no point waiting out a
    /// timeout for an operation that cannot succeed.
    pub async fn disconnect(&self, id: &DeviceId) -> Result<DeviceRecord> {
        let name = self.device_name(id).await;
        self.disconnects
            .perform(id, name.as_deref(), || async {
                if !self.connected(id).await? {
                    return Err(Error::precondition_failed(
                        id.clone(),
                        PreconditionFailure::NotConnected,
                    ));
                }
                self.backend
                    .cancel_connection(id)
                    .await
                    .map_err(|e| Error::backend(Some(id.clone()), e))
            })
            .await
    }

    /// Enumerate services on a connected device, suspending until the
    /// stack reports the outcome. Requires an established connection.
    pub async fn discover_services(&self, id: &DeviceId) -> Result<()> {
        let name = self.device_name(id).await;
        self.discoveries
            .perform(id, name.as_deref(), || async {
                if !self.connected(id).await? {
                    return Err(Error::precondition_failed(
                        id.clone(),
                        PreconditionFailure::NotConnected,
                    ));
                }
                self.backend
                    .discover_services(id)
                    .await
                    .map_err(|e| Error::backend(Some(id.clone()), e))
            })
            .await
    }

    async fn connected(&self, id: &DeviceId) -> Result<bool> {
        self.backend
            .is_connected(id)
            .await
            .map_err(|e| Error::backend(Some(id.clone()), e))
    }

    /// Begin scanning for peripherals.
    pub async fn start_scan(&self) -> Result<()> {
        self.backend
            .start_scan()
            .await
            .map_err(|e| Error::backend(None, e))
    }

    /// Stop an in-progress scan.
    pub async fn stop_scan(&self) -> Result<()> {
        self.backend
            .stop_scan()
            .await
            .map_err(|e| Error::backend(None, e))
    }

    /// Stream of adapter-state changes, with the first-`PoweredOff`
    /// suppression rule (see [`DiscoveryAggregator`]).
    pub fn state_stream(&self) -> broadcast::Receiver<AdapterState> {
        self.aggregator.subscribe_state()
    }

    /// Stream of full discovered-device snapshots.
    pub fn devices_stream(&self) -> broadcast::Receiver<Vec<DeviceRecord>> {
        self.aggregator.subscribe_devices()
    }

    /// Snapshot of the discovered-device list.
    pub async fn devices(&self) -> Vec<DeviceRecord> {
        self.aggregator.devices().await
    }

    /// The most recently reported adapter state.
    pub fn adapter_state(&self) -> AdapterState {
        self.aggregator.adapter_state()
    }

    /// The manager configuration.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Total attempts started for the given operation kind (diagnostics).
    pub fn attempts(&self, kind: OperationKind) -> u64 {
        match kind {
            OperationKind::Connecting => self.connects.attempts(),
            OperationKind::Disconnecting => self.disconnects.attempts(),
            OperationKind::Discovering => self.discoveries.attempts(),
            _ => 0,
        }
    }

    /// Stop the dispatch task. Pending operations resolve with
    /// [`Error::Cancelled`] once the manager is dropped.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}
