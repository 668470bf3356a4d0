//! btleplug-backed implementation of [`CentralBackend`].
//!
//! This is the production collaborator: it owns the first available
//! platform adapter, pumps btleplug's central event stream into
//! [`BackendEvent`]s, and keeps a `DeviceId → Peripheral` cache (fed by the
//! pump) so triggers can reach the platform object for an identifier.
//!
//! Triggers that involve radio round-trips (`connect`, `cancel_connection`,
//! `discover_services`) are spawned; a failed attempt is routed back as the
//! matching failure event rather than through the trigger's return value,
//! exactly like a failure reported by the platform's own callbacks.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CentralState, Manager as _, Peripheral as _, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::{Stream, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use bluebridge_types::{AdapterState, DeviceId, DeviceRecord};

use crate::events::{BackendEvent, EventReceiver, EventSender, event_channel};
use crate::traits::{BackendError, BackendResult, CentralBackend};
use crate::util::device_id;

type CentralEventStream = Pin<Box<dyn Stream<Item = CentralEvent> + Send>>;
type PeripheralCache = Arc<Mutex<HashMap<DeviceId, Peripheral>>>;

/// [`CentralBackend`] over the first available btleplug adapter.
pub struct BtleplugBackend {
    adapter: Adapter,
    peripherals: PeripheralCache,
    events: EventSender,
}

impl BtleplugBackend {
    /// Acquire the first available adapter and start the event pump.
    ///
    /// Returns the backend together with the receiver to hand to
    /// [`CentralManager::new`](crate::manager::CentralManager::new).
    pub async fn new() -> BackendResult<(Arc<Self>, EventReceiver)> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(BackendError::NoAdapter)?;

        let (tx, rx) = event_channel();
        let peripherals: PeripheralCache = Arc::new(Mutex::new(HashMap::new()));

        let stream = adapter.events().await?;
        tokio::spawn(Self::pump(
            stream,
            adapter.clone(),
            Arc::clone(&peripherals),
            tx.clone(),
        ));

        Ok((
            Arc::new(Self {
                adapter,
                peripherals,
                events: tx,
            }),
            rx,
        ))
    }

    /// Translate btleplug central events into [`BackendEvent`]s until the
    /// platform stream ends.
    async fn pump(
        mut stream: CentralEventStream,
        adapter: Adapter,
        peripherals: PeripheralCache,
        tx: EventSender,
    ) {
        while let Some(event) = stream.next().await {
            match event {
                CentralEvent::StateUpdate(state) => {
                    let _ = tx.send(BackendEvent::AdapterStateChanged(map_state(state)));
                }
                CentralEvent::DeviceDiscovered(pid) => {
                    match Self::record_for(&adapter, &pid).await {
                        Ok((id, peripheral, record)) => {
                            peripherals.lock().await.insert(id, peripheral);
                            let _ = tx.send(BackendEvent::DeviceDiscovered(record));
                        }
                        Err(e) => {
                            debug!("failed to read discovered peripheral: {e}");
                        }
                    }
                }
                CentralEvent::DeviceConnected(pid) => {
                    let _ = tx.send(BackendEvent::DeviceConnected(device_id(&pid)));
                }
                CentralEvent::DeviceDisconnected(pid) => {
                    let _ = tx.send(BackendEvent::DeviceDisconnected {
                        id: device_id(&pid),
                        error: None,
                    });
                }
                _ => {}
            }
        }
        debug!("adapter event stream ended");
    }

    async fn record_for(
        adapter: &Adapter,
        pid: &PeripheralId,
    ) -> BackendResult<(DeviceId, Peripheral, DeviceRecord)> {
        let peripheral = adapter.peripheral(pid).await?;
        let id = device_id(pid);
        let mut record = DeviceRecord::new(id.clone());
        if let Ok(Some(properties)) = peripheral.properties().await {
            if let Some(name) = properties.local_name {
                record = record.with_name(name);
            }
            if let Some(rssi) = properties.rssi {
                record = record.with_rssi(rssi);
            }
        }
        Ok((id, peripheral, record))
    }

    async fn peripheral(&self, id: &DeviceId) -> BackendResult<Peripheral> {
        self.peripherals
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| BackendError::UnknownPeripheral(id.clone()))
    }
}

#[async_trait]
impl CentralBackend for BtleplugBackend {
    async fn start_scan(&self) -> BackendResult<()> {
        self.adapter.start_scan(ScanFilter::default()).await?;
        Ok(())
    }

    async fn stop_scan(&self) -> BackendResult<()> {
        self.adapter.stop_scan().await?;
        Ok(())
    }

    async fn connect(&self, id: &DeviceId) -> BackendResult<()> {
        let peripheral = self.peripheral(id).await?;
        let events = self.events.clone();
        let id = id.clone();
        tokio::spawn(async move {
            // Success surfaces as the central DeviceConnected event; only
            // the failure needs synthesizing.
            if let Err(e) = peripheral.connect().await {
                warn!(device = %id, "connect attempt failed: {e}");
                let _ = events.send(BackendEvent::DeviceConnectFailed {
                    id,
                    error: e.into(),
                });
            }
        });
        Ok(())
    }

    async fn cancel_connection(&self, id: &DeviceId) -> BackendResult<()> {
        let peripheral = self.peripheral(id).await?;
        let events = self.events.clone();
        let id = id.clone();
        tokio::spawn(async move {
            if let Err(e) = peripheral.disconnect().await {
                warn!(device = %id, "disconnect attempt failed: {e}");
                let _ = events.send(BackendEvent::DeviceDisconnected {
                    id,
                    error: Some(e.into()),
                });
            }
        });
        Ok(())
    }

    async fn discover_services(&self, id: &DeviceId) -> BackendResult<()> {
        let peripheral = self.peripheral(id).await?;
        let events = self.events.clone();
        let id = id.clone();
        tokio::spawn(async move {
            let error = peripheral
                .discover_services()
                .await
                .err()
                .map(BackendError::from);
            let _ = events.send(BackendEvent::ServicesDiscovered { id, error });
        });
        Ok(())
    }

    async fn is_connected(&self, id: &DeviceId) -> BackendResult<bool> {
        let peripheral = self.peripheral(id).await?;
        Ok(peripheral.is_connected().await?)
    }
}

fn map_state(state: CentralState) -> AdapterState {
    match state {
        CentralState::PoweredOn => AdapterState::PoweredOn,
        CentralState::PoweredOff => AdapterState::PoweredOff,
        _ => AdapterState::Unknown,
    }
}
