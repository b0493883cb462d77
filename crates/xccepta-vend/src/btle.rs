//! [`BleLink`] over the platform Bluetooth LE stack.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{Result, VendError};
use crate::event::NotificationSink;
use crate::link::{Advertisement, BleLink};

/// Link backed by the first Bluetooth adapter on the host.
///
/// The adapter is opened lazily on the first scan, from the session thread.
#[derive(Default)]
pub struct BtleplugLink {
    adapter: Option<Adapter>,
    seen: HashMap<String, Peripheral>,
    connected: Option<Peripheral>,
    /// Forwards notifications for the current connection only.
    notifier: Option<JoinHandle<()>>,
}

impl BtleplugLink {
    pub fn new() -> Self {
        Self::default()
    }

    async fn adapter(&mut self) -> Result<&Adapter> {
        if self.adapter.is_none() {
            let manager = Manager::new().await.map_err(adapter_err)?;
            let adapter = manager
                .adapters()
                .await
                .map_err(adapter_err)?
                .into_iter()
                .next()
                .ok_or_else(|| VendError::Adapter("no Bluetooth adapter".into()))?;
            self.adapter = Some(adapter);
        }
        self.adapter
            .as_ref()
            .ok_or_else(|| VendError::Adapter("no Bluetooth adapter".into()))
    }

    fn stop_notifier(&mut self) {
        if let Some(task) = self.notifier.take() {
            task.abort();
        }
    }

    fn peripheral(&self) -> Result<&Peripheral> {
        self.connected.as_ref().ok_or(VendError::NotConnected)
    }

    fn characteristic(&self, uuid: Uuid) -> Result<Characteristic> {
        self.peripheral()?
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or(VendError::CharacteristicMissing(uuid))
    }
}

fn adapter_err(e: btleplug::Error) -> VendError {
    VendError::Adapter(e.to_string())
}

#[async_trait]
impl BleLink for BtleplugLink {
    async fn discover(&mut self, window: Duration) -> Result<Vec<Advertisement>> {
        let adapter = self.adapter().await?.clone();
        adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(adapter_err)?;
        tokio::time::sleep(window).await;
        let peripherals = adapter.peripherals().await.map_err(adapter_err)?;
        let _ = adapter.stop_scan().await;

        let mut found = Vec::with_capacity(peripherals.len());
        for peripheral in peripherals {
            let name = peripheral
                .properties()
                .await
                .ok()
                .flatten()
                .and_then(|p| p.local_name);
            let id = format!("{:?}", peripheral.id());
            found.push(Advertisement {
                id: id.clone(),
                name,
            });
            self.seen.insert(id, peripheral);
        }
        Ok(found)
    }

    async fn connect(&mut self, device_id: &str) -> Result<()> {
        let peripheral = self
            .seen
            .get(device_id)
            .cloned()
            .ok_or_else(|| VendError::Connect(format!("unknown device {}", device_id)))?;
        peripheral
            .connect()
            .await
            .map_err(|e| VendError::Connect(e.to_string()))?;
        peripheral
            .discover_services()
            .await
            .map_err(|e| VendError::Connect(e.to_string()))?;
        self.connected = Some(peripheral);
        Ok(())
    }

    async fn subscribe(&mut self, characteristic: Uuid, sink: NotificationSink) -> Result<()> {
        self.stop_notifier();
        let target = self.characteristic(characteristic)?;
        let peripheral = self.peripheral()?.clone();
        peripheral
            .subscribe(&target)
            .await
            .map_err(|e| VendError::Connect(e.to_string()))?;
        let mut notifications = peripheral
            .notifications()
            .await
            .map_err(|e| VendError::Connect(e.to_string()))?;

        self.notifier = Some(tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid == characteristic {
                    sink.telemetry(&notification.value);
                }
            }
            sink.disconnected();
        }));
        Ok(())
    }

    async fn write(&mut self, characteristic: Uuid, data: &[u8]) -> Result<()> {
        let target = self.characteristic(characteristic)?;
        self.peripheral()?
            .write(&target, data, WriteType::WithResponse)
            .await
            .map_err(|e| VendError::Write(e.to_string()))
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.stop_notifier();
        if let Some(peripheral) = self.connected.take() {
            peripheral
                .disconnect()
                .await
                .map_err(|e| VendError::Adapter(e.to_string()))?;
        }
        Ok(())
    }
}
