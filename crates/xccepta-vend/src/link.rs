//! Transport abstraction for the vend session.
//!
//! A link owns the platform's radio state and performs one operation at a
//! time on behalf of the session loop. Implementations may use a platform
//! BLE stack, a serial bridge, or an in-memory fake.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::event::NotificationSink;

/// A device seen during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    /// Platform address or identifier, opaque to the session.
    pub id: String,
    pub name: Option<String>,
}

/// Wireless link to vending hardware.
///
/// Runs entirely on the session thread, so it need not be `Sync`.
#[async_trait]
pub trait BleLink: Send + 'static {
    /// One discovery round lasting about `window`.
    async fn discover(&mut self, window: Duration) -> Result<Vec<Advertisement>>;

    /// Establish a session with a discovered device.
    async fn connect(&mut self, device_id: &str) -> Result<()>;

    /// Start delivering notifications from `characteristic` to `sink`.
    async fn subscribe(&mut self, characteristic: Uuid, sink: NotificationSink) -> Result<()>;

    /// Write with response: returns once the device acknowledged the bytes.
    async fn write(&mut self, characteristic: Uuid, data: &[u8]) -> Result<()>;

    async fn disconnect(&mut self) -> Result<()>;
}

/// An in-memory link for testing.
///
/// The test keeps a [`MemoryDevice`] to script the hardware side.
pub mod memory {
    use super::*;
    use std::sync::{Arc, Mutex};

    use crate::error::VendError;

    #[derive(Default)]
    struct DeviceState {
        advertised: Vec<Advertisement>,
        connected: Option<String>,
        characteristics: Vec<Uuid>,
        written: Vec<(Uuid, Vec<u8>)>,
        write_failure: Option<String>,
        connect_failure: Option<String>,
        sink: Option<NotificationSink>,
        discover_rounds: usize,
        stall_subscribe: bool,
        late_loss: Option<Duration>,
    }

    /// Test-side handle to the fake hardware.
    #[derive(Clone, Default)]
    pub struct MemoryDevice {
        state: Arc<Mutex<DeviceState>>,
    }

    impl MemoryDevice {
        fn with<T>(&self, f: impl FnOnce(&mut DeviceState) -> T) -> T {
            let mut guard = match self.state.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            f(&mut guard)
        }

        /// Start advertising under `name`.
        pub fn advertise(&self, id: &str, name: &str) {
            self.with(|s| {
                s.advertised.push(Advertisement {
                    id: id.to_string(),
                    name: Some(name.to_string()),
                })
            });
        }

        /// Characteristics the device exposes once connected.
        pub fn expose(&self, characteristics: &[Uuid]) {
            self.with(|s| s.characteristics = characteristics.to_vec());
        }

        pub fn fail_writes(&self, reason: Option<&str>) {
            self.with(|s| s.write_failure = reason.map(str::to_string));
        }

        pub fn fail_connect(&self, reason: Option<&str>) {
            self.with(|s| s.connect_failure = reason.map(str::to_string));
        }

        /// Make `subscribe` never complete.
        pub fn stall_subscribe(&self, stall: bool) {
            self.with(|s| s.stall_subscribe = stall);
        }

        /// After a local disconnect, report the loss through the old sink
        /// once `delay` has passed, as a platform stack may.
        pub fn report_loss_late(&self, delay: Option<Duration>) {
            self.with(|s| s.late_loss = delay);
        }

        /// Everything written to the device, in order.
        pub fn written(&self) -> Vec<(Uuid, Vec<u8>)> {
            self.with(|s| s.written.clone())
        }

        pub fn is_connected(&self) -> bool {
            self.with(|s| s.connected.is_some())
        }

        pub fn discover_rounds(&self) -> usize {
            self.with(|s| s.discover_rounds)
        }

        /// Send a notification as the hardware would.
        pub fn notify(&self, text: &str) {
            if let Some(sink) = self.with(|s| s.sink.clone()) {
                sink.telemetry(text.as_bytes());
            }
        }

        /// Drop the link from the device side.
        pub fn drop_link(&self) {
            let sink = self.with(|s| {
                s.connected = None;
                s.sink.take()
            });
            if let Some(sink) = sink {
                sink.disconnected();
            }
        }
    }

    /// Link half of the fake, owned by the session thread.
    pub struct MemoryLink {
        device: MemoryDevice,
    }

    impl MemoryLink {
        pub fn new() -> (Self, MemoryDevice) {
            let device = MemoryDevice::default();
            (
                Self {
                    device: device.clone(),
                },
                device,
            )
        }
    }

    #[async_trait]
    impl BleLink for MemoryLink {
        async fn discover(&mut self, window: Duration) -> Result<Vec<Advertisement>> {
            tokio::time::sleep(window).await;
            Ok(self.device.with(|s| {
                s.discover_rounds += 1;
                s.advertised.clone()
            }))
        }

        async fn connect(&mut self, device_id: &str) -> Result<()> {
            self.device.with(|s| {
                if let Some(reason) = &s.connect_failure {
                    return Err(VendError::Connect(reason.clone()));
                }
                if !s.advertised.iter().any(|a| a.id == device_id) {
                    return Err(VendError::Connect(format!("unknown device {}", device_id)));
                }
                s.connected = Some(device_id.to_string());
                Ok(())
            })
        }

        async fn subscribe(&mut self, characteristic: Uuid, sink: NotificationSink) -> Result<()> {
            if self.device.with(|s| s.stall_subscribe) {
                std::future::pending::<()>().await;
            }
            self.device.with(|s| {
                if !s.characteristics.contains(&characteristic) {
                    return Err(VendError::CharacteristicMissing(characteristic));
                }
                s.sink = Some(sink);
                Ok(())
            })
        }

        async fn write(&mut self, characteristic: Uuid, data: &[u8]) -> Result<()> {
            self.device.with(|s| {
                if s.connected.is_none() {
                    return Err(VendError::Disconnected);
                }
                if !s.characteristics.contains(&characteristic) {
                    return Err(VendError::CharacteristicMissing(characteristic));
                }
                if let Some(reason) = &s.write_failure {
                    return Err(VendError::Write(reason.clone()));
                }
                s.written.push((characteristic, data.to_vec()));
                Ok(())
            })
        }

        async fn disconnect(&mut self) -> Result<()> {
            let (sink, late_loss) = self.device.with(|s| {
                s.connected = None;
                (s.sink.take(), s.late_loss)
            });
            if let (Some(sink), Some(delay)) = (sink, late_loss) {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    sink.disconnected();
                });
            }
            Ok(())
        }
    }
}
