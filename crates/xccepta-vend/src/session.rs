//! The vend session: `Idle -> Scanning -> Connected -> (Sending | Idle)`.
//!
//! All radio I/O runs on one dedicated thread driving a single-threaded
//! tokio runtime. [`VendSession`] is a cheap handle: each operation is
//! queued immediately and answered through a [`Pending`] future.
//!
//! The session never retries. Any transport error is reported once and the
//! session returns to `Idle`.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{timeout, Instant};
use uuid::Uuid;

use xccepta_core::VendCommand;

use crate::error::{Result, VendError};
use crate::event::{NotificationSink, VendEvent};
use crate::link::BleLink;

/// Name the vending controller advertises.
pub const DEFAULT_NAME_HINT: &str = "ESP32_BLE_SERVER";

/// Characteristic the controller sends status notifications on.
pub const DEFAULT_NOTIFY_UUID: Uuid = Uuid::from_u128(0x12345678_1234_5678_1234_56789abcdef0);

/// Characteristic that accepts vend commands.
pub const DEFAULT_COMMAND_UUID: Uuid = Uuid::from_u128(0x12345678_1234_5678_1234_56789abcdef1);

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendState {
    Idle,
    Scanning,
    Connected,
    Sending,
}

#[derive(Debug, Clone)]
pub struct VendSessionConfig {
    pub name_hint: String,
    pub notify_uuid: Uuid,
    pub command_uuid: Uuid,
    /// Total time to look for the device.
    pub scan_timeout: Duration,
    /// Length of one discovery round within the scan.
    pub discover_window: Duration,
    /// Bounds the connect and the notification subscribe separately.
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
    /// Capacity of the event channel returned by [`VendSession::spawn`].
    pub notification_buffer: usize,
}

impl Default for VendSessionConfig {
    fn default() -> Self {
        Self {
            name_hint: DEFAULT_NAME_HINT.to_string(),
            notify_uuid: DEFAULT_NOTIFY_UUID,
            command_uuid: DEFAULT_COMMAND_UUID,
            scan_timeout: Duration::from_secs(10),
            discover_window: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(15),
            write_timeout: Duration::from_secs(5),
            notification_buffer: 64,
        }
    }
}

/// The device a session is connected to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedDevice {
    pub id: String,
    pub name: String,
}

enum Request {
    Connect {
        respond_to: oneshot::Sender<Result<ConnectedDevice>>,
    },
    Send {
        command: VendCommand,
        respond_to: oneshot::Sender<Result<()>>,
    },
    Disconnect {
        respond_to: oneshot::Sender<Result<()>>,
    },
}

/// An operation queued on the session thread.
///
/// Dropping it does not cancel a write already handed to the link; a scan in
/// progress stops at the end of its current discovery round.
#[must_use = "the operation result is only observable by awaiting it"]
pub struct Pending<T> {
    inner: std::result::Result<oneshot::Receiver<Result<T>>, Option<VendError>>,
}

impl<T> Future for Pending<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.inner {
            Ok(rx) => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                Poll::Ready(Err(_)) => Poll::Ready(Err(VendError::SessionClosed)),
                Poll::Pending => Poll::Pending,
            },
            Err(e) => Poll::Ready(Err(e.take().unwrap_or(VendError::SessionClosed))),
        }
    }
}

/// Handle to a running vend session.
#[derive(Clone)]
pub struct VendSession {
    requests: mpsc::UnboundedSender<Request>,
    state: watch::Receiver<VendState>,
}

impl VendSession {
    /// Start the session thread over `link`.
    ///
    /// Returns the handle and the receiving end of the device event channel.
    pub fn spawn<L: BleLink>(
        link: L,
        config: VendSessionConfig,
    ) -> Result<(Self, mpsc::Receiver<VendEvent>)> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| VendError::Spawn(e.to_string()))?;

        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::channel(config.notification_buffer.max(1));
        let (lost_tx, lost_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(VendState::Idle);

        let actor = SessionActor {
            link,
            config,
            state: state_tx,
            sink: NotificationSink::new(events_tx, lost_tx),
            device: None,
            epoch: 0,
        };

        std::thread::Builder::new()
            .name("vend-session".into())
            .spawn(move || runtime.block_on(actor.run(requests_rx, lost_rx)))
            .map_err(|e| VendError::Spawn(e.to_string()))?;

        Ok((
            Self {
                requests: requests_tx,
                state: state_rx,
            },
            events_rx,
        ))
    }

    pub fn state(&self) -> VendState {
        *self.state.borrow()
    }

    /// Scan for the configured device and connect to it.
    pub fn connect(&self) -> Pending<ConnectedDevice> {
        self.submit(|respond_to| Request::Connect { respond_to })
    }

    /// Write one vend command and wait for the transport acknowledgement.
    pub fn send(&self, command: VendCommand) -> Pending<()> {
        self.submit(|respond_to| Request::Send {
            command,
            respond_to,
        })
    }

    pub fn disconnect(&self) -> Pending<()> {
        self.submit(|respond_to| Request::Disconnect { respond_to })
    }

    fn submit<T>(&self, make: impl FnOnce(oneshot::Sender<Result<T>>) -> Request) -> Pending<T> {
        let (tx, rx) = oneshot::channel();
        let inner = match self.requests.send(make(tx)) {
            Ok(()) => Ok(rx),
            Err(_) => Err(Some(VendError::SessionClosed)),
        };
        Pending { inner }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session thread
// ─────────────────────────────────────────────────────────────────────────────

struct SessionActor<L> {
    link: L,
    config: VendSessionConfig,
    state: watch::Sender<VendState>,
    sink: NotificationSink,
    device: Option<ConnectedDevice>,
    /// Bumped each time a link is established.
    epoch: u64,
}

impl<L: BleLink> SessionActor<L> {
    async fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<Request>,
        mut lost: mpsc::UnboundedReceiver<u64>,
    ) {
        loop {
            // A lost link is observed before any request queued after it.
            tokio::select! {
                biased;
                Some(epoch) = lost.recv() => self.link_lost(epoch),
                request = requests.recv() => match request {
                    Some(request) => self.handle(request).await,
                    None => break,
                },
            }
        }
        if self.device.is_some() {
            let _ = self.link.disconnect().await;
        }
        tracing::debug!("vend session stopped");
    }

    async fn handle(&mut self, request: Request) {
        match request {
            Request::Connect { respond_to } => {
                let result = self.connect(&respond_to).await;
                let _ = respond_to.send(result);
            }
            Request::Send {
                command,
                respond_to,
            } => {
                let result = self.send(&command).await;
                let _ = respond_to.send(result);
            }
            Request::Disconnect { respond_to } => {
                let result = self.disconnect().await;
                let _ = respond_to.send(result);
            }
        }
    }

    fn set_state(&self, state: VendState) {
        self.state.send_replace(state);
    }

    fn link_lost(&mut self, epoch: u64) {
        if epoch != self.epoch || self.device.is_none() {
            tracing::debug!(epoch, current = self.epoch, "ignoring loss of a closed link");
            return;
        }
        self.device = None;
        tracing::warn!("vend link lost");
        self.sink.push(VendEvent::Disconnected);
        self.set_state(VendState::Idle);
    }

    async fn connect(
        &mut self,
        caller: &oneshot::Sender<Result<ConnectedDevice>>,
    ) -> Result<ConnectedDevice> {
        if let Some(device) = &self.device {
            return Ok(device.clone());
        }

        self.set_state(VendState::Scanning);
        let result = self.scan_and_connect(caller).await;
        match &result {
            Ok(device) => {
                tracing::info!(device = %device.id, name = %device.name, "vend session connected");
                self.device = Some(device.clone());
                self.set_state(VendState::Connected);
            }
            Err(e) => {
                tracing::warn!(error = %e, "vend connect failed");
                let _ = self.link.disconnect().await;
                self.set_state(VendState::Idle);
            }
        }
        result
    }

    async fn scan_and_connect(
        &mut self,
        caller: &oneshot::Sender<Result<ConnectedDevice>>,
    ) -> Result<ConnectedDevice> {
        let hint = self.config.name_hint.clone();
        let deadline = Instant::now() + self.config.scan_timeout;
        tracing::debug!(name_hint = %hint, timeout = ?self.config.scan_timeout, "scanning");

        let target = loop {
            let now = Instant::now();
            if now >= deadline || caller.is_closed() {
                return Err(VendError::NotFound { name_hint: hint });
            }
            let window = self.config.discover_window.min(deadline - now);
            let found = self.link.discover(window).await?;
            if let Some(hit) = found
                .into_iter()
                .find(|a| a.name.as_deref() == Some(hint.as_str()))
            {
                break hit;
            }
        };

        timeout(self.config.connect_timeout, self.link.connect(&target.id))
            .await
            .map_err(|_| VendError::Timeout("connect"))??;

        self.epoch += 1;
        let sink = self.sink.for_connection(self.epoch);
        match timeout(
            self.config.connect_timeout,
            self.link.subscribe(self.config.notify_uuid, sink),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "notifications unavailable, continuing without telemetry");
            }
            Err(_) => {
                tracing::warn!("notification subscribe timed out, continuing without telemetry");
            }
        }

        Ok(ConnectedDevice {
            id: target.id,
            name: target.name.unwrap_or(hint),
        })
    }

    async fn send(&mut self, command: &VendCommand) -> Result<()> {
        if self.device.is_none() {
            return Err(VendError::NotConnected);
        }
        let payload = command
            .to_bytes()
            .map_err(|e| VendError::Encode(e.to_string()))?;

        self.set_state(VendState::Sending);
        let written = timeout(
            self.config.write_timeout,
            self.link.write(self.config.command_uuid, &payload),
        )
        .await
        .map_err(|_| VendError::Timeout("write"))
        .and_then(|r| r);

        match written {
            Ok(()) => {
                tracing::info!(
                    slot = command.slot,
                    channel = %command.claim_channel,
                    amount = %command.claim_amount_drops,
                    "vend command written"
                );
                self.set_state(VendState::Connected);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "vend write failed, dropping session");
                self.device = None;
                let _ = self.link.disconnect().await;
                self.set_state(VendState::Idle);
                Err(e)
            }
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.device = None;
        let result = self.link.disconnect().await;
        self.set_state(VendState::Idle);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::memory::{MemoryDevice, MemoryLink};
    use xccepta_core::{ChannelId, Drops};

    fn fast_config() -> VendSessionConfig {
        VendSessionConfig {
            scan_timeout: Duration::from_millis(100),
            discover_window: Duration::from_millis(20),
            connect_timeout: Duration::from_millis(200),
            write_timeout: Duration::from_millis(200),
            notification_buffer: 4,
            ..Default::default()
        }
    }

    fn ready_device() -> (MemoryLink, MemoryDevice) {
        let (link, device) = MemoryLink::new();
        device.advertise("AA:BB", DEFAULT_NAME_HINT);
        device.expose(&[DEFAULT_NOTIFY_UUID, DEFAULT_COMMAND_UUID]);
        (link, device)
    }

    fn command() -> VendCommand {
        VendCommand {
            slot: 1,
            pulse_ms: 600,
            claim_channel: ChannelId::from_bytes([0xAA; 32]),
            claim_amount_drops: Drops(1_000_000),
            device_id: "dev-kiosk".into(),
        }
    }

    #[tokio::test]
    async fn test_connect_and_send() {
        let (link, device) = ready_device();
        let (session, _events) = VendSession::spawn(link, fast_config()).unwrap();
        assert_eq!(session.state(), VendState::Idle);

        let connected = session.connect().await.unwrap();
        assert_eq!(connected.id, "AA:BB");
        assert_eq!(session.state(), VendState::Connected);

        session.send(command()).await.unwrap();
        assert_eq!(session.state(), VendState::Connected);

        let written = device.written();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].0, DEFAULT_COMMAND_UUID);
        let json: serde_json::Value = serde_json::from_slice(&written[0].1).unwrap();
        assert_eq!(json["action"], "vend");
        assert_eq!(json["claim_amount_drops"], "1000000");
    }

    #[tokio::test]
    async fn test_scan_timeout_returns_to_idle() {
        let (link, device) = MemoryLink::new();
        let (session, _events) = VendSession::spawn(link, fast_config()).unwrap();

        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, VendError::NotFound { .. }));
        assert_eq!(session.state(), VendState::Idle);
        assert!(device.discover_rounds() >= 2);
    }

    #[tokio::test]
    async fn test_other_names_ignored() {
        let (link, device) = MemoryLink::new();
        device.advertise("11:22", "SOMETHING_ELSE");
        let (session, _events) = VendSession::spawn(link, fast_config()).unwrap();
        assert!(matches!(
            session.connect().await,
            Err(VendError::NotFound { .. })
        ));
        // 100ms scan in 20ms rounds, not a spin.
        assert!(device.discover_rounds() < 10);
    }

    #[tokio::test]
    async fn test_send_without_connect() {
        let (link, device) = ready_device();
        let (session, _events) = VendSession::spawn(link, fast_config()).unwrap();
        assert_eq!(session.send(command()).await, Err(VendError::NotConnected));
        assert_eq!(session.state(), VendState::Idle);
        assert!(device.written().is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_goes_idle_without_retry() {
        let (link, device) = ready_device();
        device.fail_writes(Some("gatt error"));
        let (session, _events) = VendSession::spawn(link, fast_config()).unwrap();
        session.connect().await.unwrap();

        let err = session.send(command()).await.unwrap_err();
        assert_eq!(err, VendError::Write("gatt error".into()));
        assert_eq!(session.state(), VendState::Idle);
        assert!(!device.is_connected());

        // A second send is refused rather than silently retried.
        device.fail_writes(None);
        assert_eq!(session.send(command()).await, Err(VendError::NotConnected));
        assert!(device.written().is_empty());
    }

    #[tokio::test]
    async fn test_missing_command_characteristic() {
        let (link, device) = MemoryLink::new();
        device.advertise("AA:BB", DEFAULT_NAME_HINT);
        device.expose(&[DEFAULT_NOTIFY_UUID]);
        let (session, _events) = VendSession::spawn(link, fast_config()).unwrap();
        session.connect().await.unwrap();

        assert_eq!(
            session.send(command()).await,
            Err(VendError::CharacteristicMissing(DEFAULT_COMMAND_UUID))
        );
        assert_eq!(session.state(), VendState::Idle);
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let (link, device) = ready_device();
        device.fail_connect(Some("refused"));
        let (session, _events) = VendSession::spawn(link, fast_config()).unwrap();
        assert_eq!(
            session.connect().await,
            Err(VendError::Connect("refused".into()))
        );
        assert_eq!(session.state(), VendState::Idle);
    }

    #[tokio::test]
    async fn test_notifications_and_link_loss() {
        let (link, device) = ready_device();
        let (session, mut events) = VendSession::spawn(link, fast_config()).unwrap();
        session.connect().await.unwrap();

        device.notify(r#"{"status":"dispensed"}"#);
        assert_eq!(
            events.recv().await,
            Some(VendEvent::Telemetry(r#"{"status":"dispensed"}"#.into()))
        );

        device.drop_link();
        assert_eq!(events.recv().await, Some(VendEvent::Disconnected));

        // The loop handles the loss before the next request.
        assert_eq!(session.send(command()).await, Err(VendError::NotConnected));
        assert_eq!(session.state(), VendState::Idle);
    }

    #[tokio::test]
    async fn test_reconnect_after_disconnect() {
        let (link, _device) = ready_device();
        let (session, _events) = VendSession::spawn(link, fast_config()).unwrap();
        session.connect().await.unwrap();
        session.disconnect().await.unwrap();
        assert_eq!(session.state(), VendState::Idle);
        session.connect().await.unwrap();
        session.send(command()).await.unwrap();
    }

    #[tokio::test]
    async fn test_late_loss_of_earlier_link_is_ignored() {
        let (link, device) = ready_device();
        device.report_loss_late(Some(Duration::from_millis(30)));
        let config = VendSessionConfig {
            discover_window: Duration::from_millis(50),
            ..fast_config()
        };
        let (session, mut events) = VendSession::spawn(link, config).unwrap();

        session.connect().await.unwrap();
        session.disconnect().await.unwrap();
        // The first link reports its loss while the second scan is running.
        session.connect().await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(session.state(), VendState::Connected);
        session.send(command()).await.unwrap();
        assert_eq!(device.written().len(), 1);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_loss_after_reconnect_still_observed() {
        let (link, device) = ready_device();
        let (session, mut events) = VendSession::spawn(link, fast_config()).unwrap();
        session.connect().await.unwrap();
        device.drop_link();
        assert_eq!(events.recv().await, Some(VendEvent::Disconnected));

        session.connect().await.unwrap();
        session.send(command()).await.unwrap();

        device.drop_link();
        assert_eq!(events.recv().await, Some(VendEvent::Disconnected));
        assert_eq!(session.state(), VendState::Idle);
    }

    #[tokio::test]
    async fn test_stalled_subscribe_is_bounded() {
        let (link, device) = ready_device();
        device.stall_subscribe(true);
        let (session, _events) = VendSession::spawn(link, fast_config()).unwrap();

        let connected = tokio::time::timeout(Duration::from_secs(2), session.connect())
            .await
            .expect("connect must not hang on subscribe");
        assert_eq!(connected.unwrap().id, "AA:BB");
        assert_eq!(session.state(), VendState::Connected);

        session.send(command()).await.unwrap();
        assert_eq!(device.written().len(), 1);
    }

    #[tokio::test]
    async fn test_operations_queue_before_await() {
        let (link, device) = ready_device();
        let (session, _events) = VendSession::spawn(link, fast_config()).unwrap();

        let connect = session.connect();
        let send = session.send(command());
        connect.await.unwrap();
        send.await.unwrap();
        assert_eq!(device.written().len(), 1);
    }
}
