//! Asynchronous notifications from the vending hardware.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Delivered to the owner of the session, off the I/O thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VendEvent {
    /// Opaque status text from the device. No correlation with any command.
    Telemetry(String),
    /// The device link dropped.
    Disconnected,
}

/// Handed to a [`BleLink`](crate::BleLink) so it can report what the device
/// sends without ever blocking its I/O loop.
///
/// Each sink belongs to one connection. A loss reported through the sink of
/// an earlier connection is ignored by the session.
#[derive(Debug, Clone)]
pub struct NotificationSink {
    events: mpsc::Sender<VendEvent>,
    lost: mpsc::UnboundedSender<u64>,
    epoch: u64,
}

impl NotificationSink {
    pub(crate) fn new(events: mpsc::Sender<VendEvent>, lost: mpsc::UnboundedSender<u64>) -> Self {
        Self {
            events,
            lost,
            epoch: 0,
        }
    }

    /// The same channels, tagged for connection number `epoch`.
    pub(crate) fn for_connection(&self, epoch: u64) -> Self {
        Self {
            epoch,
            ..self.clone()
        }
    }

    /// Forward a raw notification as telemetry text.
    pub fn telemetry(&self, raw: &[u8]) {
        let text = String::from_utf8_lossy(raw).into_owned();
        tracing::debug!(telemetry = %text, "vend notification");
        self.push(VendEvent::Telemetry(text));
    }

    /// Report that the link went away.
    ///
    /// The session decides whether the loss is current and, if so, emits
    /// [`VendEvent::Disconnected`].
    pub fn disconnected(&self) {
        let _ = self.lost.send(self.epoch);
    }

    pub(crate) fn push(&self, event: VendEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::warn!(?event, "vend event buffer full, dropping");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_full_buffer_drops_instead_of_blocking() {
        let (tx, mut rx) = mpsc::channel(1);
        let (lost_tx, _lost_rx) = mpsc::unbounded_channel();
        let sink = NotificationSink::new(tx, lost_tx);

        sink.telemetry(b"first");
        sink.telemetry(b"second");

        assert_eq!(rx.recv().await, Some(VendEvent::Telemetry("first".into())));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_lossy() {
        let (tx, mut rx) = mpsc::channel(4);
        let (lost_tx, _lost_rx) = mpsc::unbounded_channel();
        NotificationSink::new(tx, lost_tx).telemetry(&[b'o', b'k', 0xFF]);
        assert_eq!(
            rx.recv().await,
            Some(VendEvent::Telemetry("ok\u{FFFD}".into()))
        );
    }

    #[tokio::test]
    async fn test_loss_carries_connection_epoch() {
        let (tx, mut rx) = mpsc::channel(4);
        let (lost_tx, mut lost_rx) = mpsc::unbounded_channel();
        let base = NotificationSink::new(tx, lost_tx);

        base.for_connection(3).disconnected();
        base.for_connection(4).disconnected();

        assert_eq!(lost_rx.recv().await, Some(3));
        assert_eq!(lost_rx.recv().await, Some(4));
        assert!(rx.try_recv().is_err());
    }
}
