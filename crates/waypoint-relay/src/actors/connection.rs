//! Per-connection outbound mailbox.
//!
//! The registry actor never touches a socket. Each connection gets a bounded
//! channel of pre-serialized frames; the transport's writer task drains it
//! into the WebSocket. Delivery is strictly non-blocking: `try_deliver`
//! fails fast on a closed or saturated mailbox and the caller skips the
//! peer, so one slow connection never stalls fan-out to its room.

use crate::errors::RelayError;
use crate::rooms::ConnectionId;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Outbound mailbox depth per connection. A peer that falls this far behind
/// starts losing frames (best-effort delivery).
pub const CONNECTION_CHANNEL_BUFFER: usize = 64;

/// A pre-serialized outbound frame, shared across all recipients of one
/// fan-out (serialize once, deliver many).
pub type Frame = Arc<str>;

/// Handle to one connection's outbound mailbox.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    conn_id: ConnectionId,
    sender: mpsc::Sender<Frame>,
}

impl ConnectionHandle {
    /// Create a handle and the receiving half for the writer task.
    #[must_use]
    pub fn channel(conn_id: ConnectionId) -> (Self, mpsc::Receiver<Frame>) {
        let (sender, receiver) = mpsc::channel(CONNECTION_CHANNEL_BUFFER);
        (Self { conn_id, sender }, receiver)
    }

    /// Connection identity.
    #[must_use]
    pub fn conn_id(&self) -> ConnectionId {
        self.conn_id
    }

    /// Whether the writer task is still draining this mailbox.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Non-blocking delivery of one frame.
    pub fn try_deliver(&self, frame: Frame) -> Result<(), RelayError> {
        self.sender
            .try_send(frame)
            .map_err(|e| RelayError::DeliveryFailure(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_deliver_and_receive() {
        let (handle, mut rx) = ConnectionHandle::channel(Uuid::new_v4());
        assert!(handle.is_open());

        handle.try_deliver(Arc::from("frame-1")).unwrap();
        assert_eq!(rx.recv().await.unwrap().as_ref(), "frame-1");
    }

    #[tokio::test]
    async fn test_closed_mailbox_reports_delivery_failure() {
        let (handle, rx) = ConnectionHandle::channel(Uuid::new_v4());
        drop(rx);

        assert!(!handle.is_open());
        let result = handle.try_deliver(Arc::from("frame"));
        assert!(matches!(result, Err(RelayError::DeliveryFailure(_))));
    }

    #[tokio::test]
    async fn test_saturated_mailbox_fails_fast() {
        let (handle, _rx) = ConnectionHandle::channel(Uuid::new_v4());

        for i in 0..CONNECTION_CHANNEL_BUFFER {
            handle.try_deliver(Arc::from(format!("frame-{i}"))).unwrap();
        }
        // Buffer full and nobody draining: the slow peer is skipped, the
        // caller is never blocked.
        let result = handle.try_deliver(Arc::from("overflow"));
        assert!(matches!(result, Err(RelayError::DeliveryFailure(_))));
    }
}
