//! Message types for the registry actor.
//!
//! All communication with the registry uses strongly-typed message passing
//! via `tokio::sync::mpsc`; request-reply patterns use `tokio::sync::oneshot`.

use super::connection::ConnectionHandle;
use crate::rooms::ConnectionId;
use tokio::sync::oneshot;
use uuid::Uuid;
use waypoint_protocol::ClientEvent;

/// Messages sent to the `RoomRegistryActor`.
#[derive(Debug)]
pub enum RegistryMessage {
    /// A new transport connection opened.
    Attach {
        conn_id: ConnectionId,
        handle: ConnectionHandle,
    },

    /// An inbound client event, already parsed by the transport.
    Inbound {
        conn_id: ConnectionId,
        event: ClientEvent,
    },

    /// A transport connection closed; remove it from its room.
    Detach { conn_id: ConnectionId },

    /// An ephemeral message's expiry timer fired.
    ///
    /// Keyed by room *instance*, not code: if the room was destroyed (or
    /// recreated under the same code) the deletion is suppressed.
    ExpireMessage {
        room_code: String,
        room_instance: Uuid,
        message_id: String,
    },

    /// Snapshot one room (health, tests).
    GetRoom {
        code: String,
        respond_to: oneshot::Sender<Option<RoomInfo>>,
    },

    /// Snapshot registry-wide counters (health, tests).
    GetStatus {
        respond_to: oneshot::Sender<RegistryStatus>,
    },
}

/// Point-in-time view of one room.
#[derive(Debug, Clone)]
pub struct RoomInfo {
    /// Canonical room code.
    pub code: String,
    /// Identity of this room instance.
    pub instance_id: Uuid,
    /// Member usernames in join order.
    pub members: Vec<String>,
    /// Creation timestamp (unix seconds).
    pub created_at: i64,
}

/// Registry-wide counters.
#[derive(Debug, Clone)]
pub struct RegistryStatus {
    /// Live rooms.
    pub room_count: usize,
    /// Attached connections (bound to a room or not).
    pub connection_count: usize,
    /// The current public access code, if one is live.
    pub public_code: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_room_info_clone() {
        let info = RoomInfo {
            code: "R1".to_string(),
            instance_id: Uuid::new_v4(),
            members: vec!["alice".to_string()],
            created_at: 0,
        };
        let cloned = info.clone();
        assert_eq!(info.code, cloned.code);
        assert_eq!(info.instance_id, cloned.instance_id);
    }

    #[test]
    fn test_status_counts() {
        let status = RegistryStatus {
            room_count: 0,
            connection_count: 0,
            public_code: None,
        };
        assert_eq!(status.room_count, 0);
        assert!(status.public_code.is_none());
    }
}
