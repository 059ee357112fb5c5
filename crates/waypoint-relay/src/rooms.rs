//! Room table and membership bookkeeping.
//!
//! The table is plain synchronous state owned exclusively by the registry
//! actor; single-writer dispatch makes every check-then-act sequence here
//! atomic without locks.
//!
//! Two invariants are load-bearing:
//! - a room whose member set empties is destroyed in the same operation
//!   (no empty room survives a dispatch cycle), and
//! - each room carries a process-unique `instance_id`, so a timer armed
//!   against a destroyed room can never fire into a later room that reused
//!   the same code.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Identity of a transport connection.
pub type ConnectionId = Uuid;

/// One live room: ordered member set plus metadata.
#[derive(Debug)]
pub struct Room {
    /// Canonical (normalized) room code.
    code: String,
    /// Process-unique identity of this room instance.
    instance_id: Uuid,
    /// Creation timestamp.
    created_at: DateTime<Utc>,
    /// Members in join order.
    members: Vec<ConnectionId>,
    /// Parent token for every expiry timer scoped to this room.
    timer_token: CancellationToken,
}

impl Room {
    fn new(code: String, parent: &CancellationToken) -> Self {
        Self {
            code,
            instance_id: Uuid::new_v4(),
            created_at: Utc::now(),
            members: Vec::new(),
            timer_token: parent.child_token(),
        }
    }

    /// Canonical room code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Identity of this room instance (distinct from any code reuse).
    #[must_use]
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Number of current members.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Whether the connection is a member.
    #[must_use]
    pub fn contains(&self, conn: ConnectionId) -> bool {
        self.members.contains(&conn)
    }

    /// Point-in-time membership snapshot, in join order.
    ///
    /// Fan-out iterates the copy, so membership changes during delivery
    /// cannot corrupt iteration.
    #[must_use]
    pub fn members(&self) -> Vec<ConnectionId> {
        self.members.clone()
    }

    /// Child token for one expiry timer; cancelled when the room dies.
    #[must_use]
    pub fn timer_token(&self) -> CancellationToken {
        self.timer_token.child_token()
    }
}

/// Mapping from room code to live room.
#[derive(Debug, Default)]
pub struct RoomTable {
    rooms: HashMap<String, Room>,
}

impl RoomTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rooms: HashMap::new(),
        }
    }

    /// Idempotent create: returns the existing room or inserts an empty one.
    pub fn create_or_get(&mut self, code: &str, parent: &CancellationToken) -> &mut Room {
        self.rooms
            .entry(code.to_string())
            .or_insert_with(|| Room::new(code.to_string(), parent))
    }

    #[must_use]
    pub fn get(&self, code: &str) -> Option<&Room> {
        self.rooms.get(code)
    }

    #[must_use]
    pub fn get_mut(&mut self, code: &str) -> Option<&mut Room> {
        self.rooms.get_mut(code)
    }

    /// Number of live rooms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Insert a connection into a room's member set.
    ///
    /// The caller (registry actor) clears any prior room binding on the
    /// connection first; a join implicitly leaves the previous room.
    /// Inserting an existing member is a no-op.
    pub fn add_member(&mut self, code: &str, conn: ConnectionId) {
        if let Some(room) = self.rooms.get_mut(code) {
            if !room.members.contains(&conn) {
                room.members.push(conn);
            }
        }
    }

    /// Remove a connection from a room.
    ///
    /// If the member set empties, the room is destroyed: its timer token is
    /// cancelled (suppressing every pending ephemeral deletion scoped to it)
    /// and the dead `Room` is returned so the caller can release anything
    /// keyed to it, such as a bound public code.
    pub fn remove_member(&mut self, code: &str, conn: ConnectionId) -> Option<Room> {
        let room = self.rooms.get_mut(code)?;
        room.members.retain(|member| *member != conn);

        if room.members.is_empty() {
            let room = self.rooms.remove(code)?;
            room.timer_token.cancel();
            return Some(room);
        }
        None
    }

    /// Membership snapshot for fan-out.
    #[must_use]
    pub fn members_of(&self, code: &str) -> Option<Vec<ConnectionId>> {
        self.rooms.get(code).map(Room::members)
    }

    /// Drain every room, cancelling pending timers. Used at shutdown.
    pub fn clear(&mut self) {
        for (_, room) in self.rooms.drain() {
            room.timer_token.cancel();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn root() -> CancellationToken {
        CancellationToken::new()
    }

    #[test]
    fn test_create_or_get_is_idempotent() {
        let parent = root();
        let mut table = RoomTable::new();

        let first = table.create_or_get("R1", &parent).instance_id();
        let second = table.create_or_get("R1", &parent).instance_id();
        assert_eq!(first, second);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_membership_join_order_snapshot() {
        let parent = root();
        let mut table = RoomTable::new();
        table.create_or_get("R1", &parent);

        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        table.add_member("R1", a);
        table.add_member("R1", b);
        table.add_member("R1", c);

        assert_eq!(table.members_of("R1").unwrap(), vec![a, b, c]);
    }

    #[test]
    fn test_duplicate_add_is_noop() {
        let parent = root();
        let mut table = RoomTable::new();
        table.create_or_get("R1", &parent);

        let a = Uuid::new_v4();
        table.add_member("R1", a);
        table.add_member("R1", a);
        assert_eq!(table.get("R1").unwrap().member_count(), 1);
    }

    #[test]
    fn test_last_member_leaving_destroys_room() {
        let parent = root();
        let mut table = RoomTable::new();
        table.create_or_get("R1", &parent);

        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        table.add_member("R1", a);
        table.add_member("R1", b);

        assert!(table.remove_member("R1", a).is_none());
        assert_eq!(table.members_of("R1").unwrap(), vec![b]);

        let destroyed = table.remove_member("R1", b).expect("room should die");
        assert_eq!(destroyed.code(), "R1");
        assert!(table.get("R1").is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_room_destruction_cancels_timer_tokens() {
        let parent = root();
        let mut table = RoomTable::new();
        let timer = {
            let room = table.create_or_get("R1", &parent);
            room.timer_token()
        };
        let a = Uuid::new_v4();
        table.add_member("R1", a);

        assert!(!timer.is_cancelled());
        table.remove_member("R1", a);
        assert!(timer.is_cancelled());
    }

    #[test]
    fn test_recreated_room_has_fresh_instance_id() {
        let parent = root();
        let mut table = RoomTable::new();

        let first = table.create_or_get("R1", &parent).instance_id();
        let a = Uuid::new_v4();
        table.add_member("R1", a);
        table.remove_member("R1", a);

        let second = table.create_or_get("R1", &parent).instance_id();
        assert_ne!(first, second);
        assert_eq!(table.get("R1").unwrap().member_count(), 0);
    }

    #[test]
    fn test_clear_cancels_all_rooms() {
        let parent = root();
        let mut table = RoomTable::new();
        let t1 = table.create_or_get("R1", &parent).timer_token();
        let t2 = table.create_or_get("R2", &parent).timer_token();

        table.clear();
        assert!(table.is_empty());
        assert!(t1.is_cancelled());
        assert!(t2.is_cancelled());
    }
}
