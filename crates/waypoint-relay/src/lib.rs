//! Waypoint Relay Service Library
//!
//! A rendezvous relay for short-lived, named rooms: it binds WebSocket
//! connections to rooms, fans opaque events out to the current members, and
//! nothing else. No persistence, no media handling, no message
//! interpretation beyond routing.
//!
//! # Architecture
//!
//! All room-mutating state is owned by a single actor:
//!
//! ```text
//! RoomRegistryActor (singleton per process)
//! ├── owns the RoomTable, connection states, and the public access code
//! ├── processes every inbound event to completion before the next
//! └── arms one cancellable timer task per ephemeral message
//! ```
//!
//! The transport layer holds only a [`actors::ConnectionHandle`] per socket:
//! a bounded mailbox of pre-serialized frames drained by a writer task.
//! Fan-out uses non-blocking `try_send`, so a slow or dead peer never
//! delays delivery to the rest of its room.
//!
//! # Key Design Decisions
//!
//! - **Single-writer dispatch**: capacity checks, membership mutation, and
//!   room destruction are atomic because one actor performs them serially.
//! - **Room instance identity**: expiry timers are keyed by the room's
//!   instance id, not its code, so a recreated room reusing an old code
//!   never receives stale deletions.
//! - **Best-effort delivery**: write failures are skipped, never retried,
//!   never surfaced to the sender.
//!
//! # Modules
//!
//! - [`actors`] - registry actor, actor messages, connection handles
//! - [`access`] - access-code validation and capacity decisions
//! - [`rooms`] - room table and membership invariants
//! - [`config`] - service configuration from environment
//! - [`errors`] - error taxonomy with client-safe messages
//! - [`transport`] - axum WebSocket endpoint
//! - [`observability`] - health endpoints

pub mod access;
pub mod actors;
pub mod config;
pub mod errors;
pub mod observability;
pub mod rooms;
pub mod transport;
