//! Actor model implementation.
//!
//! A single `RoomRegistryActor` owns every piece of room-mutating state and
//! processes inbound events strictly one at a time; everything else talks to
//! it through [`RoomRegistryActorHandle`]. Outbound delivery goes through
//! per-connection [`ConnectionHandle`] mailboxes drained by transport writer
//! tasks.

pub mod connection;
pub mod messages;
pub mod registry;

pub use connection::{ConnectionHandle, CONNECTION_CHANNEL_BUFFER};
pub use messages::{RegistryMessage, RegistryStatus, RoomInfo};
pub use registry::RoomRegistryActorHandle;
