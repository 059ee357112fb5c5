//! Waypoint wire protocol.
//!
//! Events travel as newline-free JSON objects over a bidirectional message
//! channel, discriminated by a `kind` tag. This crate defines the exhaustive
//! inbound [`ClientEvent`] and outbound [`ServerEvent`] enums so the relay's
//! dispatcher pattern-matches every kind and the compiler enforces that new
//! kinds are handled.
//!
//! Call-signaling payloads (offers, answers, ICE candidates, ...) are opaque
//! to the relay: they are carried as flattened JSON maps and forwarded
//! verbatim, with the sender's username attached on the way out.

pub mod events;

pub use events::{ClientEvent, ServerEvent, SignalKind, SignalPayload};
