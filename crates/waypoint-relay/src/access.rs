//! Access control for room joins.
//!
//! A join request is accepted when its code matches either a fixed secret
//! code from configuration or the single live public code. Capacity is
//! enforced separately, after acceptance and before membership mutation;
//! both run inside one registry actor message, so the check-then-insert
//! sequence cannot interleave with another join.

use crate::errors::RelayError;
use uuid::Uuid;

/// Normalize a room code for case-insensitive matching.
#[must_use]
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Outcome of join validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Accepted; `target` is the canonical room code to bind.
    Accept { target: String },
    /// Rejected; replied to the requester only.
    Reject,
}

/// The process-wide public access code.
///
/// At most one exists at a time. Creating a room from it binds it to that
/// room instance: it can no longer mint a different new room, but remains
/// valid for joining the bound room while that room lives.
#[derive(Debug, Clone)]
pub struct PublicCode {
    code: String,
    bound_room: Option<Uuid>,
}

impl PublicCode {
    /// Install a freshly generated code. The caller normalizes first.
    #[must_use]
    pub fn new(code: String) -> Self {
        Self {
            code,
            bound_room: None,
        }
    }

    /// The code string (normalized).
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Record that a room was created from this code.
    pub fn bind(&mut self, room_instance: Uuid) {
        self.bound_room = Some(room_instance);
    }

    /// Whether this code is bound to the given room instance.
    #[must_use]
    pub fn is_bound_to(&self, room_instance: Uuid) -> bool {
        self.bound_room == Some(room_instance)
    }
}

/// Validates join codes and enforces per-room capacity.
#[derive(Debug)]
pub struct AccessController {
    /// Fixed secret codes, normalized at construction.
    secret_codes: Vec<String>,
    /// Maximum members per room.
    max_room_members: usize,
}

impl AccessController {
    /// Create a controller. Codes are normalized here so later comparisons
    /// are plain equality.
    #[must_use]
    pub fn new(secret_codes: Vec<String>, max_room_members: usize) -> Self {
        Self {
            secret_codes: secret_codes.iter().map(|c| normalize_code(c)).collect(),
            max_room_members,
        }
    }

    /// Configured per-room member limit.
    #[must_use]
    pub fn max_room_members(&self) -> usize {
        self.max_room_members
    }

    /// Validate a requested join code.
    ///
    /// Rules, in order: normalize; accept a fixed secret code (target is the
    /// code's canonical room); accept the current public code; otherwise
    /// reject.
    #[must_use]
    pub fn validate_join(&self, requested: &str, public_code: Option<&PublicCode>) -> Decision {
        let normalized = normalize_code(requested);

        if self.secret_codes.iter().any(|code| *code == normalized) {
            return Decision::Accept { target: normalized };
        }

        if let Some(public) = public_code {
            if public.code() == normalized {
                return Decision::Accept { target: normalized };
            }
        }

        Decision::Reject
    }

    /// Reject with `RoomFull` when the room is already at capacity.
    pub fn check_capacity(&self, member_count: usize) -> Result<(), RelayError> {
        if member_count >= self.max_room_members {
            Err(RelayError::RoomFull)
        } else {
            Ok(())
        }
    }
}
