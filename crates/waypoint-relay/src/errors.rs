//! Relay error types.
//!
//! Nothing in the relay is fatal: every error path ends in either a targeted
//! `error` reply to the requester or a silent no-op. Internal details are
//! logged server-side and never exposed to clients.

use thiserror::Error;

/// Relay error type.
///
/// Only `InvalidCode` and `RoomFull` ever reach a client, and only as a
/// direct reply to the connection that triggered them. The remaining
/// variants are logged and swallowed.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Unparseable or unrecognized inbound frame. Dropped silently.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Join code matched neither a fixed secret nor the current public code.
    #[error("Invalid access code")]
    InvalidCode,

    /// Room is at its configured member capacity.
    #[error("Room is full")]
    RoomFull,

    /// Event requiring a room binding arrived from an unbound connection.
    /// Dropped silently.
    #[error("Connection has no room binding")]
    UnknownRoom,

    /// Write to a closed or saturated peer during fan-out. Skipped.
    #[error("Delivery failed: {0}")]
    DeliveryFailure(String),

    /// Internal error (actor mailbox failures and the like).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Returns the client-safe text for an `error` reply.
    ///
    /// Internal variants collapse to a generic message so server details
    /// never leak onto the wire.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            RelayError::InvalidCode => "Invalid room code".to_string(),
            RelayError::RoomFull => "Room is full".to_string(),
            RelayError::MalformedPayload(_)
            | RelayError::UnknownRoom
            | RelayError::DeliveryFailure(_)
            | RelayError::Internal(_) => "An internal error occurred".to_string(),
        }
    }

    /// Whether this error warrants an `error` reply to the requester.
    ///
    /// Everything else is a silent drop per the error taxonomy.
    #[must_use]
    pub fn is_reportable(&self) -> bool {
        matches!(self, RelayError::InvalidCode | RelayError::RoomFull)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_reportable_errors() {
        assert!(RelayError::InvalidCode.is_reportable());
        assert!(RelayError::RoomFull.is_reportable());
        assert!(!RelayError::UnknownRoom.is_reportable());
        assert!(!RelayError::MalformedPayload("x".to_string()).is_reportable());
        assert!(!RelayError::DeliveryFailure("closed".to_string()).is_reportable());
    }

    #[test]
    fn test_client_messages_hide_internal_details() {
        let err = RelayError::Internal("mailbox closed at 10.0.0.3:8080".to_string());
        assert!(!err.client_message().contains("10.0.0.3"));
        assert_eq!(err.client_message(), "An internal error occurred");

        let err = RelayError::MalformedPayload("unknown variant `format_disk`".to_string());
        assert!(!err.client_message().contains("format_disk"));
    }

    #[test]
    fn test_join_rejections_have_distinct_messages() {
        assert_eq!(RelayError::InvalidCode.client_message(), "Invalid room code");
        assert_eq!(RelayError::RoomFull.client_message(), "Room is full");
    }
}
