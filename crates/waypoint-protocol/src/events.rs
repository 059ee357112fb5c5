//! Inbound and outbound event types.
//!
//! Field spellings follow the wire protocol exactly (`isTyping`, `filetype`,
//! `disappear`), so these types serialize to the same JSON the original
//! clients speak.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque payload of a call-signaling event.
///
/// The relay never looks inside; whatever fields the client sent alongside
/// `kind` are captured here and re-emitted verbatim.
pub type SignalPayload = Map<String, Value>;

/// The fixed set of opaque call-signaling kinds the relay forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    CallRequest,
    Offer,
    Answer,
    Candidate,
    CallReject,
    CallEnd,
    Hangup,
    SelfDestruct,
}

impl SignalKind {
    /// Wire tag for this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::CallRequest => "call-request",
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::Candidate => "candidate",
            SignalKind::CallReject => "call-reject",
            SignalKind::CallEnd => "call-end",
            SignalKind::Hangup => "hangup",
            SignalKind::SelfDestruct => "self_destruct",
        }
    }
}

/// Events received from clients (`client -> server`).
///
/// Unknown `kind` tags fail deserialization; the transport drops such frames
/// silently per the error taxonomy (malformed payloads are never replied to).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind")]
pub enum ClientEvent {
    /// Bind the connection to a new or existing room.
    #[serde(rename = "create")]
    Create { room: String, username: String },

    /// Join a room by access code (validated against secret/public codes).
    #[serde(rename = "join")]
    Join {
        room: String,
        username: String,
        #[serde(default)]
        avatar: Option<String>,
    },

    /// Install a new process-wide public access code.
    #[serde(rename = "generate_code")]
    GenerateCode { code: String },

    /// Text message to the sender's room.
    #[serde(rename = "message")]
    Message {
        text: String,
        /// Ephemeral flag: the relay schedules a `delete` after the TTL.
        #[serde(default)]
        disappear: bool,
    },

    /// File payload to the sender's room. Always ephemeral.
    #[serde(rename = "file")]
    File {
        name: String,
        data: String,
        filetype: String,
    },

    /// Typing indicator.
    #[serde(rename = "typing")]
    Typing {
        #[serde(rename = "isTyping")]
        is_typing: bool,
    },

    /// Client-side history wipe (advisory fan-out, not a room destroy).
    #[serde(rename = "clear")]
    Clear {},

    // Opaque call-signaling kinds, relayed without interpretation.
    #[serde(rename = "call-request")]
    CallRequest {
        #[serde(flatten)]
        payload: SignalPayload,
    },
    #[serde(rename = "offer")]
    Offer {
        #[serde(flatten)]
        payload: SignalPayload,
    },
    #[serde(rename = "answer")]
    Answer {
        #[serde(flatten)]
        payload: SignalPayload,
    },
    #[serde(rename = "candidate")]
    Candidate {
        #[serde(flatten)]
        payload: SignalPayload,
    },
    #[serde(rename = "call-reject")]
    CallReject {
        #[serde(flatten)]
        payload: SignalPayload,
    },
    #[serde(rename = "call-end")]
    CallEnd {
        #[serde(flatten)]
        payload: SignalPayload,
    },
    #[serde(rename = "hangup")]
    Hangup {
        #[serde(flatten)]
        payload: SignalPayload,
    },
    #[serde(rename = "self_destruct")]
    SelfDestruct {
        #[serde(flatten)]
        payload: SignalPayload,
    },
}

impl ClientEvent {
    /// Split out the signaling kind and payload if this is a relay event.
    ///
    /// Returns the event back unchanged for every non-signaling kind.
    pub fn into_signal(self) -> Result<(SignalKind, SignalPayload), Box<ClientEvent>> {
        match self {
            ClientEvent::CallRequest { payload } => Ok((SignalKind::CallRequest, payload)),
            ClientEvent::Offer { payload } => Ok((SignalKind::Offer, payload)),
            ClientEvent::Answer { payload } => Ok((SignalKind::Answer, payload)),
            ClientEvent::Candidate { payload } => Ok((SignalKind::Candidate, payload)),
            ClientEvent::CallReject { payload } => Ok((SignalKind::CallReject, payload)),
            ClientEvent::CallEnd { payload } => Ok((SignalKind::CallEnd, payload)),
            ClientEvent::Hangup { payload } => Ok((SignalKind::Hangup, payload)),
            ClientEvent::SelfDestruct { payload } => Ok((SignalKind::SelfDestruct, payload)),
            other => Err(Box::new(other)),
        }
    }
}

/// Events sent to clients (`server -> client`).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum ServerEvent {
    /// Ack to the creator: room bound.
    #[serde(rename = "created")]
    Created { room: String },

    /// Ack to the joiner: membership accepted.
    #[serde(rename = "joined")]
    Joined { room: String },

    /// Join-time rejection, delivered to the requester only.
    #[serde(rename = "error")]
    Error { text: String },

    /// Current member usernames in join order.
    #[serde(rename = "users")]
    Users { users: Vec<String> },

    /// Relayed text message.
    #[serde(rename = "message")]
    Message {
        id: String,
        sender: String,
        text: String,
    },

    /// Relayed file payload.
    #[serde(rename = "file")]
    File {
        id: String,
        sender: String,
        name: String,
        data: String,
        filetype: String,
    },

    /// Expiry of an ephemeral message or file.
    #[serde(rename = "delete")]
    Delete { id: String },

    /// Advisory history wipe.
    #[serde(rename = "clear")]
    Clear {},

    /// Human-readable room notice.
    #[serde(rename = "system")]
    System { text: String },

    /// Room-wide chat wipe triggered by `self_destruct`.
    #[serde(rename = "wipe_chat")]
    WipeChat {},

    /// Typing indicator fan-out.
    #[serde(rename = "typing")]
    Typing {
        sender: String,
        #[serde(rename = "isTyping")]
        is_typing: bool,
    },

    // Relayed signaling kinds, payload verbatim plus the sender.
    #[serde(rename = "call-request")]
    CallRequest {
        sender: String,
        #[serde(flatten)]
        payload: SignalPayload,
    },
    #[serde(rename = "offer")]
    Offer {
        sender: String,
        #[serde(flatten)]
        payload: SignalPayload,
    },
    #[serde(rename = "answer")]
    Answer {
        sender: String,
        #[serde(flatten)]
        payload: SignalPayload,
    },
    #[serde(rename = "candidate")]
    Candidate {
        sender: String,
        #[serde(flatten)]
        payload: SignalPayload,
    },
    #[serde(rename = "call-reject")]
    CallReject {
        sender: String,
        #[serde(flatten)]
        payload: SignalPayload,
    },
    #[serde(rename = "call-end")]
    CallEnd {
        sender: String,
        #[serde(flatten)]
        payload: SignalPayload,
    },
    #[serde(rename = "hangup")]
    Hangup {
        sender: String,
        #[serde(flatten)]
        payload: SignalPayload,
    },
    #[serde(rename = "self_destruct")]
    SelfDestruct {
        sender: String,
        #[serde(flatten)]
        payload: SignalPayload,
    },
}

impl ServerEvent {
    /// Build the outbound form of a relayed signaling event.
    ///
    /// The server-assigned `sender` always wins: a `sender` key smuggled into
    /// the payload is discarded so clients cannot spoof each other.
    #[must_use]
    pub fn signal(kind: SignalKind, sender: String, mut payload: SignalPayload) -> Self {
        payload.remove("sender");
        match kind {
            SignalKind::CallRequest => ServerEvent::CallRequest { sender, payload },
            SignalKind::Offer => ServerEvent::Offer { sender, payload },
            SignalKind::Answer => ServerEvent::Answer { sender, payload },
            SignalKind::Candidate => ServerEvent::Candidate { sender, payload },
            SignalKind::CallReject => ServerEvent::CallReject { sender, payload },
            SignalKind::CallEnd => ServerEvent::CallEnd { sender, payload },
            SignalKind::Hangup => ServerEvent::Hangup { sender, payload },
            SignalKind::SelfDestruct => ServerEvent::SelfDestruct { sender, payload },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_create() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"kind":"create","room":"R1","username":"alice"}"#).unwrap();
        assert!(matches!(
            event,
            ClientEvent::Create { room, username } if room == "R1" && username == "alice"
        ));
    }

    #[test]
    fn test_parse_join_with_and_without_avatar() {
        let event: ClientEvent = serde_json::from_str(
            r#"{"kind":"join","room":"xyz1","username":"bob","avatar":"cat.png"}"#,
        )
        .unwrap();
        assert!(matches!(
            event,
            ClientEvent::Join { ref avatar, .. } if avatar.as_deref() == Some("cat.png")
        ));

        let event: ClientEvent =
            serde_json::from_str(r#"{"kind":"join","room":"xyz1","username":"bob"}"#).unwrap();
        assert!(matches!(event, ClientEvent::Join { avatar: None, .. }));
    }

    #[test]
    fn test_parse_message_disappear_defaults_false() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"kind":"message","text":"hi"}"#).unwrap();
        assert!(matches!(
            event,
            ClientEvent::Message { disappear: false, .. }
        ));

        let event: ClientEvent =
            serde_json::from_str(r#"{"kind":"message","text":"hi","disappear":true}"#).unwrap();
        assert!(matches!(
            event,
            ClientEvent::Message { disappear: true, .. }
        ));
    }

    #[test]
    fn test_parse_typing_uses_camel_case_field() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"kind":"typing","isTyping":true}"#).unwrap();
        assert!(matches!(event, ClientEvent::Typing { is_typing: true }));

        // snake_case spelling is not part of the protocol
        let result: Result<ClientEvent, _> =
            serde_json::from_str(r#"{"kind":"typing","is_typing":true}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let result: Result<ClientEvent, _> =
            serde_json::from_str(r#"{"kind":"format_disk","target":"/"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_signal_payload_round_trips_verbatim() {
        let event: ClientEvent = serde_json::from_str(
            r#"{"kind":"offer","sdp":"v=0...","meta":{"bitrate":64000}}"#,
        )
        .unwrap();
        let (kind, payload) = event.into_signal().unwrap();
        assert_eq!(kind, SignalKind::Offer);
        assert_eq!(payload.get("sdp").unwrap(), "v=0...");

        let out = ServerEvent::signal(kind, "alice".to_string(), payload);
        let json: Value = serde_json::to_value(&out).unwrap();
        assert_eq!(json["kind"], "offer");
        assert_eq!(json["sender"], "alice");
        assert_eq!(json["sdp"], "v=0...");
        assert_eq!(json["meta"]["bitrate"], 64000);
    }

    #[test]
    fn test_into_signal_rejects_non_signaling_kinds() {
        let event: ClientEvent = serde_json::from_str(r#"{"kind":"clear"}"#).unwrap();
        assert!(event.into_signal().is_err());
    }

    #[test]
    fn test_hyphenated_kinds_parse() {
        for kind in ["call-request", "call-reject", "call-end"] {
            let raw = format!(r#"{{"kind":"{kind}","to":"bob"}}"#);
            let event: ClientEvent = serde_json::from_str(&raw).unwrap();
            let (parsed, payload) = event.into_signal().unwrap();
            assert_eq!(parsed.as_str(), kind);
            assert_eq!(payload.get("to").unwrap(), "bob");
        }
    }

    #[test]
    fn test_serialize_users_and_delete() {
        let users = ServerEvent::Users {
            users: vec!["alice".to_string(), "bob".to_string()],
        };
        assert_eq!(
            serde_json::to_string(&users).unwrap(),
            r#"{"kind":"users","users":["alice","bob"]}"#
        );

        let delete = ServerEvent::Delete {
            id: "m-1".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&delete).unwrap(),
            r#"{"kind":"delete","id":"m-1"}"#
        );
    }

    #[test]
    fn test_signal_sender_cannot_be_spoofed() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"kind":"candidate","sender":"mallory","mid":"0"}"#).unwrap();
        let (kind, payload) = event.into_signal().unwrap();
        let out = ServerEvent::signal(kind, "alice".to_string(), payload);
        let json: Value = serde_json::to_value(&out).unwrap();
        assert_eq!(json["sender"], "alice");
        assert_eq!(json["mid"], "0");
    }

    #[test]
    fn test_serialize_typing_uses_camel_case_field() {
        let typing = ServerEvent::Typing {
            sender: "alice".to_string(),
            is_typing: true,
        };
        let json = serde_json::to_string(&typing).unwrap();
        assert!(json.contains(r#""isTyping":true"#));
        assert!(!json.contains("is_typing"));
    }
}
