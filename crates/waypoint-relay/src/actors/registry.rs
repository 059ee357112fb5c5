//! `RoomRegistryActor` - singleton owner of all room state.
//!
//! Every room-mutating operation (create, join, leave, fan-out, expiry)
//! funnels through this actor's mailbox and runs to completion before the
//! next begins. That single-writer discipline is what makes the capacity
//! check-then-insert and the room-exists check-then-destroy sequences atomic
//! without locks.
//!
//! # Ephemeral expiry
//!
//! The actor never sleeps. Each ephemeral message arms a detached timer task
//! that selects between the owning room's cancellation token and the TTL,
//! then posts an `ExpireMessage` back into the mailbox. Destroying a room
//! cancels its token, so pending deletions die with the room instead of
//! leaking into a later room that reused the code.

use super::connection::{ConnectionHandle, Frame};
use super::messages::{RegistryMessage, RegistryStatus, RoomInfo};
use crate::access::{AccessController, Decision, PublicCode};
use crate::access::normalize_code;
use crate::errors::RelayError;
use crate::rooms::{ConnectionId, Room, RoomTable};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use waypoint_protocol::{ClientEvent, ServerEvent, SignalKind, SignalPayload};

/// Default channel buffer size for the registry mailbox.
const REGISTRY_CHANNEL_BUFFER: usize = 1000;

/// Handle to the `RoomRegistryActor`.
///
/// This is the public interface for the transport layer and tests. Cloning
/// is cheap; all clones feed the same mailbox.
#[derive(Clone)]
pub struct RoomRegistryActorHandle {
    sender: mpsc::Sender<RegistryMessage>,
    cancel_token: CancellationToken,
}

impl RoomRegistryActorHandle {
    /// Create the registry actor and return a handle to it.
    ///
    /// Spawns the actor task and returns immediately.
    #[must_use]
    pub fn new(relay_id: String, access: AccessController, message_ttl: Duration) -> Self {
        let (sender, receiver) = mpsc::channel(REGISTRY_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();

        let actor = RoomRegistryActor {
            relay_id,
            receiver,
            self_sender: sender.clone(),
            cancel_token: cancel_token.clone(),
            table: RoomTable::new(),
            connections: HashMap::new(),
            access,
            public_code: None,
            message_ttl,
            messages_processed: 0,
        };

        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
        }
    }

    /// Register a freshly opened connection.
    pub async fn attach(
        &self,
        conn_id: ConnectionId,
        handle: ConnectionHandle,
    ) -> Result<(), RelayError> {
        self.sender
            .send(RegistryMessage::Attach { conn_id, handle })
            .await
            .map_err(|e| RelayError::Internal(format!("channel send failed: {e}")))
    }

    /// Submit a parsed inbound event for dispatch.
    pub async fn submit(&self, conn_id: ConnectionId, event: ClientEvent) -> Result<(), RelayError> {
        self.sender
            .send(RegistryMessage::Inbound { conn_id, event })
            .await
            .map_err(|e| RelayError::Internal(format!("channel send failed: {e}")))
    }

    /// Remove a closed connection from its room.
    pub async fn detach(&self, conn_id: ConnectionId) -> Result<(), RelayError> {
        self.sender
            .send(RegistryMessage::Detach { conn_id })
            .await
            .map_err(|e| RelayError::Internal(format!("channel send failed: {e}")))
    }

    /// Snapshot one room by (raw, case-insensitive) code.
    pub async fn get_room(&self, code: &str) -> Result<Option<RoomInfo>, RelayError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryMessage::GetRoom {
                code: normalize_code(code),
                respond_to: tx,
            })
            .await
            .map_err(|e| RelayError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RelayError::Internal(format!("response receive failed: {e}")))
    }

    /// Snapshot registry-wide counters.
    pub async fn get_status(&self) -> Result<RegistryStatus, RelayError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryMessage::GetStatus { respond_to: tx })
            .await
            .map_err(|e| RelayError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RelayError::Internal(format!("response receive failed: {e}")))
    }

    /// Cancel the actor (immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Get a child token for dependent tasks (transport, servers).
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

/// Per-connection state owned by the registry.
///
/// The transport owns the socket; the registry owns the identity and the
/// room binding. `room` is `Some` for at most one room at a time.
#[derive(Debug)]
struct ConnectionState {
    /// Outbound mailbox handle.
    handle: ConnectionHandle,
    /// Username, set by the first `create`/`join`.
    username: Option<String>,
    /// Display attribute (avatar), from `join`.
    avatar: Option<String>,
    /// Current room binding (canonical code).
    room: Option<String>,
}

/// The `RoomRegistryActor` implementation.
pub struct RoomRegistryActor {
    /// Relay instance ID (log correlation).
    relay_id: String,
    /// Message receiver.
    receiver: mpsc::Receiver<RegistryMessage>,
    /// Sender back into our own mailbox, cloned into expiry timer tasks.
    self_sender: mpsc::Sender<RegistryMessage>,
    /// Cancellation token (root).
    cancel_token: CancellationToken,
    /// Room code -> live room.
    table: RoomTable,
    /// Connection states by ID.
    connections: HashMap<ConnectionId, ConnectionState>,
    /// Join validation and capacity rules.
    access: AccessController,
    /// The single live public access code, if any.
    public_code: Option<PublicCode>,
    /// Ephemeral message TTL.
    message_ttl: Duration,
    /// Messages processed (logged at stop).
    messages_processed: u64,
}

impl RoomRegistryActor {
    /// Run the actor message loop.
    #[instrument(skip_all, name = "relay.actor.registry", fields(relay_id = %self.relay_id))]
    async fn run(mut self) {
        info!(
            target: "relay.actor.registry",
            relay_id = %self.relay_id,
            "RoomRegistryActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "relay.actor.registry",
                        relay_id = %self.relay_id,
                        "RoomRegistryActor received cancellation signal"
                    );
                    self.graceful_shutdown();
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.handle_message(message);
                            self.messages_processed += 1;
                        }
                        None => {
                            info!(
                                target: "relay.actor.registry",
                                relay_id = %self.relay_id,
                                "RoomRegistryActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "relay.actor.registry",
            relay_id = %self.relay_id,
            rooms_remaining = self.table.len(),
            messages_processed = self.messages_processed,
            "RoomRegistryActor stopped"
        );
    }

    /// Handle a single message to completion.
    fn handle_message(&mut self, message: RegistryMessage) {
        match message {
            RegistryMessage::Attach { conn_id, handle } => {
                self.handle_attach(conn_id, handle);
            }

            RegistryMessage::Inbound { conn_id, event } => {
                self.dispatch(conn_id, event);
            }

            RegistryMessage::Detach { conn_id } => {
                self.handle_detach(conn_id);
            }

            RegistryMessage::ExpireMessage {
                room_code,
                room_instance,
                message_id,
            } => {
                self.handle_expire(&room_code, room_instance, &message_id);
            }

            RegistryMessage::GetRoom { code, respond_to } => {
                let _ = respond_to.send(self.room_info(&code));
            }

            RegistryMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(RegistryStatus {
                    room_count: self.table.len(),
                    connection_count: self.connections.len(),
                    public_code: self
                        .public_code
                        .as_ref()
                        .map(|public| public.code().to_string()),
                });
            }
        }
    }

    /// Route one inbound event by kind.
    ///
    /// The match is exhaustive over `ClientEvent`: adding a wire kind
    /// without handling it here is a compile error.
    fn dispatch(&mut self, conn_id: ConnectionId, event: ClientEvent) {
        match event {
            ClientEvent::Create { room, username } => {
                self.handle_create(conn_id, &room, username);
            }
            ClientEvent::Join {
                room,
                username,
                avatar,
            } => {
                self.handle_join(conn_id, &room, username, avatar);
            }
            ClientEvent::GenerateCode { code } => {
                self.handle_generate_code(&code);
            }
            ClientEvent::Message { text, disappear } => {
                self.handle_chat_message(conn_id, text, disappear);
            }
            ClientEvent::File {
                name,
                data,
                filetype,
            } => {
                self.handle_file(conn_id, name, data, filetype);
            }
            ClientEvent::Typing { is_typing } => {
                self.handle_typing(conn_id, is_typing);
            }
            ClientEvent::Clear {} => {
                self.handle_clear(conn_id);
            }
            signal @ (ClientEvent::CallRequest { .. }
            | ClientEvent::Offer { .. }
            | ClientEvent::Answer { .. }
            | ClientEvent::Candidate { .. }
            | ClientEvent::CallReject { .. }
            | ClientEvent::CallEnd { .. }
            | ClientEvent::Hangup { .. }
            | ClientEvent::SelfDestruct { .. }) => {
                if let Ok((kind, payload)) = signal.into_signal() {
                    self.handle_signal(conn_id, kind, payload);
                }
            }
        }
    }

    /// Register a new connection (no identity, no room yet).
    fn handle_attach(&mut self, conn_id: ConnectionId, handle: ConnectionHandle) {
        debug!(
            target: "relay.actor.registry",
            conn_id = %conn_id,
            "Connection attached"
        );
        self.connections.insert(
            conn_id,
            ConnectionState {
                handle,
                username: None,
                avatar: None,
                room: None,
            },
        );
    }

    /// A connection closed: leave its room and notify the remaining members.
    fn handle_detach(&mut self, conn_id: ConnectionId) {
        self.leave_current_room(conn_id);
        if self.connections.remove(&conn_id).is_some() {
            debug!(
                target: "relay.actor.registry",
                conn_id = %conn_id,
                "Connection detached"
            );
        }
    }

    /// `create`: bind to a new or existing room, no code validation.
    fn handle_create(&mut self, conn_id: ConnectionId, room_raw: &str, username: String) {
        let code = normalize_code(room_raw);
        if code.is_empty() {
            debug!(target: "relay.actor.registry", conn_id = %conn_id, "Empty room code on create, dropped");
            return;
        }

        let Some(state) = self.connections.get_mut(&conn_id) else {
            warn!(target: "relay.actor.registry", conn_id = %conn_id, "Create from unknown connection");
            return;
        };
        state.username = Some(username);

        // Capacity applies to creates targeting an existing room too.
        if let Err(err) = self.check_room_capacity(&code, conn_id) {
            self.reply_error(conn_id, &err);
            return;
        }

        self.bind_to_room(conn_id, &code);
        self.send_to_one(conn_id, &ServerEvent::Created { room: code.clone() });
        self.broadcast_users(&code);

        info!(
            target: "relay.actor.registry",
            conn_id = %conn_id,
            room = %code,
            "Room created or joined via create"
        );
    }

    /// `join`: validate the code, enforce capacity, then bind.
    fn handle_join(
        &mut self,
        conn_id: ConnectionId,
        room_raw: &str,
        username: String,
        avatar: Option<String>,
    ) {
        {
            let Some(state) = self.connections.get_mut(&conn_id) else {
                warn!(target: "relay.actor.registry", conn_id = %conn_id, "Join from unknown connection");
                return;
            };
            state.username = Some(username);
            state.avatar = avatar;
        }

        let decision = self
            .access
            .validate_join(room_raw, self.public_code.as_ref());

        let target = match decision {
            Decision::Reject => {
                debug!(
                    target: "relay.actor.registry",
                    conn_id = %conn_id,
                    "Join rejected: invalid code"
                );
                self.reply_error(conn_id, &RelayError::InvalidCode);
                return;
            }
            Decision::Accept { target } => target,
        };

        if let Err(err) = self.check_room_capacity(&target, conn_id) {
            debug!(
                target: "relay.actor.registry",
                conn_id = %conn_id,
                room = %target,
                "Join rejected: room full"
            );
            self.reply_error(conn_id, &err);
            return;
        }

        self.bind_to_room(conn_id, &target);
        self.send_to_one(conn_id, &ServerEvent::Joined { room: target.clone() });
        self.broadcast_users(&target);

        info!(
            target: "relay.actor.registry",
            conn_id = %conn_id,
            room = %target,
            "Participant joined"
        );
    }

    /// Install a new process-wide public code, replacing any previous one.
    fn handle_generate_code(&mut self, raw: &str) {
        let code = normalize_code(raw);
        if code.is_empty() {
            debug!(target: "relay.actor.registry", "Empty public code, dropped");
            return;
        }

        let replaced = self.public_code.is_some();
        self.public_code = Some(PublicCode::new(code));

        // The code itself is a credential; log the fact, not the value.
        info!(
            target: "relay.actor.registry",
            replaced_previous = replaced,
            "Public access code installed"
        );
    }

    /// `message`: fan out to the room; arm expiry when ephemeral.
    fn handle_chat_message(&mut self, conn_id: ConnectionId, text: String, disappear: bool) {
        let Some((room, sender)) = self.room_and_sender(conn_id) else {
            self.drop_unbound(conn_id, "message");
            return;
        };

        let id = Uuid::new_v4().simple().to_string();
        self.broadcast(
            &room,
            &ServerEvent::Message {
                id: id.clone(),
                sender,
                text,
            },
        );

        if disappear {
            self.schedule_expiry(&room, id);
        }
    }

    /// `file`: fan out to the room; files are always ephemeral.
    fn handle_file(&mut self, conn_id: ConnectionId, name: String, data: String, filetype: String) {
        let Some((room, sender)) = self.room_and_sender(conn_id) else {
            self.drop_unbound(conn_id, "file");
            return;
        };

        let id = Uuid::new_v4().simple().to_string();
        self.broadcast(
            &room,
            &ServerEvent::File {
                id: id.clone(),
                sender,
                name,
                data,
                filetype,
            },
        );

        self.schedule_expiry(&room, id);
    }

    fn handle_typing(&mut self, conn_id: ConnectionId, is_typing: bool) {
        let Some((room, sender)) = self.room_and_sender(conn_id) else {
            self.drop_unbound(conn_id, "typing");
            return;
        };
        self.broadcast(&room, &ServerEvent::Typing { sender, is_typing });
    }

    fn handle_clear(&mut self, conn_id: ConnectionId) {
        let Some((room, _)) = self.room_and_sender(conn_id) else {
            self.drop_unbound(conn_id, "clear");
            return;
        };
        self.broadcast(&room, &ServerEvent::Clear {});
    }

    /// Relay an opaque signaling event to the whole room, sender included.
    fn handle_signal(&mut self, conn_id: ConnectionId, kind: SignalKind, payload: SignalPayload) {
        let Some((room, sender)) = self.room_and_sender(conn_id) else {
            // No room, no relay target.
            self.drop_unbound(conn_id, kind.as_str());
            return;
        };

        let event = ServerEvent::signal(kind, sender.clone(), payload);
        self.broadcast(&room, &event);

        // Side effects independent of the relay itself.
        match kind {
            SignalKind::SelfDestruct => {
                self.broadcast(&room, &ServerEvent::WipeChat {});
            }
            SignalKind::Hangup => {
                self.broadcast(
                    &room,
                    &ServerEvent::System {
                        text: format!("{sender} ended the call"),
                    },
                );
            }
            _ => {}
        }
    }

    /// Expiry timer fired: broadcast the deletion only if the same room
    /// instance is still alive.
    fn handle_expire(&mut self, room_code: &str, room_instance: Uuid, message_id: &str) {
        match self.table.get(room_code) {
            Some(room) if room.instance_id() == room_instance => {
                self.broadcast(
                    room_code,
                    &ServerEvent::Delete {
                        id: message_id.to_string(),
                    },
                );
            }
            _ => {
                debug!(
                    target: "relay.actor.registry",
                    room = %room_code,
                    message_id = %message_id,
                    "Expiry suppressed: room instance gone"
                );
            }
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Reject when the target room exists and is at capacity.
    ///
    /// Runs inside the same actor message as the subsequent insert, so no
    /// other join can interleave between check and insert.
    fn check_room_capacity(&self, code: &str, conn_id: ConnectionId) -> Result<(), RelayError> {
        match self.table.get(code) {
            Some(room) if !room.contains(conn_id) => {
                self.access.check_capacity(room.member_count())
            }
            _ => Ok(()),
        }
    }

    /// Bind a connection to a room, implicitly leaving any previous room.
    ///
    /// Rebinding to the current room is a no-op: a redundant `create`/`join`
    /// must not tear the room down, so the instance id, pending expiry
    /// timers, and the member order all survive it.
    fn bind_to_room(&mut self, conn_id: ConnectionId, code: &str) {
        let already_bound = self
            .connections
            .get(&conn_id)
            .is_some_and(|state| state.room.as_deref() == Some(code));
        if already_bound {
            return;
        }

        self.leave_current_room(conn_id);
        self.ensure_room(code);
        self.table.add_member(code, conn_id);
        if let Some(state) = self.connections.get_mut(&conn_id) {
            state.room = Some(code.to_string());
        }
    }

    /// Create the room if absent; a new room minted under the live public
    /// code consumes that code (it can no longer name a different new room).
    fn ensure_room(&mut self, code: &str) {
        let existed = self.table.get(code).is_some();
        let parent = self.cancel_token.clone();
        let instance_id = self.table.create_or_get(code, &parent).instance_id();

        if !existed {
            if let Some(public) = self.public_code.as_mut() {
                if public.code() == code {
                    public.bind(instance_id);
                }
            }
        }
    }

    /// Remove the connection from its current room, if any. Notifies the
    /// remaining members or tears the room down when it empties.
    fn leave_current_room(&mut self, conn_id: ConnectionId) {
        let prior = self
            .connections
            .get_mut(&conn_id)
            .and_then(|state| state.room.take());

        let Some(code) = prior else {
            return;
        };

        match self.table.remove_member(&code, conn_id) {
            Some(destroyed) => self.on_room_destroyed(&destroyed),
            None => self.broadcast_users(&code),
        }
    }

    /// A room's member set emptied. Timers were cancelled inside the table;
    /// release the public code if this exact room instance was minted from
    /// it. A code that merely shares its string with a pre-existing room was
    /// never consumed and stays live.
    fn on_room_destroyed(&mut self, room: &Room) {
        let minted_here = self
            .public_code
            .as_ref()
            .is_some_and(|public| public.is_bound_to(room.instance_id()));
        if minted_here {
            self.public_code = None;
            info!(
                target: "relay.actor.registry",
                room = %room.code(),
                "Public access code released with its room"
            );
        }

        info!(
            target: "relay.actor.registry",
            room = %room.code(),
            "Room destroyed"
        );
    }

    /// Log and drop an event that requires a room binding. No reply goes
    /// out; `UnknownRoom` is not a reportable error.
    fn drop_unbound(&self, conn_id: ConnectionId, kind: &str) {
        debug!(
            target: "relay.actor.registry",
            conn_id = %conn_id,
            kind,
            error = %RelayError::UnknownRoom,
            "Event from unbound connection dropped"
        );
    }

    /// Username and room binding for event handlers that require both.
    /// Events from unbound connections are silently dropped by callers.
    fn room_and_sender(&self, conn_id: ConnectionId) -> Option<(String, String)> {
        let state = self.connections.get(&conn_id)?;
        let room = state.room.clone()?;
        let sender = state.username.clone()?;
        Some((room, sender))
    }

    /// Serialize once and push to every live member of a room.
    ///
    /// Closed or saturated mailboxes are skipped silently: best-effort, no
    /// retry, no error surfaced to the sender.
    fn broadcast(&self, code: &str, event: &ServerEvent) {
        let Some(members) = self.table.members_of(code) else {
            return;
        };

        let Ok(json) = serde_json::to_string(event) else {
            warn!(target: "relay.actor.registry", room = %code, "Failed to serialize outbound event");
            return;
        };
        let frame: Frame = Arc::from(json.as_str());

        for conn_id in members {
            let Some(state) = self.connections.get(&conn_id) else {
                continue;
            };
            if let Err(err) = state.handle.try_deliver(Arc::clone(&frame)) {
                debug!(
                    target: "relay.actor.registry",
                    conn_id = %conn_id,
                    room = %code,
                    error = %err,
                    "Skipping undeliverable member"
                );
            }
        }
    }

    /// Direct reply to one connection (acks and join errors only).
    fn send_to_one(&self, conn_id: ConnectionId, event: &ServerEvent) {
        let Some(state) = self.connections.get(&conn_id) else {
            return;
        };
        let Ok(json) = serde_json::to_string(event) else {
            warn!(target: "relay.actor.registry", conn_id = %conn_id, "Failed to serialize reply");
            return;
        };
        if let Err(err) = state.handle.try_deliver(Arc::from(json.as_str())) {
            debug!(
                target: "relay.actor.registry",
                conn_id = %conn_id,
                error = %err,
                "Reply dropped: connection unreachable"
            );
        }
    }

    /// Send the current member list (join order) to the whole room.
    fn broadcast_users(&self, code: &str) {
        let Some(members) = self.table.members_of(code) else {
            return;
        };
        let users = members
            .iter()
            .filter_map(|conn_id| {
                self.connections
                    .get(conn_id)
                    .and_then(|state| state.username.clone())
            })
            .collect();
        self.broadcast(code, &ServerEvent::Users { users });
    }

    /// Error replies go to the requester only; non-reportable errors are a
    /// silent no-op.
    fn reply_error(&self, conn_id: ConnectionId, err: &RelayError) {
        if err.is_reportable() {
            self.send_to_one(
                conn_id,
                &ServerEvent::Error {
                    text: err.client_message(),
                },
            );
        }
    }

    /// Arm a one-shot expiry timer keyed by (room instance, message id).
    fn schedule_expiry(&self, room_code: &str, message_id: String) {
        let Some(room) = self.table.get(room_code) else {
            return;
        };

        let token = room.timer_token();
        let room_instance = room.instance_id();
        let room_code = room_code.to_string();
        let delay = self.message_ttl;
        let sender = self.self_sender.clone();

        debug!(
            target: "relay.actor.registry",
            room = %room_code,
            message_id = %message_id,
            ttl_secs = delay.as_secs(),
            "Ephemeral expiry armed"
        );

        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {
                    // Room destroyed first: the deletion never fires.
                }
                () = tokio::time::sleep(delay) => {
                    let _ = sender
                        .send(RegistryMessage::ExpireMessage {
                            room_code,
                            room_instance,
                            message_id,
                        })
                        .await;
                }
            }
        });
    }

    /// Snapshot one room for introspection.
    fn room_info(&self, code: &str) -> Option<RoomInfo> {
        let room = self.table.get(code)?;
        let members = room
            .members()
            .iter()
            .filter_map(|conn_id| {
                self.connections
                    .get(conn_id)
                    .and_then(|state| state.username.clone())
            })
            .collect();

        Some(RoomInfo {
            code: room.code().to_string(),
            instance_id: room.instance_id(),
            members,
            created_at: room.created_at().timestamp(),
        })
    }

    /// Tear down all rooms, cancelling every pending expiry timer.
    fn graceful_shutdown(&mut self) {
        info!(
            target: "relay.actor.registry",
            relay_id = %self.relay_id,
            rooms = self.table.len(),
            connections = self.connections.len(),
            "Performing graceful shutdown"
        );

        self.table.clear();
        self.connections.clear();
        self.public_code = None;
    }
}
