//! WebSocket transport.
//!
//! One handler task and one writer task per connection. The handler parses
//! inbound frames into [`ClientEvent`]s and submits them to the registry;
//! the writer drains the connection's outbound mailbox into the socket.
//! State lives entirely in the registry - the transport holds no room or
//! identity data of its own.
//!
//! Malformed frames (invalid JSON, unknown `kind`) are logged and dropped
//! without a reply; the connection stays up.

use crate::actors::{ConnectionHandle, RoomRegistryActorHandle};
use crate::errors::RelayError;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;
use waypoint_protocol::ClientEvent;

/// Build the relay router: the WebSocket endpoint plus request tracing.
pub fn relay_router(registry: RoomRegistryActorHandle) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(registry)
        .layer(TraceLayer::new_for_http())
}

async fn ws_handler(
    State(registry): State<RoomRegistryActorHandle>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, registry))
}

/// Drive one WebSocket connection until it closes.
async fn handle_socket(socket: WebSocket, registry: RoomRegistryActorHandle) {
    let conn_id = Uuid::new_v4();
    let (conn_handle, mut outbound) = ConnectionHandle::channel(conn_id);

    if let Err(err) = registry.attach(conn_id, conn_handle).await {
        warn!(
            target: "relay.transport",
            conn_id = %conn_id,
            error = %err,
            "Failed to attach connection, closing"
        );
        return;
    }

    info!(target: "relay.transport", conn_id = %conn_id, "WebSocket connection opened");

    let (mut sink, mut stream) = socket.split();

    // Writer task: outbound mailbox -> socket. Exits when the mailbox closes
    // (connection detached) or the peer stops accepting frames.
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if sink.send(Message::Text(frame.to_string())).await.is_err() {
                break;
            }
        }
    });

    // Read loop: socket -> registry. A transport error on the stream ends
    // the session the same way a clean close does.
    loop {
        tokio::select! {
            message = stream.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        submit_frame(&registry, conn_id, text.as_bytes()).await;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        submit_frame(&registry, conn_id, &data).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Err(err)) => {
                        debug!(
                            target: "relay.transport",
                            conn_id = %conn_id,
                            error = %err,
                            "WebSocket read error, closing"
                        );
                        break;
                    }
                }
            }
            _ = &mut writer => {
                // Writer died (peer gone); nothing left to deliver.
                break;
            }
        }
    }

    writer.abort();

    if let Err(err) = registry.detach(conn_id).await {
        debug!(
            target: "relay.transport",
            conn_id = %conn_id,
            error = %err,
            "Detach failed during teardown"
        );
    }

    info!(target: "relay.transport", conn_id = %conn_id, "WebSocket connection closed");
}

/// Parse one inbound frame and hand it to the registry.
async fn submit_frame(registry: &RoomRegistryActorHandle, conn_id: Uuid, raw: &[u8]) {
    let event: ClientEvent = match serde_json::from_slice(raw) {
        Ok(event) => event,
        Err(err) => {
            debug!(
                target: "relay.transport",
                conn_id = %conn_id,
                error = %RelayError::MalformedPayload(err.to_string()),
                "Malformed frame dropped"
            );
            return;
        }
    };

    if let Err(err) = registry.submit(conn_id, event).await {
        warn!(
            target: "relay.transport",
            conn_id = %conn_id,
            error = %err,
            "Failed to submit event to registry"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::access::AccessController;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::time::Duration;
    use tower::util::ServiceExt;

    fn registry() -> RoomRegistryActorHandle {
        RoomRegistryActorHandle::new(
            "relay-test".to_string(),
            AccessController::new(vec![], 10),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn test_ws_route_rejects_plain_http() {
        let app = relay_router(registry());

        let response = app
            .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();
        // No upgrade headers: rejected before any socket work happens.
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_unknown_path_returns_404() {
        let app = relay_router(registry());

        let response = app
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
