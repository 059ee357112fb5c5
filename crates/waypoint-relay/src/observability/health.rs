//! Health endpoints for the relay.
//!
//! Kubernetes-compatible probes plus a small introspection endpoint:
//! - `GET /health` - liveness (is the process running?)
//! - `GET /ready` - readiness (is the registry accepting traffic?)
//! - `GET /status` - registry counters as JSON
//!
//! `/status` deliberately omits the public access code value; it reports
//! only whether one is live.

use crate::actors::RoomRegistryActorHandle;
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Liveness and readiness flags for the relay process.
#[derive(Debug)]
pub struct HealthState {
    /// Always true after startup.
    live: AtomicBool,
    /// True once the listener is bound; cleared at shutdown so load
    /// balancers stop routing new connections first.
    ready: AtomicBool,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (live=true, ready=false).
    #[must_use]
    pub fn new() -> Self {
        Self {
            live: AtomicBool::new(true),
            ready: AtomicBool::new(false),
        }
    }

    /// Mark the relay as ready to accept connections.
    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Mark the relay as not ready (shutdown in progress).
    pub fn set_not_ready(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Shared state for the health router.
#[derive(Clone)]
struct HealthRouterState {
    health: Arc<HealthState>,
    registry: RoomRegistryActorHandle,
}

/// `GET /status` response body.
#[derive(Debug, Serialize)]
struct StatusBody {
    rooms: usize,
    connections: usize,
    public_code_live: bool,
}

/// Build the health router.
pub fn health_router(health: Arc<HealthState>, registry: RoomRegistryActorHandle) -> Router {
    Router::new()
        .route("/health", get(liveness_handler))
        .route("/ready", get(readiness_handler))
        .route("/status", get(status_handler))
        .with_state(HealthRouterState { health, registry })
}

async fn liveness_handler(State(state): State<HealthRouterState>) -> StatusCode {
    if state.health.is_live() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn readiness_handler(State(state): State<HealthRouterState>) -> StatusCode {
    if state.health.is_ready() && !state.registry.is_cancelled() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn status_handler(
    State(state): State<HealthRouterState>,
) -> Result<Json<StatusBody>, StatusCode> {
    let status = state
        .registry
        .get_status()
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;

    Ok(Json(StatusBody {
        rooms: status.room_count,
        connections: status.connection_count,
        public_code_live: status.public_code.is_some(),
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::access::AccessController;
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::util::ServiceExt;

    fn registry() -> RoomRegistryActorHandle {
        RoomRegistryActorHandle::new(
            "relay-test".to_string(),
            AccessController::new(vec![], 10),
            Duration::from_secs(60),
        )
    }

    #[test]
    fn test_health_state_defaults() {
        let state = HealthState::new();
        assert!(state.is_live());
        assert!(!state.is_ready());
    }

    #[test]
    fn test_ready_toggle() {
        let state = HealthState::new();
        state.set_ready();
        assert!(state.is_ready());
        state.set_not_ready();
        assert!(!state.is_ready());
    }

    #[tokio::test]
    async fn test_liveness_endpoint_returns_ok() {
        let app = health_router(Arc::new(HealthState::new()), registry());

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_readiness_tracks_health_state() {
        let health = Arc::new(HealthState::new());
        let reg = registry();

        let app = health_router(Arc::clone(&health), reg.clone());
        let response = app
            .clone()
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        health.set_ready();
        let response = app
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        reg.cancel();
    }

    #[tokio::test]
    async fn test_readiness_fails_after_registry_cancel() {
        let health = Arc::new(HealthState::new());
        health.set_ready();
        let reg = registry();
        reg.cancel();

        let app = health_router(health, reg);
        let response = app
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_status_reports_counters() {
        let app = health_router(Arc::new(HealthState::new()), registry());

        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["rooms"], 0);
        assert_eq!(json["connections"], 0);
        assert_eq!(json["public_code_live"], false);
    }
}
