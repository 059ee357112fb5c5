//! Waypoint relay.
//!
//! Stateful WebSocket relay for room-based messaging and call signaling.
//!
//! # Startup flow
//!
//! 1. Load configuration from environment
//! 2. Spawn the `RoomRegistryActor` (all room state lives there)
//! 3. Bind the listener, then serve `/ws` plus health endpoints
//! 4. Wait for shutdown signal (Ctrl+C or SIGTERM)
//! 5. Mark not-ready, cancel the actor, drain briefly, exit

#![warn(clippy::pedantic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use waypoint_relay::access::AccessController;
use waypoint_relay::actors::RoomRegistryActorHandle;
use waypoint_relay::config::Config;
use waypoint_relay::observability::{health_router, HealthState};
use waypoint_relay::transport::relay_router;

/// Grace period for in-flight deliveries after cancellation.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "waypoint_relay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Waypoint relay");

    let config = Config::from_env().map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    info!(
        relay_id = %config.relay_id,
        bind_address = %config.bind_address,
        max_room_members = config.max_room_members,
        message_ttl_seconds = config.message_ttl_seconds,
        secret_code_count = config.secret_codes.len(),
        "Configuration loaded successfully"
    );

    let access = AccessController::new(config.exposed_secret_codes(), config.max_room_members);
    let registry = RoomRegistryActorHandle::new(
        config.relay_id.clone(),
        access,
        Duration::from_secs(config.message_ttl_seconds),
    );
    info!("Room registry actor started");

    let health_state = Arc::new(HealthState::new());

    let app = relay_router(registry.clone())
        .merge(health_router(Arc::clone(&health_state), registry.clone()));

    let addr: SocketAddr = config
        .bind_address
        .parse()
        .with_context(|| format!("Invalid bind address: {}", config.bind_address))?;

    // Bind before spawning to fail fast on bind errors.
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    info!(addr = %addr, "Listener bound successfully");

    health_state.set_ready();

    let server_token = registry.child_token();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        server_token.cancelled().await;
        info!("Server shutting down");
    });

    let server_task = tokio::spawn(async move {
        if let Err(e) = server.await {
            error!(error = %e, "Server failed");
        }
    });

    info!("Waypoint relay running - press Ctrl+C to shutdown");
    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");

    // Stop admitting new connections first, then tear down the actor. The
    // cancellation propagates to the server task and every room timer.
    health_state.set_not_ready();
    registry.cancel();

    tokio::time::sleep(SHUTDOWN_DRAIN).await;
    server_task.abort();

    info!("Waypoint relay shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed; without them the service
/// cannot shut down gracefully at all.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
