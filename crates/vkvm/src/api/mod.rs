//! HTTP control API.
//!
//! One axum server carries the whole external surface on the configured
//! port (default 18080): the REST control endpoints, the `/ws` control
//! channel upgrade, and (out of band, same port number) the UDP burst
//! socket bound by the transport layer.
//!
//! | Route | Purpose |
//! |---|---|
//! | `POST /api/switch?profile=N&propagate=B` | switch profile |
//! | `GET /api/status` | current + available profiles |
//! | `GET /api/config` | full config |
//! | `POST /api/config` | replace config (push-sync) |
//! | `GET /api/discover` | LAN sweep for peer instances |
//! | `GET /health` | liveness, no auth |
//! | `GET /ws` | control channel WebSocket |
//!
//! Bearer-token auth applies to everything except `/health` whenever a
//! token is configured. The listener binds IPv4 explicitly — some OSes
//! otherwise produce an IPv6-only bind that LAN peers cannot reach.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::extract::{Query, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use vkvm_core::config::Config;
use vkvm_core::ConfigManager;

use crate::session::switcher::{SwitchError, Switcher};

pub mod discover;
pub mod ws;

pub use ws::PeerRegistry;

/// Shared state for all API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<ConfigManager>,
    pub switcher: Arc<Switcher>,
    pub peers: Arc<PeerRegistry>,
    /// Bearer token captured at server start; empty disables auth.
    pub token: String,
}

/// Builds the full router with auth middleware applied.
pub fn router(state: ApiState) -> Router {
    let protected = Router::new()
        .route("/api/switch", post(handle_switch))
        .route("/api/status", get(handle_status))
        .route("/api/config", get(handle_get_config).post(handle_post_config))
        .route("/api/discover", get(handle_discover))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    // `/ws` authenticates in-band with the `auth` control message (the
    // upgrade request from agents carries no headers), `/health` is the
    // unauthenticated liveness probe.
    Router::new()
        .route("/health", get(handle_health))
        .route("/ws", get(ws::handle_upgrade))
        .merge(protected)
        .with_state(state)
}

/// Serves the API until the shutdown flag is set.
///
/// # Errors
///
/// Returns an error when the IPv4 listener cannot be bound; the caller
/// logs it and continues without remote control.
pub async fn serve(
    state: ApiState,
    port: u16,
    mut shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "control API listening");

    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            loop {
                if *shutdown_rx.borrow() {
                    break;
                }
                if shutdown_rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await?;

    info!("control API stopped");
    Ok(())
}

// ── Middleware ────────────────────────────────────────────────────────────────

async fn require_bearer(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.token.is_empty() {
        let expected = format!("Bearer {}", state.token);
        let presented = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        if presented != Some(expected.as_str()) {
            return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        }
    }
    next.run(request).await
}

// ── Handlers ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SwitchQuery {
    profile: String,
    propagate: Option<bool>,
}

#[derive(Debug, Serialize)]
struct SwitchResponse {
    status: &'static str,
    profile: String,
}

async fn handle_switch(
    State(state): State<ApiState>,
    Query(query): Query<SwitchQuery>,
) -> Response {
    let propagate = query.propagate.unwrap_or(true);
    info!(profile = %query.profile, propagate, "switch requested via API");

    match state.switcher.switch_to(&query.profile, propagate).await {
        Ok(()) => Json(SwitchResponse {
            status: "ok",
            profile: query.profile,
        })
        .into_response(),
        Err(SwitchError::ProfileNotFound(name)) => (
            StatusCode::NOT_FOUND,
            format!("profile not found: {name}"),
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "switch failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub current_profile: String,
    pub profiles: Vec<String>,
}

async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let config = state.config.get();
    Json(StatusResponse {
        current_profile: config.general.current_profile.clone(),
        profiles: config.profiles.iter().map(|p| p.name.clone()).collect(),
    })
}

async fn handle_get_config(State(state): State<ApiState>) -> Json<Config> {
    Json(state.config.get())
}

#[derive(Debug, Serialize)]
struct OkResponse {
    status: &'static str,
}

async fn handle_post_config(
    State(state): State<ApiState>,
    Json(new_config): Json<Config>,
) -> Response {
    info!("configuration replaced via API push-sync");
    match state.config.replace(new_config) {
        Ok(()) => Json(OkResponse { status: "ok" }).into_response(),
        Err(e) => {
            warn!(error = %e, "failed to persist pushed configuration");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to save configuration",
            )
                .into_response()
        }
    }
}

async fn handle_discover(State(state): State<ApiState>) -> Response {
    let port = state.config.get().general.api_port;
    let found = discover::scan_lan(port).await;
    info!(count = found.len(), "LAN scan finished");
    Json(found).into_response()
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
