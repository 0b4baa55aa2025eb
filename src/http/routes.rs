//! HTTP route definitions

use axum::{
    extract::State,
    http::{header, Method},
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::warn;

use crate::app::AppState;
use crate::game::MatchPhase;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let static_dir = state.config.static_dir.clone();
    let cors = cors_layer(state.config.client_origin.as_deref());

    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .with_state(state);

    // The browser client is served from the same origin
    let router = if static_dir.is_dir() {
        let index = static_dir.join("index.html");
        router.fallback_service(ServeDir::new(static_dir).not_found_service(ServeFile::new(index)))
    } else {
        warn!(dir = %static_dir.display(), "Static directory not found, serving API only");
        router
    };

    let router = router
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http());

    match cors {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

/// CORS for a separately hosted client (comma-separated origins)
fn cors_layer(client_origin: Option<&str>) -> Option<CorsLayer> {
    let origins = parse_origins(client_origin?);
    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE]),
    )
}

fn parse_origins(list: &str) -> Vec<header::HeaderValue> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<header::HeaderValue>().ok())
        .collect()
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    players: usize,
    bots: usize,
    connections: usize,
    match_phase: MatchPhase,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = &state.arena.status;
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        players: state.arena.player_count(),
        bots: status.bot_count(),
        connections: state.sessions.len(),
        match_phase: status.phase(),
    })
}
