//! API route definitions
//!
//! - GET/POST/OPTIONS /api/broadcast - poll for new messages / inject one
//! - GET /api/broadcast/history - most-recent-first history
//! - GET /api/broadcast/stats - service counters
//! - POST /api/broadcast/:id/acknowledge - manual acknowledgement
//! - GET /health - liveness

use axum::{routing::{get, post}, Router};

use super::handlers::{self, ApiState};

/// Broadcast routes.
pub fn broadcast_routes(state: ApiState) -> Router {
    Router::new()
        .route(
            "/api/broadcast",
            get(handlers::poll_broadcasts)
                .post(handlers::post_broadcast)
                .options(handlers::preflight),
        )
        .route("/api/broadcast/history", get(handlers::get_history))
        .route("/api/broadcast/stats", get(handlers::get_stats))
        .route("/api/broadcast/:id/acknowledge", post(handlers::acknowledge_broadcast))
        .with_state(state)
}

pub fn health_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .with_state(state)
}
