//! REST API module using Axum
//!
//! Dissemination surface for display clients:
//! - incremental polling with per-client cursors
//! - message injection (system / alert / DJ announcement)
//! - history, stats and manual acknowledgement
//!
//! CORS is permissive: any display page may poll.

pub mod cursor;
pub mod envelope;
pub mod handlers;
pub mod middleware;
mod routes;

pub use cursor::CursorRegistry;
pub use envelope::ApiError;
pub use handlers::ApiState;

use axum::middleware as axum_mw;
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the complete application router.
pub fn create_app(state: ApiState) -> Router {
    Router::new()
        .merge(routes::broadcast_routes(state.clone()))
        .merge(routes::health_routes(state))
        // Middleware (last added runs first)
        .layer(CatchPanicLayer::custom(envelope::panic_response))
        .layer(axum_mw::from_fn(middleware::no_cache_headers))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
