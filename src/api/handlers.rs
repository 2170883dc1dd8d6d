//! API request handlers
//!
//! Incremental polling and message injection for display clients, plus
//! read-only history / stats and manual acknowledgement.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::cursor::CursorRegistry;
use super::envelope::ApiError;
use crate::broadcast::{BroadcastService, BroadcastStats};
use crate::config::defaults::DEFAULT_CLIENT_ID;
use crate::config::ApiConfig;
use crate::types::{BroadcastHistoryEntry, BroadcastMessage, BroadcastPriority, EventSeverity};

/// Shared state for all handlers.
#[derive(Clone)]
pub struct ApiState {
    pub service: BroadcastService,
    pub cursors: Arc<CursorRegistry>,
    pub config: Arc<ApiConfig>,
}

impl ApiState {
    pub fn new(service: BroadcastService, config: ApiConfig) -> Self {
        Self {
            service,
            cursors: Arc::new(CursorRegistry::new(
                config.max_tracked_clients,
                config.client_idle_timeout_secs,
            )),
            config: Arc::new(config),
        }
    }
}

// ============================================================================
// GET /api/broadcast
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollQuery {
    pub client_id: Option<String>,
    /// Epoch milliseconds. Unparseable values count as 0.
    pub since: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    pub broadcasts: Vec<BroadcastHistoryEntry>,
    pub next_poll_in: u64,
    pub server_time: DateTime<Utc>,
    pub connection_id: String,
}

/// Entries received since the later of the client's cursor and `since`.
pub async fn poll_broadcasts(
    State(state): State<ApiState>,
    Query(query): Query<PollQuery>,
) -> Result<Json<PollResponse>, ApiError> {
    let client_id = query
        .client_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string());
    let since = query
        .since
        .as_deref()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    let last_seen = state
        .cursors
        .get(&client_id)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
        .max(since);

    // Taken before reading history so nothing dispatched in between is skipped
    let now = Utc::now();
    let broadcasts: Vec<BroadcastHistoryEntry> = state
        .service
        .get_history(Some(state.config.poll_history_window))
        .into_iter()
        .filter(|entry| entry.received_at > last_seen)
        .collect();
    state.cursors.advance(&client_id, now);

    debug!(client_id = %client_id, delivered = broadcasts.len(), "Poll served");
    Ok(Json(PollResponse {
        broadcasts,
        next_poll_in: state.config.next_poll_in_ms,
        server_time: now,
        connection_id: client_id,
    }))
}

// ============================================================================
// POST /api/broadcast
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostBroadcastRequest {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    /// Applies to `system` messages.
    #[serde(default)]
    pub priority: Option<BroadcastPriority>,
    /// Applies to `alert` messages.
    #[serde(default)]
    pub severity: Option<EventSeverity>,
}

#[derive(Debug, Serialize)]
pub struct PostBroadcastResponse {
    pub success: bool,
    pub broadcast: BroadcastMessage,
}

/// Inject a system message, alert or DJ announcement.
pub async fn post_broadcast(
    State(state): State<ApiState>,
    payload: Result<Json<PostBroadcastRequest>, JsonRejection>,
) -> Result<Json<PostBroadcastResponse>, ApiError> {
    let Json(request) = payload?;

    let headline = request.headline.filter(|h| !h.trim().is_empty());
    let content = request.content.filter(|c| !c.trim().is_empty());
    let (Some(headline), Some(content)) = (headline, content) else {
        return Err(ApiError::BadRequest(
            "headline and content are required".to_string(),
        ));
    };

    let kind = request.kind.as_deref().unwrap_or("system");
    let broadcast = match kind {
        "alert" => state
            .service
            .broadcast_alert(headline, content, request.severity),
        "dj" | "dj_announcement" => state.service.broadcast_dj_announcement(content, None),
        other => {
            if other != "system" {
                debug!(kind = %other, "Unknown broadcast type, sending as system");
            }
            state
                .service
                .broadcast_system(headline, content, request.priority)
        }
    };

    info!(
        broadcast_id = %broadcast.id,
        kind = %broadcast.broadcast_type,
        "Broadcast injected via API"
    );
    Ok(Json(PostBroadcastResponse {
        success: true,
        broadcast,
    }))
}

/// CORS preflight for clients that send a bare `OPTIONS`.
pub async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

// ============================================================================
// History / stats / acknowledge / health
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub history: Vec<BroadcastHistoryEntry>,
    pub count: usize,
}

pub async fn get_history(
    State(state): State<ApiState>,
    Query(query): Query<HistoryQuery>,
) -> Json<HistoryResponse> {
    let history = state.service.get_history(query.limit);
    Json(HistoryResponse {
        count: history.len(),
        history,
    })
}

pub async fn get_stats(State(state): State<ApiState>) -> Json<BroadcastStats> {
    Json(state.service.get_stats())
}

#[derive(Debug, Serialize)]
pub struct AcknowledgeResponse {
    pub success: bool,
    pub id: String,
}

pub async fn acknowledge_broadcast(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<AcknowledgeResponse>, ApiError> {
    if state.service.acknowledge_broadcast(&id) {
        Ok(Json(AcknowledgeResponse { success: true, id }))
    } else {
        Err(ApiError::NotFound(format!("broadcast '{id}' not found")))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub tracked_clients: usize,
}

pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        tracked_clients: state.cursors.len(),
    })
}
