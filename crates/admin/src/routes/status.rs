use std::collections::BTreeMap;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::SharedState;

/// GET /api/status
///
/// Returns the gateway's liveness, the currently active blocks, and the
/// toggle snapshot.
pub async fn get_status(State(state): State<SharedState>) -> impl IntoResponse {
    let blocks = match state.store.list_blocks().await {
        Ok(blocks) => blocks,
        Err(e) => {
            tracing::error!(error = %e, "failed to list blocks");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"status": "error", "message": "failed to list blocks"})),
            );
        }
    };

    // Sorted for stable output.
    let blocks: BTreeMap<String, &'static str> = blocks
        .into_iter()
        .map(|(ip, kind)| (ip, kind.as_str()))
        .collect();

    (
        StatusCode::OK,
        Json(json!({
            "status": "active",
            "active_blocks": blocks,
            "toggles": state.toggles.snapshot(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "uptime_secs": state.start_time.elapsed().as_secs(),
        })),
    )
}
