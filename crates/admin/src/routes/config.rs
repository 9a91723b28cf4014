use std::collections::HashMap;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::SharedState;

/// PATCH /api/config
///
/// Body is a `{feature: bool}` map. Each recognized toggle is applied to
/// the live registry and takes effect on the very next request. Unknown
/// features are reported back, not applied.
pub async fn patch_config(
    State(state): State<SharedState>,
    Json(updates): Json<HashMap<String, bool>>,
) -> impl IntoResponse {
    let mut ignored = Vec::new();
    for (feature, enabled) in &updates {
        if state.toggles.set(feature, *enabled) {
            tracing::info!(feature = %feature, enabled, "feature toggle applied live");
        } else {
            ignored.push(feature.clone());
        }
    }

    (
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "toggles applied (live, no restart needed)",
            "toggles": state.toggles.snapshot(),
            "ignored": ignored,
        })),
    )
}
