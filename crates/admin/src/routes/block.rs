use std::time::Duration;

use aegisedge_store::BlockType;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::state::SharedState;

/// Fallback when the duration literal cannot be parsed.
const DEFAULT_BLOCK: Duration = Duration::from_secs(24 * 60 * 60);

/// Far-future expiry standing in for "forever".
const PERMANENT_BLOCK: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

#[derive(Debug, Deserialize)]
pub struct BlockRequest {
    pub ip: String,
    #[serde(default)]
    pub duration: String,
}

#[derive(Debug, Deserialize)]
pub struct UnblockQuery {
    pub ip: Option<String>,
}

/// POST /api/block
///
/// Body `{ip, duration}` where duration is `"permanent"` or a literal like
/// `"30m"` / `"1h"`.
pub async fn create_block(
    State(state): State<SharedState>,
    Json(req): Json<BlockRequest>,
) -> impl IntoResponse {
    if req.ip.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"status": "error", "message": "ip required"})),
        );
    }

    let (ttl, kind) = if req.duration == "permanent" {
        (PERMANENT_BLOCK, BlockType::Hard)
    } else {
        (
            parse_duration(&req.duration).unwrap_or(DEFAULT_BLOCK),
            BlockType::Temp,
        )
    };

    state.store.block(&req.ip, ttl, kind).await;
    tracing::info!(ip = %req.ip, ?ttl, kind = kind.as_str(), "manual block applied");

    (
        StatusCode::CREATED,
        Json(json!({"status": "blocked", "ip": req.ip, "type": kind.as_str()})),
    )
}

/// DELETE /api/block?ip=…
pub async fn delete_block(
    State(state): State<SharedState>,
    Query(query): Query<UnblockQuery>,
) -> Response {
    let Some(ip) = query.ip.filter(|ip| !ip.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"status": "error", "message": "ip required"})),
        )
            .into_response();
    };

    if let Err(e) = state.store.unblock(&ip).await {
        tracing::error!(ip = %ip, error = %e, "unblock failed");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"status": "error", "message": "unblock failed"})),
        )
            .into_response();
    }

    tracing::info!(ip = %ip, "manual block cleared");
    StatusCode::NO_CONTENT.into_response()
}

/// Parse duration literals of the form `45s`, `30m`, `1h`, `2d`.
fn parse_duration(literal: &str) -> Option<Duration> {
    let literal = literal.trim();
    if literal.len() < 2 {
        return None;
    }
    let (value, unit) = literal.split_at(literal.len() - 1);
    let value: u64 = value.parse().ok()?;
    let secs = match unit {
        "s" => value,
        "m" => value * 60,
        "h" => value * 60 * 60,
        "d" => value * 24 * 60 * 60,
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}
