//! Control plane for the gateway: the management API and the Prometheus
//! metrics listener. Both are separate listeners from the data plane and
//! are assumed bound to a trusted interface; there is no authentication.

pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::routing::{get, patch, post};
use axum::Router;

use crate::state::SharedState;

pub use state::AdminState;

/// Build the management API router (by convention port 9091).
pub fn build_management_router(state: SharedState) -> Router {
    Router::new()
        .route("/api/status", get(routes::status::get_status))
        .route(
            "/api/block",
            post(routes::block::create_block).delete(routes::block::delete_block),
        )
        .route("/api/config", patch(routes::config::patch_config))
        .with_state(state)
}

/// Build the metrics exposition router (by convention port 9090).
pub fn build_metrics_router(state: SharedState) -> Router {
    Router::new()
        .route("/metrics", get(routes::metrics::get_metrics))
        .with_state(state)
}

/// Serve a router until the listener fails or the task is dropped.
pub async fn run_server(router: Router, listen_addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(addr = listen_addr, "control-plane listener active");
    axum::serve(listener, router).await?;
    Ok(())
}

/// Convenience constructor for the shared state.
pub fn new_shared_state(state: AdminState) -> SharedState {
    Arc::new(state)
}
