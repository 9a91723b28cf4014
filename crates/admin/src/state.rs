use std::sync::Arc;
use std::time::Instant;

use aegisedge_common::LiveToggles;
use aegisedge_store::CounterStore;
use prometheus::Registry;

/// Shared state type alias used across all route handlers.
pub type SharedState = Arc<AdminState>;

/// Everything the control plane reaches into: the block store, the live
/// toggle registry, and the data plane's metrics registry.
pub struct AdminState {
    pub store: Arc<dyn CounterStore>,
    pub toggles: Arc<LiveToggles>,
    pub registry: Registry,
    pub start_time: Instant,
}

impl AdminState {
    pub fn new(
        store: Arc<dyn CounterStore>,
        toggles: Arc<LiveToggles>,
        registry: Registry,
    ) -> Self {
        Self {
            store,
            toggles,
            registry,
            start_time: Instant::now(),
        }
    }
}
