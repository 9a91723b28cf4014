use std::sync::Arc;
use std::time::Duration;

use aegisedge_ip_filter::strip_port;
use aegisedge_store::CounterStore;
use tracing::warn;

/// Counter key family for per-IP connection counts.
const KEY_FAMILY: &str = "l4:conn";

/// Per-IP concurrent-connection cap backed by the shared store.
///
/// Callers must pair every successful tracked [`acquire`] with exactly one
/// [`release`] on connection close; the counter TTL is a safety net for a
/// missed release, not a substitute for it. Store failures fail open and
/// are not tracked (no release owed).
pub struct ConnectionGate {
    store: Arc<dyn CounterStore>,
    max_conn_per_ip: i64,
    idle_timeout: Duration,
}

/// Outcome of an acquire attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Under the cap; the counter was incremented and must be released.
    Allowed,
    /// Store unavailable; allowed without tracking, nothing to release.
    AllowedUntracked,
    /// Over the cap. The counter was incremented and already rolled back.
    Denied,
}

impl ConnectionGate {
    pub fn new(store: Arc<dyn CounterStore>, max_conn_per_ip: i64, idle_timeout: Duration) -> Self {
        Self {
            store,
            max_conn_per_ip,
            idle_timeout,
        }
    }

    fn key(addr: &str) -> String {
        format!("{KEY_FAMILY}:{}", strip_port(addr))
    }

    /// Count a new connection from `addr` against its cap.
    pub async fn acquire(&self, addr: &str) -> GateDecision {
        let key = Self::key(addr);
        match self.store.increment(&key, self.idle_timeout).await {
            Ok(count) if count > self.max_conn_per_ip => {
                // Undo our own increment so the counter keeps tracking the
                // number of admitted connections.
                let _ = self.store.decrement(&key).await;
                warn!(addr, count, "connection cap exceeded");
                GateDecision::Denied
            }
            Ok(_) => GateDecision::Allowed,
            Err(e) => {
                warn!(addr, error = %e, "connection gate store error, failing open");
                GateDecision::AllowedUntracked
            }
        }
    }

    /// Release a previously acquired slot.
    pub async fn release(&self, addr: &str) {
        if let Err(e) = self.store.decrement(&Self::key(addr)).await {
            warn!(addr, error = %e, "connection gate release failed");
        }
    }
}
