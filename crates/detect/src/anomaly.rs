use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use aegisedge_store::CounterStore;
use tracing::warn;

/// Window for the per-path frequency counters.
const STATS_TTL: Duration = Duration::from_secs(10 * 60);

/// Window for the behavioral lock-on counter.
const ENTROPY_TTL: Duration = Duration::from_secs(60);

/// Why the detector rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyVerdict {
    /// Too many hits on an expensive path inside the stats window: 429.
    HeavyUrl,
    /// Request frequency characteristic of behavioral lock-on: 403.
    LowEntropy,
}

/// Frequency-based detector for stealthy per-client abuse.
///
/// Counters live in the shared store so the windows hold across a fleet
/// when the distributed backend is active. Store failures fail open.
pub struct AnomalyDetector {
    heavy_paths: HashSet<String>,
    threshold: i64,
    store: Arc<dyn CounterStore>,
}

impl AnomalyDetector {
    pub fn new(heavy_paths: &[String], threshold: i64, store: Arc<dyn CounterStore>) -> Self {
        Self {
            heavy_paths: heavy_paths.iter().cloned().collect(),
            threshold,
            store,
        }
    }

    /// Record this request and decide whether it crosses either limit.
    pub async fn check(&self, ip: &str, path: &str) -> Option<AnomalyVerdict> {
        let stats_key = format!("anomaly:stats:{ip}:{path}");
        let count = match self.store.increment(&stats_key, STATS_TTL).await {
            Ok(count) => count,
            Err(e) => {
                warn!(ip, path, error = %e, "anomaly counter unavailable, failing open");
                return None;
            }
        };

        if self.heavy_paths.contains(path) && count > self.threshold {
            warn!(ip, path, count, "high frequency on heavy path");
            return Some(AnomalyVerdict::HeavyUrl);
        }

        let entropy_key = format!("anomaly:entropy:{ip}");
        let entropy_count = match self.store.increment(&entropy_key, ENTROPY_TTL).await {
            Ok(count) => count,
            Err(e) => {
                warn!(ip, error = %e, "entropy counter unavailable, failing open");
                return None;
            }
        };

        if entropy_count > self.threshold * 3 {
            warn!(ip, count = entropy_count, "behavioral lock-on detected");
            return Some(AnomalyVerdict::LowEntropy);
        }

        None
    }
}
