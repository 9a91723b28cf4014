//! Shared counter and block state for the security pipeline.
//!
//! Every stage that needs cross-request memory (connection gate, anomaly
//! counters, centralized blocks) goes through the [`CounterStore`] trait.
//! Two interchangeable backends implement it:
//!
//! - [`LocalStore`] -- in-process DashMap state, suitable for a single node.
//! - [`RedisStore`] -- Redis-backed state shared across a fleet of nodes.
//!
//! Counters are fixed-window: the TTL is established on the transition from
//! absent to present and is NOT extended by subsequent increments. Backend
//! failures are reported to callers, who fail open (a store outage must not
//! turn into a denial-of-service of our own making).

pub mod local;
pub mod redis_store;

use std::collections::HashMap;
use std::time::Duration;

use aegisedge_common::AegisResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use local::LocalStore;
pub use redis_store::RedisStore;

/// Classification of a block record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    /// Operator-issued block with a bounded duration.
    Temp,
    /// Operator-issued block with a far-future expiry.
    Hard,
    /// Block issued by the pipeline itself (e.g. fingerprint promotion).
    Auto,
}

impl BlockType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockType::Temp => "temp",
            BlockType::Hard => "hard",
            BlockType::Auto => "auto",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "hard" => BlockType::Hard,
            "auto" => BlockType::Auto,
            _ => BlockType::Temp,
        }
    }
}

/// Atomic per-key counters with TTL plus per-key block records.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment `key` and return the new value. `ttl` is
    /// applied only when this increment creates the key.
    async fn increment(&self, key: &str, ttl: Duration) -> AegisResult<i64>;

    /// Atomically decrement `key` and return the new value.
    async fn decrement(&self, key: &str) -> AegisResult<i64>;

    /// Current value of `key`; 0 when absent or expired.
    async fn get(&self, key: &str) -> AegisResult<i64>;

    /// Whether an unexpired block record exists for `key`. Backend errors
    /// read as unblocked.
    async fn is_blocked(&self, key: &str) -> bool;

    /// Create or overwrite a block record. A zero `ttl` never expires.
    async fn block(&self, key: &str, ttl: Duration, kind: BlockType);

    /// Remove any block record for `key`.
    async fn unblock(&self, key: &str) -> AegisResult<()>;

    /// All currently active blocks, keyed by IP.
    async fn list_blocks(&self) -> AegisResult<HashMap<String, BlockType>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn block_type_round_trip() {
        for kind in [BlockType::Temp, BlockType::Hard, BlockType::Auto] {
            assert_eq!(BlockType::parse(kind.as_str()), kind);
        }
        // Unknown strings degrade to temp.
        assert_eq!(BlockType::parse("banana"), BlockType::Temp);
    }
}
