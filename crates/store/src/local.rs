use std::collections::HashMap;
use std::time::{Duration, Instant};

use aegisedge_common::AegisResult;
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::{BlockType, CounterStore};

struct CounterEntry {
    value: i64,
    expires_at: Option<Instant>,
}

impl CounterEntry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(deadline) if now >= deadline)
    }
}

struct BlockEntry {
    kind: BlockType,
    expires_at: Option<Instant>,
}

impl BlockEntry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(deadline) if now >= deadline)
    }
}

/// In-process store backend.
///
/// Expiry is enforced at read time (an expired entry reads as absent even
/// before the sweeper runs) and reclaimed by [`sweep`](LocalStore::sweep),
/// which the reaper service calls every 5 minutes.
#[derive(Default)]
pub struct LocalStore {
    counters: DashMap<String, CounterEntry>,
    blocks: DashMap<String, BlockEntry>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired counters and block records.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.counters.retain(|_, entry| !entry.is_expired(now));
        self.blocks.retain(|_, entry| !entry.is_expired(now));
        debug!(
            counters = self.counters.len(),
            blocks = self.blocks.len(),
            "local store sweep complete"
        );
    }
}

#[async_trait]
impl CounterStore for LocalStore {
    async fn increment(&self, key: &str, ttl: Duration) -> AegisResult<i64> {
        let now = Instant::now();
        let mut entry = self
            .counters
            .entry(key.to_string())
            .or_insert_with(|| CounterEntry {
                value: 0,
                expires_at: None,
            });

        // An expired entry is semantically absent: restart the window.
        if entry.is_expired(now) {
            entry.value = 0;
            entry.expires_at = None;
        }

        entry.value += 1;
        // Fixed window: the TTL is pinned by the increment that created the
        // key and never extended.
        if entry.value == 1 && !ttl.is_zero() {
            entry.expires_at = Some(now + ttl);
        }

        Ok(entry.value)
    }

    async fn decrement(&self, key: &str) -> AegisResult<i64> {
        let mut entry = self
            .counters
            .entry(key.to_string())
            .or_insert_with(|| CounterEntry {
                value: 0,
                expires_at: None,
            });
        entry.value -= 1;
        Ok(entry.value)
    }

    async fn get(&self, key: &str) -> AegisResult<i64> {
        let now = Instant::now();
        Ok(self
            .counters
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value)
            .unwrap_or(0))
    }

    async fn is_blocked(&self, key: &str) -> bool {
        let now = Instant::now();
        self.blocks
            .get(key)
            .map(|entry| !entry.is_expired(now))
            .unwrap_or(false)
    }

    async fn block(&self, key: &str, ttl: Duration, kind: BlockType) {
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Some(Instant::now() + ttl)
        };
        self.blocks
            .insert(key.to_string(), BlockEntry { kind, expires_at });
    }

    async fn unblock(&self, key: &str) -> AegisResult<()> {
        self.blocks.remove(key);
        Ok(())
    }

    async fn list_blocks(&self) -> AegisResult<HashMap<String, BlockType>> {
        let now = Instant::now();
        Ok(self
            .blocks
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .map(|entry| (entry.key().clone(), entry.value().kind))
            .collect())
    }
}
