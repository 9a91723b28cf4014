use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use aegisedge_common::{AegisError, AegisResult};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::{BlockType, CounterStore};

/// Namespace prefix for block records, keeping them apart from counters.
const BLOCK_PREFIX: &str = "block:";

/// Per-call budget; a slow backend must surface an error, not stall the
/// request path.
const CALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Redis-backed store for multi-node deployments.
///
/// Counter atomicity comes from `INCR`/`DECR`; the fixed window comes from
/// issuing `EXPIRE` only on the increment that created the key (the one
/// that returned 1). Redis reaps expired keys itself, so there is no sweep.
///
/// The connection manager is established lazily on first use, inside the
/// server's runtime. Every call carries a timeout and callers fail open on
/// error.
pub struct RedisStore {
    client: Client,
    manager: OnceCell<ConnectionManager>,
}

impl RedisStore {
    /// Configure a store for the Redis at `addr` (host:port), optionally
    /// authenticating. Fails only on an unparseable address; connectivity
    /// problems surface per call.
    pub fn new(addr: &str, password: &str) -> AegisResult<Self> {
        let url = if password.is_empty() {
            format!("redis://{addr}")
        } else {
            format!("redis://:{password}@{addr}")
        };
        let client = Client::open(url).map_err(|e| AegisError::Store(e.to_string()))?;
        info!(addr, "distributed store configured");
        Ok(Self {
            client,
            manager: OnceCell::new(),
        })
    }

    async fn connection(&self) -> AegisResult<ConnectionManager> {
        let manager = self
            .manager
            .get_or_try_init(|| async {
                ConnectionManager::new(self.client.clone())
                    .await
                    .map_err(|e| AegisError::Store(e.to_string()))
            })
            .await?;
        Ok(manager.clone())
    }

    async fn bounded<T, F>(&self, fut: F) -> AegisResult<T>
    where
        F: Future<Output = Result<T, redis::RedisError>> + Send,
    {
        match tokio::time::timeout(CALL_TIMEOUT, fut).await {
            Ok(result) => result.map_err(|e| AegisError::Store(e.to_string())),
            Err(_) => Err(AegisError::StoreTimeout(CALL_TIMEOUT)),
        }
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn increment(&self, key: &str, ttl: Duration) -> AegisResult<i64> {
        let mut con = self.connection().await?;
        let value: i64 = self.bounded(con.incr(key, 1i64)).await?;

        // First increment pins the window; later ones leave it alone.
        if value == 1 && !ttl.is_zero() {
            let mut con = self.connection().await?;
            let _: bool = self
                .bounded(con.expire(key, ttl.as_secs() as i64))
                .await?;
        }

        Ok(value)
    }

    async fn decrement(&self, key: &str) -> AegisResult<i64> {
        let mut con = self.connection().await?;
        self.bounded(con.decr(key, 1i64)).await
    }

    async fn get(&self, key: &str) -> AegisResult<i64> {
        let mut con = self.connection().await?;
        let value: Option<i64> = self.bounded(con.get(key)).await?;
        Ok(value.unwrap_or(0))
    }

    async fn is_blocked(&self, key: &str) -> bool {
        let result = async {
            let mut con = self.connection().await?;
            self.bounded(con.exists::<_, bool>(format!("{BLOCK_PREFIX}{key}")))
                .await
        }
        .await;

        match result {
            Ok(exists) => exists,
            Err(e) => {
                warn!(key, error = %e, "redis block check failed, failing open");
                false
            }
        }
    }

    async fn block(&self, key: &str, ttl: Duration, kind: BlockType) {
        let block_key = format!("{BLOCK_PREFIX}{key}");
        let result = async {
            let mut con = self.connection().await?;
            if ttl.is_zero() {
                self.bounded(con.set::<_, _, ()>(&block_key, kind.as_str()))
                    .await
            } else {
                self.bounded(con.set_ex::<_, _, ()>(&block_key, kind.as_str(), ttl.as_secs()))
                    .await
            }
        }
        .await;

        match result {
            Ok(()) => info!(key, kind = kind.as_str(), ?ttl, "distributed block issued"),
            Err(e) => warn!(key, error = %e, "failed to issue distributed block"),
        }
    }

    async fn unblock(&self, key: &str) -> AegisResult<()> {
        let mut con = self.connection().await?;
        self.bounded(con.del::<_, ()>(format!("{BLOCK_PREFIX}{key}")))
            .await
    }

    async fn list_blocks(&self) -> AegisResult<HashMap<String, BlockType>> {
        let mut con = self.connection().await?;
        let keys: Vec<String> = self.bounded(con.keys(format!("{BLOCK_PREFIX}*"))).await?;

        let mut blocks = HashMap::with_capacity(keys.len());
        for key in keys {
            let mut con = self.connection().await?;
            let value: Option<String> = self.bounded(con.get(&key)).await?;
            if let Some(kind) = value {
                let ip = key[BLOCK_PREFIX.len()..].to_string();
                blocks.insert(ip, BlockType::parse(&kind));
            }
        }
        Ok(blocks)
    }
}
