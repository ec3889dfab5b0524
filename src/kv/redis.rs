//! Redis-backed [`KvStore`] over a deadpool connection pool.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use redis::AsyncCommands;

use super::{KvError, KvStore};

pub struct RedisKv {
    pool: Pool,
    op_timeout: Duration,
}

impl RedisKv {
    pub fn new(pool: Pool, op_timeout: Duration) -> Self {
        Self { pool, op_timeout }
    }

    /// Build a pool from a `redis://` URL. Connections are established
    /// lazily; call [`KvStore::ping`] to verify reachability at startup.
    pub fn connect(url: &str, pool_size: usize, op_timeout: Duration) -> Result<Self, KvError> {
        let pool = PoolConfig::from_url(url)
            .builder()
            .map_err(|e| KvError::Backend(e.to_string()))?
            .max_size(pool_size)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| KvError::Backend(e.to_string()))?;
        Ok(Self::new(pool, op_timeout))
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, KvError> {
        self.pool
            .get()
            .await
            .map_err(|e| KvError::Backend(e.to_string()))
    }

    /// Run `fut` under the configured per-operation deadline.
    async fn with_deadline<T, F>(&self, fut: F) -> Result<T, KvError>
    where
        F: Future<Output = Result<T, KvError>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(KvError::Timeout(self.op_timeout)),
        }
    }
}

fn backend(e: redis::RedisError) -> KvError {
    KvError::Backend(e.to_string())
}

#[async_trait]
impl KvStore for RedisKv {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        self.with_deadline(async {
            let mut conn = self.conn().await?;
            conn.set_ex::<_, _, ()>(key, value, ttl.as_secs())
                .await
                .map_err(backend)
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        self.with_deadline(async {
            let mut conn = self.conn().await?;
            conn.get::<_, Option<String>>(key).await.map_err(backend)
        })
        .await
    }

    async fn delete(&self, keys: &[&str]) -> Result<(), KvError> {
        if keys.is_empty() {
            return Ok(());
        }
        self.with_deadline(async {
            let mut conn = self.conn().await?;
            conn.del::<_, ()>(keys).await.map_err(backend)
        })
        .await
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        self.with_deadline(async {
            let mut conn = self.conn().await?;
            conn.exists::<_, bool>(key).await.map_err(backend)
        })
        .await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, KvError> {
        self.with_deadline(async {
            let mut conn = self.conn().await?;
            conn.expire::<_, bool>(key, ttl.as_secs() as i64)
                .await
                .map_err(backend)
        })
        .await
    }

    async fn incr(&self, key: &str) -> Result<i64, KvError> {
        self.with_deadline(async {
            let mut conn = self.conn().await?;
            conn.incr::<_, _, i64>(key, 1).await.map_err(backend)
        })
        .await
    }

    async fn ping(&self) -> Result<(), KvError> {
        self.with_deadline(async {
            let mut conn = self.conn().await?;
            redis::cmd("PING")
                .query_async::<()>(&mut conn)
                .await
                .map_err(backend)
        })
        .await
    }
}
