//! Remote key-value store abstraction.
//!
//! The capability surface is deliberately small: string values with TTLs,
//! counters, and a liveness probe. A missing key is a distinguished
//! non-error outcome (`Ok(None)`), never an `Err`. Every operation runs
//! under the implementation's configured deadline and fails with
//! [`KvError::Timeout`] when it elapses.

mod memory;
mod redis;

pub use self::memory::MemoryKv;
pub use self::redis::RedisKv;

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("kv operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("kv backend error: {0}")]
    Backend(String),
    #[error("kv value codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Store `value` under `key` with the given time-to-live.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError>;

    /// Fetch the value under `key`; `None` when the key is missing.
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Delete the given keys. Missing keys are not an error.
    async fn delete(&self, keys: &[&str]) -> Result<(), KvError>;

    /// Whether `key` currently exists.
    async fn exists(&self, key: &str) -> Result<bool, KvError>;

    /// Reset the TTL of `key`. Returns false when the key is missing.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, KvError>;

    /// Atomically increment the integer at `key`, creating it at 0 first.
    async fn incr(&self, key: &str) -> Result<i64, KvError>;

    /// Probe backend liveness.
    async fn ping(&self) -> Result<(), KvError>;
}

/// Serialize `value` as JSON and store it under `key`.
pub async fn set_json<T: Serialize + Sync>(
    kv: &dyn KvStore,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<(), KvError> {
    let data = serde_json::to_string(value)?;
    kv.set(key, &data, ttl).await
}

/// Fetch and deserialize the JSON value under `key`; `None` when missing.
pub async fn get_json<T: DeserializeOwned>(
    kv: &dyn KvStore,
    key: &str,
) -> Result<Option<T>, KvError> {
    match kv.get(key).await? {
        Some(data) => Ok(Some(serde_json::from_str(&data)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Payload {
        id: u64,
        name: String,
    }

    #[tokio::test]
    async fn json_round_trip() {
        let kv = MemoryKv::new();
        let value = Payload {
            id: 9,
            name: "nine".to_string(),
        };

        set_json(&kv, "p:9", &value, Duration::from_secs(60))
            .await
            .unwrap();
        let loaded: Option<Payload> = get_json(&kv, "p:9").await.unwrap();
        assert_eq!(loaded, Some(value));
    }

    #[tokio::test]
    async fn get_json_missing_key_is_none() {
        let kv = MemoryKv::new();
        let loaded: Option<Payload> = get_json(&kv, "p:absent").await.unwrap();
        assert!(loaded.is_none());
    }
}
