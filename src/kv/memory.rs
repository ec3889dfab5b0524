//! In-memory [`KvStore`] with real TTL semantics.
//!
//! Public so integration tests can compose the full service without a
//! Redis process. Entries carry an expiry stamp checked on access;
//! expired entries are removed lazily.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{KvError, KvStore};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|t| Instant::now() + t),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Instant::now())
    }
}

#[derive(Default)]
pub struct MemoryKv {
    map: DashMap<String, Entry>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining TTL of a live key; `None` when missing or expired.
    /// Not part of the [`KvStore`] surface; used by tests to assert
    /// expiry bounds.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let entry = self.map.get(key)?;
        if entry.is_expired() {
            return None;
        }
        entry
            .expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        self.map
            .insert(key.to_string(), Entry::new(value.to_string(), Some(ttl)));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        if let Some(entry) = self.map.get(key) {
            if entry.is_expired() {
                drop(entry);
                self.map.remove(key);
                return Ok(None);
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }

    async fn delete(&self, keys: &[&str]) -> Result<(), KvError> {
        for key in keys {
            self.map.remove(*key);
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        Ok(self.get(key).await?.is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, KvError> {
        match self.map.get_mut(key) {
            Some(mut entry) => {
                if entry.is_expired() {
                    drop(entry);
                    self.map.remove(key);
                    return Ok(false);
                }
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn incr(&self, key: &str) -> Result<i64, KvError> {
        let mut entry = self
            .map
            .entry(key.to_string())
            .or_insert_with(|| Entry::new("0".to_string(), None));
        if entry.is_expired() {
            *entry = Entry::new("0".to_string(), None);
        }
        let count = entry
            .value
            .parse::<i64>()
            .map_err(|_| KvError::Backend(format!("value at {key} is not an integer")))?
            + 1;
        entry.value = count.to_string();
        Ok(count)
    }

    async fn ping(&self) -> Result<(), KvError> {
        Ok(())
    }
}
