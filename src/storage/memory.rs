//! In-memory [`UserStore`] double.
//!
//! Public so integration tests can run the full service without MySQL.
//! Tracks how many read operations hit the store, which the cache tests
//! use to prove reads were (or were not) absorbed by the cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{StoreError, User, UserStore};

#[derive(Default)]
struct Inner {
    by_username: HashMap<String, User>,
    username_by_id: HashMap<u64, String>,
}

#[derive(Default)]
pub struct MemoryUserStore {
    inner: RwLock<Inner>,
    reads: AtomicU64,
    update_hints: Mutex<Vec<Option<usize>>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of read operations served so far.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Shard hints seen by update operations, in call order. Lets tests
    /// assert that callers route writes when they can.
    pub fn update_hints(&self) -> Vec<Option<usize>> {
        self.update_hints
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn record_hint(&self, shard_hint: Option<usize>) {
        self.update_hints
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(shard_hint);
    }

    fn insert_locked(inner: &mut Inner, user: &User) -> Result<(), StoreError> {
        if inner.by_username.contains_key(&user.username)
            || inner.username_by_id.contains_key(&user.id)
        {
            return Err(StoreError::Duplicate);
        }
        inner
            .username_by_id
            .insert(user.id, user.username.clone());
        inner.by_username.insert(user.username.clone(), user.clone());
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let inner = self.inner.read().await;
        Ok(inner.by_username.get(username).cloned())
    }

    async fn get_by_id(
        &self,
        id: u64,
        _shard_hint: Option<usize>,
    ) -> Result<Option<User>, StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let inner = self.inner.read().await;
        Ok(inner.username_by_id.get(&id).and_then(|username| {
            inner.by_username.get(username).map(|user| {
                let mut projected = user.clone();
                projected.password_hash = String::new();
                projected
            })
        }))
    }

    async fn create(&self, user: &User) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        Self::insert_locked(&mut inner, user)
    }

    async fn update_nickname(
        &self,
        id: u64,
        nickname: &str,
        shard_hint: Option<usize>,
    ) -> Result<(), StoreError> {
        self.record_hint(shard_hint);
        let mut inner = self.inner.write().await;
        let username = inner
            .username_by_id
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)?;
        let user = inner
            .by_username
            .get_mut(&username)
            .ok_or(StoreError::NotFound)?;
        user.nickname = nickname.to_string();
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn update_profile_picture(
        &self,
        id: u64,
        profile_picture: &str,
        shard_hint: Option<usize>,
    ) -> Result<(), StoreError> {
        self.record_hint(shard_hint);
        let mut inner = self.inner.write().await;
        let username = inner
            .username_by_id
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)?;
        let user = inner
            .by_username
            .get_mut(&username)
            .ok_or(StoreError::NotFound)?;
        user.profile_picture = profile_picture.to_string();
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn batch_create(&self, users: &[User]) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        // All-or-nothing: reject the batch before touching the maps.
        let mut seen = std::collections::HashSet::new();
        for user in users {
            if inner.by_username.contains_key(&user.username)
                || inner.username_by_id.contains_key(&user.id)
                || !seen.insert(user.username.clone())
            {
                return Err(StoreError::Duplicate);
            }
        }
        for user in users {
            Self::insert_locked(&mut inner, user)?;
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
