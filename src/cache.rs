//! Read-through user cache with negative entries and delayed double-delete.
//!
//! A `user:{id}` key holds one of three states: a live [`CachedUser`]
//! (30-minute TTL), a null marker proving the id absent (5-minute TTL,
//! `username == "NULL"`), or nothing at all, which means the store must be
//! consulted. Writers invalidate with [`UserCache::delete_with_delay`]: an
//! inline delete before the row commit, then a second delete after a
//! jittered delay to evict any stale populate raced in by a concurrent
//! reader.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio_util::task::TaskTracker;

use crate::kv::{self, KvError, KvStore};
use crate::storage::{StoreError, User};

/// Positive-entry lifetime; bounds staleness when invalidation fails.
pub const USER_CACHE_TTL: Duration = Duration::from_secs(1800);

/// Null-marker lifetime.
pub const NULL_CACHE_TTL: Duration = Duration::from_secs(300);

const USER_CACHE_KEY_PREFIX: &str = "user:";
const NULL_MARKER_USERNAME: &str = "NULL";

/// Base delay before the second delete; sized past the in-flight window
/// of a reader that loaded the pre-update row.
const DELAYED_DELETE_BASE: Duration = Duration::from_millis(500);
const DELAYED_DELETE_JITTER_MS: u64 = 200;

/// Deadline for the detached second delete, independent of any caller.
const DELAYED_DELETE_DEADLINE: Duration = Duration::from_secs(2);

/// Cache projection of a user. Excludes the password hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedUser {
    pub id: u64,
    pub username: String,
    pub nickname: String,
    pub profile_picture: String,
}

impl CachedUser {
    fn null_marker() -> Self {
        Self {
            id: 0,
            username: NULL_MARKER_USERNAME.to_string(),
            nickname: String::new(),
            profile_picture: String::new(),
        }
    }

    fn is_null_marker(&self) -> bool {
        self.username == NULL_MARKER_USERNAME
    }
}

impl From<&User> for CachedUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            nickname: user.nickname.clone(),
            profile_picture: user.profile_picture.clone(),
        }
    }
}

/// Outcome of a cache lookup. `NullMarker` proves absence; `Miss` proves
/// nothing and requires a store consultation.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit(CachedUser),
    NullMarker,
    Miss,
}

#[derive(Clone)]
pub struct UserCache {
    kv: Arc<dyn KvStore>,
    deferred: TaskTracker,
}

impl UserCache {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            deferred: TaskTracker::new(),
        }
    }

    fn key(user_id: u64) -> String {
        format!("{USER_CACHE_KEY_PREFIX}{user_id}")
    }

    pub async fn get(&self, user_id: u64) -> Result<CacheLookup, KvError> {
        match kv::get_json::<CachedUser>(&*self.kv, &Self::key(user_id)).await? {
            Some(cached) if cached.is_null_marker() => {
                tracing::debug!(user_id, "null marker hit");
                Ok(CacheLookup::NullMarker)
            }
            Some(cached) => {
                tracing::debug!(user_id, "cache hit");
                Ok(CacheLookup::Hit(cached))
            }
            None => Ok(CacheLookup::Miss),
        }
    }

    pub async fn set(&self, user: &User) -> Result<(), KvError> {
        let cached = CachedUser::from(user);
        kv::set_json(&*self.kv, &Self::key(user.id), &cached, USER_CACHE_TTL).await
    }

    /// Record that `user_id` has no backing row.
    pub async fn set_null(&self, user_id: u64) -> Result<(), KvError> {
        kv::set_json(
            &*self.kv,
            &Self::key(user_id),
            &CachedUser::null_marker(),
            NULL_CACHE_TTL,
        )
        .await
    }

    pub async fn delete(&self, user_id: u64) -> Result<(), KvError> {
        self.kv.delete(&[Self::key(user_id).as_str()]).await
    }

    /// Delete now and again after a jittered delay.
    ///
    /// The second delete runs detached from the caller with its own
    /// deadline; its failures are logged, never surfaced. The jitter
    /// spreads herds of writers touching the same id.
    pub async fn delete_with_delay(&self, user_id: u64) -> Result<(), KvError> {
        self.delete(user_id).await?;

        let jitter = rand::thread_rng().gen_range(0..DELAYED_DELETE_JITTER_MS);
        let delay = DELAYED_DELETE_BASE + Duration::from_millis(jitter);
        let kv = Arc::clone(&self.kv);
        self.deferred.spawn(async move {
            tokio::time::sleep(delay).await;
            let key = Self::key(user_id);
            match tokio::time::timeout(DELAYED_DELETE_DEADLINE, kv.delete(&[key.as_str()])).await {
                Ok(Ok(())) => tracing::debug!(user_id, "delayed cache delete done"),
                Ok(Err(e)) => {
                    tracing::error!(error = %e, user_id, "delayed cache delete failed");
                }
                Err(_) => tracing::error!(user_id, "delayed cache delete timed out"),
            }
        });
        Ok(())
    }

    /// Read-through lookup.
    ///
    /// Cache errors degrade to a store read. A loader miss plants a null
    /// marker best-effort; a loaded row warms the cache best-effort.
    /// Only loader errors propagate.
    pub async fn get_or_load<F, Fut>(
        &self,
        user_id: u64,
        loader: F,
    ) -> Result<Option<CachedUser>, StoreError>
    where
        F: FnOnce(u64) -> Fut + Send,
        Fut: Future<Output = Result<Option<User>, StoreError>> + Send,
    {
        match self.get(user_id).await {
            Ok(CacheLookup::Hit(cached)) => return Ok(Some(cached)),
            Ok(CacheLookup::NullMarker) => return Ok(None),
            Ok(CacheLookup::Miss) => {}
            Err(e) => {
                tracing::warn!(error = %e, user_id, "cache read failed, falling back to store");
            }
        }

        let Some(user) = loader(user_id).await? else {
            if let Err(e) = self.set_null(user_id).await {
                tracing::error!(error = %e, user_id, "failed to plant null marker");
            }
            return Ok(None);
        };

        if let Err(e) = self.set(&user).await {
            tracing::error!(error = %e, user_id = user.id, "failed to warm user cache");
        }
        Ok(Some(CachedUser::from(&user)))
    }

    /// Stop accepting new deferred deletes. In-flight ones keep running
    /// until [`UserCache::drain`] collects them.
    pub fn close_deferred(&self) {
        self.deferred.close();
    }

    /// Stop accepting deferred deletes and wait for in-flight ones.
    /// Called once at shutdown; the caller bounds the wait.
    pub async fn drain(&self) {
        self.deferred.close();
        self.deferred.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::kv::MemoryKv;

    fn sample_user(id: u64, username: &str, nickname: &str) -> User {
        let now = Utc::now();
        User {
            id,
            username: username.to_string(),
            password_hash: "$2b$10$secret".to_string(),
            nickname: nickname.to_string(),
            profile_picture: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn set_then_get_hits() {
        let cache = UserCache::new(Arc::new(MemoryKv::new()));
        let user = sample_user(5, "erin", "Erin");
        cache.set(&user).await.unwrap();

        match cache.get(5).await.unwrap() {
            CacheLookup::Hit(cached) => {
                assert_eq!(cached, CachedUser::from(&user));
            }
            other => panic!("expected hit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn null_marker_is_distinct_from_miss() {
        let kv = Arc::new(MemoryKv::new());
        let cache = UserCache::new(Arc::clone(&kv) as Arc<dyn KvStore>);

        assert_eq!(cache.get(9).await.unwrap(), CacheLookup::Miss);

        cache.set_null(9).await.unwrap();
        assert_eq!(cache.get(9).await.unwrap(), CacheLookup::NullMarker);

        // The marker is the documented wire value with a bounded TTL.
        let raw = kv.get("user:9").await.unwrap().unwrap();
        let marker: CachedUser = serde_json::from_str(&raw).unwrap();
        assert_eq!(marker.username, "NULL");
        assert!(kv.ttl("user:9").unwrap() <= NULL_CACHE_TTL);
    }

    #[tokio::test]
    async fn get_or_load_warms_cache_and_skips_second_load() {
        let cache = UserCache::new(Arc::new(MemoryKv::new()));
        let user = sample_user(7, "frank", "Frank");

        let loaded = cache
            .get_or_load(7, |_| async { Ok(Some(user.clone())) })
            .await
            .unwrap();
        assert_eq!(loaded.unwrap().nickname, "Frank");

        // Second lookup must not invoke the loader.
        let loaded = cache
            .get_or_load(7, |_| async { panic!("loader must not run on a hit") })
            .await
            .unwrap();
        assert_eq!(loaded.unwrap().username, "frank");
    }

    #[tokio::test]
    async fn get_or_load_plants_null_marker_for_absent_ids() {
        let cache = UserCache::new(Arc::new(MemoryKv::new()));

        let loaded = cache.get_or_load(999, |_| async { Ok(None) }).await.unwrap();
        assert!(loaded.is_none());

        // Second lookup short-circuits on the marker.
        let loaded = cache
            .get_or_load(999, |_| async { panic!("loader must not run on a marker") })
            .await
            .unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn unreadable_cache_entry_degrades_to_a_store_read() {
        let kv = Arc::new(MemoryKv::new());
        let cache = UserCache::new(Arc::clone(&kv) as Arc<dyn KvStore>);

        // Seed bytes the value codec cannot decode.
        kv.set("user:7", "not-json", USER_CACHE_TTL).await.unwrap();

        let user = sample_user(7, "frank", "Frank");
        let loaded = cache
            .get_or_load(7, |_| async { Ok(Some(user.clone())) })
            .await
            .unwrap();
        // The loader ran and its row was returned, not an error.
        assert_eq!(loaded.unwrap().nickname, "Frank");

        // The fallback read also repaired the entry.
        assert_eq!(
            cache.get(7).await.unwrap(),
            CacheLookup::Hit(CachedUser::from(&user))
        );
    }

    #[tokio::test]
    async fn get_or_load_propagates_loader_errors() {
        let cache = UserCache::new(Arc::new(MemoryKv::new()));
        let result = cache
            .get_or_load(1, |_| async { Err(StoreError::NotFound) })
            .await;
        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn delete_with_delay_deletes_twice() {
        let kv = Arc::new(MemoryKv::new());
        let cache = UserCache::new(Arc::clone(&kv) as Arc<dyn KvStore>);
        let user = sample_user(3, "dana", "Dana");

        cache.set(&user).await.unwrap();
        cache.delete_with_delay(3).await.unwrap();
        assert_eq!(cache.get(3).await.unwrap(), CacheLookup::Miss);

        // A racing reader repopulates with the old row...
        cache.set(&user).await.unwrap();
        assert!(matches!(cache.get(3).await.unwrap(), CacheLookup::Hit(_)));

        // ...and the deferred second delete evicts it.
        cache.drain().await;
        assert_eq!(cache.get(3).await.unwrap(), CacheLookup::Miss);
    }
}
