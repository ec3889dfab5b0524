//! Shared test helpers — available to all `#[cfg(test)]` modules in the crate.

use std::sync::Arc;

use chrono::Utc;

use crate::cache::UserCache;
use crate::kv::MemoryKv;
use crate::limiter::LoginLimiter;
use crate::service::UserService;
use crate::sessions::SessionStore;
use crate::storage::{MemoryUserStore, ShardMap, User, UserStore};

/// Build a `UserService` over in-memory backends.
///
/// Returns the backends too, so tests can seed rows and assert on store
/// read counts or raw cache keys.
pub fn test_service() -> (UserService, Arc<MemoryUserStore>, Arc<MemoryKv>) {
    let kv = Arc::new(MemoryKv::new());
    let store = Arc::new(MemoryUserStore::new());

    let kv_dyn: Arc<dyn crate::kv::KvStore> = Arc::clone(&kv) as _;
    let service = UserService::new(
        Arc::clone(&store) as Arc<dyn UserStore>,
        SessionStore::new(Arc::clone(&kv_dyn)),
        LoginLimiter::new(Arc::clone(&kv_dyn)),
        UserCache::new(kv_dyn),
        ShardMap::default(),
    );
    (service, store, kv)
}

/// Seed a user whose password hash verifies against `password`.
///
/// Uses the lowest bcrypt cost to keep tests fast; production hashes
/// are generated at cost 10 by the provisioning path.
pub async fn seed_user(
    store: &MemoryUserStore,
    id: u64,
    username: &str,
    password: &str,
    nickname: &str,
) -> User {
    let now = Utc::now();
    let user = User {
        id,
        username: username.to_string(),
        password_hash: bcrypt::hash(password, 4).unwrap(),
        nickname: nickname.to_string(),
        profile_picture: String::new(),
        created_at: now,
        updated_at: now,
    };
    store.create(&user).await.unwrap();
    user
}
