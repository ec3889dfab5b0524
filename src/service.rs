//! User-facing operations: login, logout, profile reads and updates.
//!
//! Composes the session store, login limiter, user cache, and the
//! persistent store. Validation happens here, at the entry of each
//! operation; cache failures degrade with a log and never fail the
//! operation that triggered them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::{CacheLookup, CachedUser, UserCache};
use crate::kv::KvError;
use crate::limiter::LoginLimiter;
use crate::sessions::SessionStore;
use crate::storage::{ShardMap, StoreError, User, UserStore};
use crate::validate::{self, ValidationError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidParams(#[from] ValidationError),
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("too many failed login attempts")]
    LoginLimitExceeded,
    #[error("token is invalid or expired")]
    InvalidToken,
    #[error("user not found")]
    UserNotFound,
    #[error("failed to create session")]
    SessionCreateFailed,
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("kv error: {0}")]
    Kv(#[from] KvError),
}

/// Public projection of a user, safe to return over the RPC surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: u64,
    pub username: String,
    pub nickname: String,
    pub avatar_url: String,
}

impl From<&CachedUser> for UserProfile {
    fn from(cached: &CachedUser) -> Self {
        Self {
            id: cached.id,
            username: cached.username.clone(),
            nickname: cached.nickname.clone(),
            avatar_url: cached.profile_picture.clone(),
        }
    }
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            nickname: user.nickname.clone(),
            avatar_url: user.profile_picture.clone(),
        }
    }
}

pub struct UserService {
    store: Arc<dyn UserStore>,
    sessions: SessionStore,
    limiter: LoginLimiter,
    cache: UserCache,
    shards: ShardMap,
}

impl UserService {
    pub fn new(
        store: Arc<dyn UserStore>,
        sessions: SessionStore,
        limiter: LoginLimiter,
        cache: UserCache,
        shards: ShardMap,
    ) -> Self {
        Self {
            store,
            sessions,
            limiter,
            cache,
            shards,
        }
    }

    /// Authenticate `username` and open a session.
    ///
    /// The rate check runs before any store work so repeated attacks stay
    /// cheap. Failures are recorded for both a missing user and a wrong
    /// password; a limiter read failure degrades to "allowed".
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(String, UserProfile), ServiceError> {
        validate::username(username)?;
        validate::password(password)?;

        match self.limiter.is_allowed(username).await {
            Ok(true) => {}
            Ok(false) => return Err(ServiceError::LoginLimitExceeded),
            Err(e) => {
                tracing::warn!(error = %e, username, "limiter unavailable, allowing attempt");
            }
        }

        let Some(user) = self.store.get_by_username(username).await? else {
            tracing::warn!(username, "login for unknown username");
            self.record_fail(username).await;
            return Err(ServiceError::InvalidCredentials);
        };

        let password_matches = match bcrypt::verify(password, &user.password_hash) {
            Ok(matches) => matches,
            Err(e) => {
                tracing::error!(error = %e, username, "stored password hash is unusable");
                false
            }
        };
        if !password_matches {
            tracing::warn!(username, "password mismatch");
            self.record_fail(username).await;
            return Err(ServiceError::InvalidCredentials);
        }

        let token = match self.sessions.create(user.id).await {
            Ok(token) => token,
            Err(e) => {
                tracing::error!(error = %e, user_id = user.id, "session creation failed");
                return Err(ServiceError::SessionCreateFailed);
            }
        };

        if let Err(e) = self.limiter.reset(username).await {
            tracing::error!(error = %e, username, "failed to reset failure counter");
        }

        tracing::info!(username, user_id = user.id, "login succeeded");
        Ok((token, UserProfile::from(&user)))
    }

    /// Destroy the session behind `token`. Idempotent.
    pub async fn logout(&self, token: &str) -> Result<(), ServiceError> {
        validate::token(token)?;
        self.sessions.destroy(token).await?;
        tracing::info!("logout succeeded");
        Ok(())
    }

    /// Resolve `token` to a session, refresh it, and return the profile.
    pub async fn get_profile(&self, token: &str) -> Result<UserProfile, ServiceError> {
        validate::token(token)?;

        let Some(user_id) = self.sessions.validate(token).await? else {
            return Err(ServiceError::InvalidToken);
        };

        // Sliding session: a successful read extends the TTL best-effort.
        if let Err(e) = self.sessions.refresh(token).await {
            tracing::warn!(error = %e, user_id, "session refresh failed");
        }

        self.profile(user_id).await
    }

    /// Profile for an already-authenticated user id (the middleware has
    /// resolved the token).
    pub async fn profile(&self, user_id: u64) -> Result<UserProfile, ServiceError> {
        let cached = self
            .cache
            .get_or_load(user_id, |id| self.store.get_by_id(id, None))
            .await?;

        match cached {
            Some(cached) => Ok(UserProfile::from(&cached)),
            None => {
                tracing::warn!(user_id, "profile requested for unknown user");
                Err(ServiceError::UserNotFound)
            }
        }
    }

    pub async fn update_nickname(
        &self,
        user_id: u64,
        nickname: &str,
    ) -> Result<UserProfile, ServiceError> {
        validate::nickname(nickname)?;
        self.apply_update(user_id, |shard| {
            self.store.update_nickname(user_id, nickname, shard)
        })
        .await
    }

    pub async fn update_profile_picture(
        &self,
        user_id: u64,
        profile_picture: &str,
    ) -> Result<UserProfile, ServiceError> {
        validate::profile_picture(profile_picture)?;
        self.apply_update(user_id, |shard| {
            self.store.update_profile_picture(user_id, profile_picture, shard)
        })
        .await
    }

    /// Shared tail of the two mutations: row update, delayed double-delete
    /// invalidation (failures logged only), then a fresh read-through.
    async fn apply_update<F, Fut>(&self, user_id: u64, update: F) -> Result<UserProfile, ServiceError>
    where
        F: FnOnce(Option<usize>) -> Fut,
        Fut: std::future::Future<Output = Result<(), StoreError>>,
    {
        let shard = self.shard_hint(user_id).await;
        match update(shard).await {
            Ok(()) => {}
            Err(StoreError::NotFound) => return Err(ServiceError::UserNotFound),
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = self.cache.delete_with_delay(user_id).await {
            tracing::error!(error = %e, user_id, "cache invalidation failed");
        }

        let profile = self.profile(user_id).await?;
        tracing::info!(user_id, "profile updated");
        Ok(profile)
    }

    /// Shard owning `user_id`, resolved from the cached username.
    ///
    /// A warm cache entry lets a row-targeted write address exactly one
    /// shard; with a cold cache (or a cache error) the store falls back
    /// to probing.
    async fn shard_hint(&self, user_id: u64) -> Option<usize> {
        match self.cache.get(user_id).await {
            Ok(CacheLookup::Hit(cached)) => Some(self.shards.shard_of(&cached.username)),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, user_id, "cache read failed resolving shard");
                None
            }
        }
    }

    async fn record_fail(&self, username: &str) {
        if let Err(e) = self.limiter.record_fail(username).await {
            tracing::error!(error = %e, username, "failed to record login failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{seed_user, test_service};

    #[tokio::test]
    async fn login_rejects_bad_password_and_counts_failures() {
        let (service, store, _kv) = test_service();
        seed_user(&store, 1, "alice", "Test@123", "Alice").await;

        let err = service.login("alice", "wrong-pass").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCredentials));

        let (token, profile) = service.login("alice", "Test@123").await.unwrap();
        assert_eq!(token.len(), 36);
        assert_eq!(profile.nickname, "Alice");
    }

    #[tokio::test]
    async fn login_validates_input_before_any_lookup() {
        let (service, store, _kv) = test_service();
        let err = service.login("a", "Test@123").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidParams(_)));
        let err = service.login("alice", "no").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidParams(_)));
        assert_eq!(store.read_count(), 0);
    }

    #[tokio::test]
    async fn unknown_username_reads_as_invalid_credentials() {
        let (service, _store, _kv) = test_service();
        let err = service.login("nobody", "Test@123").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCredentials));
    }

    #[tokio::test]
    async fn sixth_attempt_is_rate_limited_without_a_store_read() {
        let (service, store, _kv) = test_service();
        seed_user(&store, 1, "alice", "Test@123", "Alice").await;

        for _ in 0..5 {
            let err = service.login("alice", "wrong").await.unwrap_err();
            assert!(matches!(err, ServiceError::InvalidCredentials));
        }
        assert_eq!(store.read_count(), 5);

        let err = service.login("alice", "wrong").await.unwrap_err();
        assert!(matches!(err, ServiceError::LoginLimitExceeded));
        assert_eq!(store.read_count(), 5);
    }

    #[tokio::test]
    async fn successful_login_resets_the_failure_window() {
        let (service, store, _kv) = test_service();
        seed_user(&store, 1, "alice", "Test@123", "Alice").await;

        for _ in 0..4 {
            let _ = service.login("alice", "wrong").await;
        }
        service.login("alice", "Test@123").await.unwrap();

        // The window restarts: four more failures still leave one attempt.
        for _ in 0..4 {
            let _ = service.login("alice", "wrong").await;
        }
        service.login("alice", "Test@123").await.unwrap();
    }

    #[tokio::test]
    async fn get_profile_round_trip() {
        let (service, store, _kv) = test_service();
        seed_user(&store, 42, "grace", "Test@123", "Grace").await;

        let (token, _) = service.login("grace", "Test@123").await.unwrap();
        let profile = service.get_profile(&token).await.unwrap();
        assert_eq!(profile.id, 42);
        assert_eq!(profile.username, "grace");

        let err = service.get_profile("not-a-token").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidToken));
    }

    #[tokio::test]
    async fn profile_for_missing_user_is_not_found() {
        let (service, store, _kv) = test_service();
        let err = service.profile(999).await.unwrap_err();
        assert!(matches!(err, ServiceError::UserNotFound));
        assert_eq!(store.read_count(), 1);

        // The null marker absorbs the follow-up read.
        let err = service.profile(999).await.unwrap_err();
        assert!(matches!(err, ServiceError::UserNotFound));
        assert_eq!(store.read_count(), 1);
    }

    #[tokio::test]
    async fn update_nickname_returns_the_fresh_projection() {
        let (service, store, _kv) = test_service();
        seed_user(&store, 7, "henry", "Test@123", "Henry").await;

        let profile = service.update_nickname(7, "Hank").await.unwrap();
        assert_eq!(profile.nickname, "Hank");

        let err = service.update_nickname(8, "Ghost").await.unwrap_err();
        assert!(matches!(err, ServiceError::UserNotFound));

        let err = service.update_nickname(7, "").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn warm_cache_supplies_a_shard_hint_for_updates() {
        let (service, store, _kv) = test_service();
        seed_user(&store, 7, "henry", "Test@123", "Henry").await;

        // Cold cache: the store has to probe for the row.
        service.update_nickname(7, "Hank").await.unwrap();

        // The post-update read-through warmed the cache, so the next
        // write routes straight to the username's shard.
        service
            .update_profile_picture(7, "avatars/henry.png")
            .await
            .unwrap();

        let hints = store.update_hints();
        assert_eq!(hints[0], None);
        assert_eq!(hints[1], Some(ShardMap::default().shard_of("henry")));
    }

    #[tokio::test]
    async fn update_profile_picture_is_symmetric() {
        let (service, store, _kv) = test_service();
        seed_user(&store, 7, "henry", "Test@123", "Henry").await;

        let profile = service
            .update_profile_picture(7, "avatars/henry.png")
            .await
            .unwrap();
        assert_eq!(profile.avatar_url, "avatars/henry.png");

        let err = service.update_profile_picture(7, "").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn logout_is_idempotent() {
        let (service, store, _kv) = test_service();
        seed_user(&store, 1, "alice", "Test@123", "Alice").await;

        let (token, _) = service.login("alice", "Test@123").await.unwrap();
        service.logout(&token).await.unwrap();
        let err = service.get_profile(&token).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidToken));

        service.logout(&token).await.unwrap();

        let err = service.logout("").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidParams(_)));
    }
}
