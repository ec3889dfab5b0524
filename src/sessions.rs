//! Session token issuance and validation over the key-value store.
//!
//! A session binds an opaque UUIDv4 token to a user id under
//! `sess:{token}` with a two-hour TTL.

use std::sync::Arc;
use std::time::Duration;

use crate::kv::{KvError, KvStore};

/// Session lifetime (refreshable).
pub const SESSION_TTL: Duration = Duration::from_secs(7200);

const SESSION_KEY_PREFIX: &str = "sess:";

#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn KvStore>,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn key(token: &str) -> String {
        format!("{SESSION_KEY_PREFIX}{token}")
    }

    /// Issue a new session token for `user_id`.
    pub async fn create(&self, user_id: u64) -> Result<String, KvError> {
        let token = uuid::Uuid::new_v4().to_string();
        self.kv
            .set(&Self::key(&token), &user_id.to_string(), SESSION_TTL)
            .await?;
        tracing::debug!(user_id, "session created");
        Ok(token)
    }

    /// Resolve a token to its user id.
    ///
    /// `None` for missing, expired, or unparseable sessions; the caller
    /// decides how to surface the invalid-token outcome.
    pub async fn validate(&self, token: &str) -> Result<Option<u64>, KvError> {
        match self.kv.get(&Self::key(token)).await? {
            Some(raw) => match raw.parse::<u64>() {
                Ok(user_id) => Ok(Some(user_id)),
                Err(_) => {
                    tracing::warn!(value = %raw, "session value is not a user id");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Reset the session TTL. Returns false when the session is gone,
    /// which is not an error.
    pub async fn refresh(&self, token: &str) -> Result<bool, KvError> {
        self.kv.expire(&Self::key(token), SESSION_TTL).await
    }

    /// Delete the session. Idempotent.
    pub async fn destroy(&self, token: &str) -> Result<(), KvError> {
        self.kv.delete(&[Self::key(token).as_str()]).await?;
        tracing::debug!("session destroyed");
        Ok(())
    }
}
