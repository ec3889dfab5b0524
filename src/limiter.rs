//! Per-username login failure limiter.
//!
//! A counter at `login_fail:{username}` with a 15-minute window. The
//! window starts at the first failure and does not slide; a user who
//! stops attempting resets naturally when the key expires.

use std::sync::Arc;
use std::time::Duration;

use crate::kv::{KvError, KvStore};

/// Attempts rejected once the recorded failure count reaches this cap.
pub const MAX_LOGIN_FAILURES: i64 = 5;

/// Failure-counter window, applied when the first failure is recorded.
pub const LOGIN_FAIL_TTL: Duration = Duration::from_secs(900);

const LOGIN_FAIL_KEY_PREFIX: &str = "login_fail:";

#[derive(Clone)]
pub struct LoginLimiter {
    kv: Arc<dyn KvStore>,
}

impl LoginLimiter {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn key(username: &str) -> String {
        format!("{LOGIN_FAIL_KEY_PREFIX}{username}")
    }

    /// Record a failed attempt and return the updated count.
    ///
    /// The TTL is set when the counter is created; a TTL-set failure is
    /// logged but does not fail the call, since the increment already took.
    pub async fn record_fail(&self, username: &str) -> Result<i64, KvError> {
        let key = Self::key(username);
        let count = self.kv.incr(&key).await?;

        if count == 1 {
            if let Err(e) = self.kv.expire(&key, LOGIN_FAIL_TTL).await {
                tracing::error!(error = %e, username, %key, "failed to set failure-counter ttl");
            }
        }

        tracing::warn!(username, fail_count = count, "login failure recorded");
        Ok(count)
    }

    /// Current failure count; a missing counter reads as 0.
    pub async fn fail_count(&self, username: &str) -> Result<i64, KvError> {
        match self.kv.get(&Self::key(username)).await? {
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| KvError::Backend(format!("failure counter is not an integer: {raw}"))),
            None => Ok(0),
        }
    }

    /// Whether another attempt is allowed for `username`.
    pub async fn is_allowed(&self, username: &str) -> Result<bool, KvError> {
        let count = self.fail_count(username).await?;
        let allowed = count < MAX_LOGIN_FAILURES;
        if !allowed {
            tracing::warn!(username, fail_count = count, "login attempts exhausted");
        }
        Ok(allowed)
    }

    /// Clear the counter (called after a successful login).
    pub async fn reset(&self, username: &str) -> Result<(), KvError> {
        self.kv.delete(&[Self::key(username).as_str()]).await?;
        tracing::debug!(username, "login failure counter reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;

    fn limiter() -> LoginLimiter {
        LoginLimiter::new(Arc::new(MemoryKv::new()))
    }

    #[tokio::test]
    async fn counts_failures_and_trips_at_cap() {
        let limiter = limiter();
        assert_eq!(limiter.fail_count("alice").await.unwrap(), 0);

        for expected in 1..=MAX_LOGIN_FAILURES {
            assert!(limiter.is_allowed("alice").await.unwrap());
            assert_eq!(limiter.record_fail("alice").await.unwrap(), expected);
        }

        assert!(!limiter.is_allowed("alice").await.unwrap());
        assert_eq!(limiter.fail_count("alice").await.unwrap(), MAX_LOGIN_FAILURES);
    }

    #[tokio::test]
    async fn reset_clears_the_window() {
        let limiter = limiter();
        for _ in 0..MAX_LOGIN_FAILURES {
            limiter.record_fail("bob").await.unwrap();
        }
        assert!(!limiter.is_allowed("bob").await.unwrap());

        limiter.reset("bob").await.unwrap();
        assert!(limiter.is_allowed("bob").await.unwrap());
        assert_eq!(limiter.fail_count("bob").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn counters_are_per_username() {
        let limiter = limiter();
        limiter.record_fail("carol").await.unwrap();
        assert_eq!(limiter.fail_count("carol").await.unwrap(), 1);
        assert_eq!(limiter.fail_count("dave").await.unwrap(), 0);
    }
}
