//! profile-server - a stateful user-profile application server
//!
//! This crate provides the data plane behind a thin HTTP gateway:
//! - Session tokens and a per-username login failure limiter over a
//!   remote key-value store
//! - A read-through user cache with negative entries and delayed
//!   double-delete invalidation
//! - A sharded relational user store with monotonic snowflake ids
//! - A unary method surface wrapped in recovery/logging/auth/metrics
//!   middleware

pub mod api;
pub mod cache;
pub mod config;
pub mod idgen;
pub mod kv;
pub mod limiter;
pub mod service;
pub mod sessions;
pub mod storage;
#[cfg(test)]
pub mod testutil;
pub mod validate;

use std::sync::Arc;

use cache::UserCache;
use config::Config;
use idgen::IdGen;
use kv::KvStore;
use limiter::LoginLimiter;
use service::UserService;
use sessions::SessionStore;
use storage::{ShardMap, UserStore};

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub kv: Arc<dyn KvStore>,
    pub store: Arc<dyn UserStore>,
    pub sessions: SessionStore,
    pub cache: UserCache,
    pub service: UserService,
    pub idgen: IdGen,
}

impl AppState {
    /// Wire the component graph over the given backends.
    pub fn new(
        config: Config,
        kv: Arc<dyn KvStore>,
        store: Arc<dyn UserStore>,
        idgen: IdGen,
    ) -> Self {
        let sessions = SessionStore::new(Arc::clone(&kv));
        let limiter = LoginLimiter::new(Arc::clone(&kv));
        let cache = UserCache::new(Arc::clone(&kv));
        let service = UserService::new(
            Arc::clone(&store),
            sessions.clone(),
            limiter,
            cache.clone(),
            ShardMap::new(config.db.shard_count),
        );
        Self {
            config,
            kv,
            store,
            sessions,
            cache,
            service,
            idgen,
        }
    }
}
