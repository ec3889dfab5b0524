//! Sharded persistent user store.
//!
//! Usernames route to exactly one of N shard tables via [`ShardMap`].
//! Lookups return `Ok(None)` for absent rows; only row-targeted mutations
//! treat a missing row as an error ([`StoreError::NotFound`]).

pub mod memory;
pub mod models;
mod mysql;
mod shard;

pub use memory::MemoryUserStore;
pub use models::User;
pub use mysql::MySqlUserStore;
pub use shard::{ShardMap, DEFAULT_SHARD_COUNT};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique-key conflict on insert.
    #[error("username already exists")]
    Duplicate,
    /// A row-targeted mutation matched zero rows.
    #[error("no matching row")]
    NotFound,
    #[error("store operation timed out")]
    Timeout,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Full row for `username`, including the password hash (login path).
    async fn get_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Projected row for `id`: everything except the password hash, which
    /// is returned empty. `shard_hint` addresses one shard when the caller
    /// knows it; without a hint the implementation decides how to route.
    async fn get_by_id(&self, id: u64, shard_hint: Option<usize>)
        -> Result<Option<User>, StoreError>;

    /// Insert into the shard owning `user.username`.
    async fn create(&self, user: &User) -> Result<(), StoreError>;

    /// Row-targeted nickname update; `NotFound` when zero rows matched.
    async fn update_nickname(
        &self,
        id: u64,
        nickname: &str,
        shard_hint: Option<usize>,
    ) -> Result<(), StoreError>;

    /// Row-targeted profile-picture update; `NotFound` when zero rows matched.
    async fn update_profile_picture(
        &self,
        id: u64,
        profile_picture: &str,
        shard_hint: Option<usize>,
    ) -> Result<(), StoreError>;

    /// Insert a batch, one transaction per shard group; any failing row
    /// rolls back its shard's transaction.
    async fn batch_create(&self, users: &[User]) -> Result<(), StoreError>;

    /// Probe backend liveness.
    async fn ping(&self) -> Result<(), StoreError>;
}
