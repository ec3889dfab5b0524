//! MySQL-backed [`UserStore`] over N shard tables.
//!
//! All statements are parameterized; only the table name is interpolated,
//! and it is derived from the shard index, never from input. By-id
//! operations without a shard hint probe the shards in index order and
//! stop at the first hit.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};

use super::{ShardMap, StoreError, User, UserStore};

type UserRow = (
    u64,
    String,
    String,
    String,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
);

pub struct MySqlUserStore {
    pool: MySqlPool,
    shards: ShardMap,
    op_timeout: Duration,
}

impl MySqlUserStore {
    pub fn new(pool: MySqlPool, shards: ShardMap, op_timeout: Duration) -> Self {
        Self {
            pool,
            shards,
            op_timeout,
        }
    }

    /// Connect a pool to `url` and verify reachability.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        shards: ShardMap,
        op_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self::new(pool, shards, op_timeout))
    }

    pub fn shards(&self) -> ShardMap {
        self.shards
    }

    /// Run `fut` under the configured per-operation deadline.
    async fn with_deadline<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout),
        }
    }

    async fn fetch_by_id(&self, shard: usize, id: u64) -> Result<Option<User>, StoreError> {
        let sql = format!(
            "SELECT id, username, nickname, profile_picture, created_at, updated_at \
             FROM {} WHERE id = ?",
            self.shards.table(shard)
        );
        let row: Option<(u64, String, String, String, DateTime<Utc>, DateTime<Utc>)> =
            sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?;

        Ok(row.map(
            |(id, username, nickname, profile_picture, created_at, updated_at)| User {
                id,
                username,
                password_hash: String::new(),
                nickname,
                profile_picture,
                created_at,
                updated_at,
            },
        ))
    }

    async fn execute_update(
        &self,
        shard: usize,
        column: &str,
        id: u64,
        value: &str,
    ) -> Result<u64, StoreError> {
        let sql = format!(
            "UPDATE {} SET {column} = ?, updated_at = ? WHERE id = ?",
            self.shards.table(shard)
        );
        let result = sqlx::query(&sql)
            .bind(value)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Apply a column update to the hinted shard, or probe all shards
    /// until one row is affected.
    async fn update_column(
        &self,
        id: u64,
        column: &str,
        value: &str,
        shard_hint: Option<usize>,
    ) -> Result<(), StoreError> {
        let shards: Vec<usize> = match shard_hint {
            Some(shard) => vec![shard],
            None => (0..self.shards.count()).collect(),
        };
        for shard in shards {
            if self.execute_update(shard, column, id, value).await? > 0 {
                return Ok(());
            }
        }
        Err(StoreError::NotFound)
    }

    async fn insert_into(
        tx: &mut sqlx::Transaction<'_, sqlx::MySql>,
        table: &str,
        user: &User,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {table} \
             (id, username, password_hash, nickname, profile_picture, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)"
        );
        sqlx::query(&sql)
            .bind(user.id)
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(&user.nickname)
            .bind(&user.profile_picture)
            .bind(user.created_at)
            .bind(user.updated_at)
            .execute(&mut **tx)
            .await
            .map_err(map_insert_error)?;
        Ok(())
    }
}

fn map_insert_error(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate,
        _ => StoreError::Database(e),
    }
}

#[async_trait]
impl UserStore for MySqlUserStore {
    async fn get_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.with_deadline(async {
            let shard = self.shards.shard_of(username);
            let sql = format!(
                "SELECT id, username, password_hash, nickname, profile_picture, \
                 created_at, updated_at FROM {} WHERE username = ?",
                self.shards.table(shard)
            );
            let row: Option<UserRow> = sqlx::query_as(&sql)
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;

            Ok(row.map(
                |(id, username, password_hash, nickname, profile_picture, created_at, updated_at)| {
                    User {
                        id,
                        username,
                        password_hash,
                        nickname,
                        profile_picture,
                        created_at,
                        updated_at,
                    }
                },
            ))
        })
        .await
    }

    async fn get_by_id(
        &self,
        id: u64,
        shard_hint: Option<usize>,
    ) -> Result<Option<User>, StoreError> {
        self.with_deadline(async {
            if let Some(shard) = shard_hint {
                return self.fetch_by_id(shard, id).await;
            }
            for shard in 0..self.shards.count() {
                if let Some(user) = self.fetch_by_id(shard, id).await? {
                    return Ok(Some(user));
                }
            }
            Ok(None)
        })
        .await
    }

    async fn create(&self, user: &User) -> Result<(), StoreError> {
        self.with_deadline(async {
            let shard = self.shards.shard_of(&user.username);
            let mut tx = self.pool.begin().await?;
            Self::insert_into(&mut tx, &self.shards.table(shard), user).await?;
            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn update_nickname(
        &self,
        id: u64,
        nickname: &str,
        shard_hint: Option<usize>,
    ) -> Result<(), StoreError> {
        self.with_deadline(self.update_column(id, "nickname", nickname, shard_hint))
            .await
    }

    async fn update_profile_picture(
        &self,
        id: u64,
        profile_picture: &str,
        shard_hint: Option<usize>,
    ) -> Result<(), StoreError> {
        self.with_deadline(self.update_column(id, "profile_picture", profile_picture, shard_hint))
            .await
    }

    async fn batch_create(&self, users: &[User]) -> Result<(), StoreError> {
        // One transaction per shard group: a failing row rolls back its
        // whole shard batch.
        let mut by_shard: HashMap<usize, Vec<&User>> = HashMap::new();
        for user in users {
            by_shard
                .entry(self.shards.shard_of(&user.username))
                .or_default()
                .push(user);
        }

        for (shard, group) in by_shard {
            let table = self.shards.table(shard);
            let mut tx = self.pool.begin().await?;
            for user in group {
                Self::insert_into(&mut tx, &table, user).await?;
            }
            tx.commit().await?;
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.with_deadline(async {
            sqlx::query("SELECT 1").execute(&self.pool).await?;
            Ok(())
        })
        .await
    }
}
