//! Offline user provisioning.
//!
//! Inserts `PROVISION_USERS` users named `{PROVISION_PREFIX}{n}` in
//! batches of `PROVISION_BATCH_SIZE`, all sharing `PROVISION_PASSWORD`.
//! Ids come from the configured snowflake generator, so rows sort by
//! creation time inside every shard.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use profile_server::config::Config;
use profile_server::idgen::IdGen;
use profile_server::storage::{MySqlUserStore, ShardMap, User, UserStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let total: u64 = env_parse("PROVISION_USERS", 1000)?;
    let batch_size: usize = env_parse("PROVISION_BATCH_SIZE", 500)?;
    let prefix = std::env::var("PROVISION_PREFIX").unwrap_or_else(|_| "user_".to_string());
    let password = std::env::var("PROVISION_PASSWORD").unwrap_or_else(|_| "Test@123".to_string());

    let config = Config::load()?;
    let shards = ShardMap::new(config.db.shard_count);
    let store: Arc<dyn UserStore> = Arc::new(
        MySqlUserStore::connect(
            &config.db.url,
            config.db.max_open_conns,
            shards,
            config.db_op_timeout(),
        )
        .await?,
    );
    store.ping().await?;

    let idgen = IdGen::new(config.snowflake.machine_id)?;

    // One hash shared by the whole run; hashing per row would dominate
    // the insert time at cost 10.
    let password_hash = bcrypt::hash(&password, 10)?;
    info!(total, batch_size, "provisioning users");

    let mut created = 0u64;
    let mut batch = Vec::with_capacity(batch_size);
    for n in 0..total {
        let now = Utc::now();
        batch.push(User {
            id: idgen.next_id()?,
            username: format!("{prefix}{n}"),
            password_hash: password_hash.clone(),
            nickname: format!("{prefix}{n}"),
            profile_picture: String::new(),
            created_at: now,
            updated_at: now,
        });

        if batch.len() == batch_size || n + 1 == total {
            store.batch_create(&batch).await?;
            created += batch.len() as u64;
            batch.clear();
            if created % 100_000 == 0 {
                info!(created, "progress");
            }
        }
    }

    info!(created, "provisioning complete");
    Ok(())
}

fn env_parse<T: std::str::FromStr + Copy>(key: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("{key} has an unparseable value: {raw}")),
        Err(_) => Ok(default),
    }
}
