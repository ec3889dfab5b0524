use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use profile_server::cache::UserCache;
use profile_server::idgen::IdGen;
use profile_server::kv::{KvStore, RedisKv};
use profile_server::storage::{MySqlUserStore, ShardMap, UserStore};
use profile_server::{api, config::Config, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_span_list(false),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "profile-server starting");

    // Load configuration
    let config = Config::load()?;
    info!(
        shards = config.db.shard_count,
        machine_id = config.snowflake.machine_id,
        "loaded configuration"
    );

    // Connect the key-value store and verify reachability
    let kv: Arc<dyn KvStore> = Arc::new(RedisKv::connect(
        &config.redis.url,
        config.redis.pool_size,
        config.kv_op_timeout(),
    )?);
    kv.ping().await?;
    info!(pool_size = config.redis.pool_size, "kv store reachable");

    // Connect the sharded user store and verify reachability
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
    info!(max_open_conns = config.db.max_open_conns, "user store reachable");

    // Machine id is validated here, at startup
    let idgen = IdGen::new(config.snowflake.machine_id)?;

    let state = Arc::new(AppState::new(config.clone(), kv, store, idgen));

    // Build and start the server
    let app = api::create_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    info!("listening on: {}", config.server.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.cache.clone()))
        .await?;

    // Requests that were in flight during the drain may have queued
    // deferred cache deletes; give them a bounded window so exit stays
    // prompt.
    info!("draining deferred cache deletes");
    if tokio::time::timeout(Duration::from_secs(3), state.cache.drain())
        .await
        .is_err()
    {
        tracing::warn!("deferred deletes still pending at shutdown");
    }

    info!("shutdown complete");
    Ok(())
}

/// Wait for SIGINT/SIGTERM, then start winding down the delayed-delete
/// machinery before the listener begins draining connections.
async fn shutdown_signal(cache: UserCache) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    // From here on the tracker only runs down; the bounded drain in main
    // collects whatever the in-flight requests still enqueue.
    cache.close_deferred();
    info!("shutdown signal received, draining connections");
}
