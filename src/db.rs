// src/db.rs
use std::time::Duration;

use redis::aio::ConnectionManager;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::Config;
use crate::errors::KiteResult;

/// Connect to the durable store. Acquiring a connection is capped at 5 s;
/// statements inherit the cap through the runtime timeouts on each call
/// path.
pub async fn connect_postgres(cfg: &Config) -> KiteResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_max_connections)
        .min_connections(cfg.db_min_connections)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .connect(&cfg.database_url)
        .await?;

    tracing::info!(max = cfg.db_max_connections, "connected to postgres");
    Ok(pool)
}

/// Connect to the cache. `ConnectionManager` multiplexes and reconnects
/// under the hood, so services can clone it freely.
pub async fn connect_redis(cfg: &Config) -> KiteResult<ConnectionManager> {
    let client = redis::Client::open(cfg.redis_url.as_str())?;
    let config = redis::aio::ConnectionManagerConfig::new()
        .set_connection_timeout(Duration::from_secs(3))
        .set_response_timeout(Duration::from_secs(3));
    let manager = ConnectionManager::new_with_config(client, config).await?;

    tracing::info!("connected to redis");
    Ok(manager)
}

pub async fn postgres_healthy(pool: &PgPool) -> bool {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await
        .is_ok()
}

pub async fn redis_healthy(conn: &ConnectionManager) -> bool {
    let mut conn = conn.clone();
    redis::cmd("PING")
        .query_async::<String>(&mut conn)
        .await
        .is_ok()
}
