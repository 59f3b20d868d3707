use std::time::Duration;

use sqlx::{
    mysql::{MySqlConnectOptions, MySqlPoolOptions},
    MySqlPool,
};
use crate::config::Config;

pub type Db = MySqlPool;

/// Build the connection pool. Connections are opened on first use, so this
/// never fails because the server is unreachable.
pub fn connect(config: &Config) -> Db {
    let options = MySqlConnectOptions::new()
        .host(&config.db_host)
        .port(config.db_port)
        .username(&config.db_user)
        .password(&config.db_password)
        .database(&config.db_name);

    MySqlPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect_lazy_with(options)
}

/// Probe the database with `SELECT NOW()`, retrying with a fixed backoff.
/// Returns `false` after the last failed attempt; the caller decides what to do.
pub async fn probe(pool: &Db, attempts: u32, backoff: Duration) -> bool {
    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        match sqlx::query_scalar::<_, chrono::NaiveDateTime>("SELECT NOW()")
            .fetch_one(pool)
            .await
        {
            Ok(now) => {
                tracing::info!(%now, attempt, "Database connection established");
                return true;
            }
            Err(err) if attempt < attempts => {
                tracing::warn!(error = %err, attempt, attempts, "Database not reachable, retrying");
                tokio::time::sleep(backoff).await;
            }
            Err(err) => {
                tracing::error!(error = %err, attempts, "Database connection test failed");
            }
        }
    }
    false
}

/// Run all SQLx migrations from the `migrations/` directory embedded at compile time.
pub async fn run_migrations(pool: &Db) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}
