use std::{net::SocketAddr, time::Duration};

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod auth;
mod config;
mod db;
mod errors;
mod extract;
mod helpers;
mod middleware;
mod models;
mod routes;
mod services;
mod state;

use auth::token::TokenService;
use services::storage::FileStorage;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ───────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // ── Config ────────────────────────────────────────────────
    let config = config::Config::from_env()?;
    tracing::info!(env = %config.app_env, "Starting hospital backend");

    // ── Database ──────────────────────────────────────────────
    // The pool is lazy: an unreachable database is logged, not fatal.
    let pool = db::connect(&config);
    let reachable = db::probe(
        &pool,
        config.db_connect_retries,
        Duration::from_secs(config.db_connect_backoff_secs),
    )
    .await;

    if reachable {
        db::run_migrations(&pool).await?;
        auth::seed::seed_admin(&pool, &config).await?;
    } else {
        tracing::error!("Starting without a database connection; migrations and seeding skipped");
    }

    // ── Shared services ───────────────────────────────────────
    let tokens  = TokenService::new(&config.jwt_secret, config.jwt_expires_in);
    let storage = FileStorage::new(&config.upload_dir);
    tracing::info!(
        token_ttl_secs = tokens.ttl().as_secs(),
        upload_dir = %storage.root().display(),
        "Services ready"
    );

    // Read address before moving config into state
    let addr: SocketAddr = format!("{}:{}", config.backend_host, config.backend_port).parse()?;

    let app_state = AppState { pool, config, tokens, storage };

    // ── Router ────────────────────────────────────────────────
    let app = routes::app(app_state);
    tracing::info!(%addr, "Listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
