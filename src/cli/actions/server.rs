use crate::api::{self, email::LogEmailSender, AppState};
use crate::auth::AuthConfig;
use crate::cli::actions::Action;
use crate::store::{MemoryStore, PgStore, Store};
use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::info;

/// Handle the server action: build the store, run migrations, serve.
pub async fn handle(action: Action) -> Result<()> {
    let Action::Server {
        port,
        dsn,
        base_url,
    } = action;

    let store = build_store(&dsn).await?;
    let config = AuthConfig::new(base_url);
    let state = Arc::new(AppState::new(store, Arc::new(LogEmailSender), config));

    api::new(port, state).await?;

    Ok(())
}

/// `memory:` selects the in-process store, anything else is a Postgres DSN.
async fn build_store(dsn: &str) -> Result<Arc<dyn Store>> {
    if dsn.starts_with("memory:") {
        info!("using in-memory store; all state is lost on restart");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    Ok(Arc::new(PgStore::new(pool)))
}
