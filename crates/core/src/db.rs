//! Database connection pool management for the bundled server binary.
//!
//! Hosts embedding the library usually hand [`crate::store::PgStore`] a pool
//! they already own; these helpers exist for the standalone binary and for
//! integration environments.

use anyhow::{Context, Result};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::Config;

/// Schema migrations for the three OAuth tables, embedded at compile time.
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Connect a PostgreSQL pool sized by [`Config::database_max_connections`].
pub async fn create_pool(database_url: &str, config: &Config) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to PostgreSQL")
}

/// Apply any pending schema migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .context("failed to apply oauth2 schema migrations")
}
