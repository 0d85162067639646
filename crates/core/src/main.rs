//! consentry server binary.
//!
//! A minimal host for the authorization server core: Postgres storage, the
//! built-in HS256 session machinery, and the two protocol endpoints. Real
//! deployments embed the library behind their own auth layer; this binary
//! exists for local development and integration environments.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use consentry::crypto::{self, Keys};
use consentry::session::{JwtSessions, MemorySessionStore};
use consentry::store::PgStore;
use consentry::{AppState, Config, db, routes, sweep};

/// Expired-grant sweep interval.
const SWEEP_INTERVAL_SECONDS: u64 = 300;

#[derive(Parser)]
#[command(name = "consentry", about = "OAuth 2.1 authorization server")]
struct Cli {
    /// HTTP port (overrides the PORT environment variable).
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let port: u16 = match cli.port {
        Some(port) => port,
        None => std::env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("PORT must be a valid u16")?,
    };

    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL environment variable is required")?;
    let base_secret = std::env::var("OAUTH2_BASE_SECRET")
        .context("OAUTH2_BASE_SECRET environment variable is required")?;

    let config = Config::from_env()?;
    let keys = Keys::derive(base_secret.as_bytes())
        .context("OAUTH2_BASE_SECRET must be at least 32 bytes of high-entropy data")?;
    let session_key = crypto::derive_key(base_secret.as_bytes(), b"consentry.session.hs256")
        .context("failed to derive session signing key")?;

    let pool = db::create_pool(&database_url, &config).await?;
    db::run_migrations(&pool).await?;

    let store = Arc::new(PgStore::new(pool, keys));

    // Session records are in-process here; a production host plugs in a
    // persistent SessionStore (or its own TokenMinter entirely).
    let sessions = Arc::new(MemorySessionStore::new());
    let jwt = Arc::new(JwtSessions::new(&session_key, sessions));

    let state = AppState::new(store.clone(), config, jwt.clone(), jwt);

    tokio::spawn(sweep::run_expired_grant_sweeper(
        store,
        std::time::Duration::from_secs(SWEEP_INTERVAL_SECONDS),
    ));

    let app = routes::router()
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "consentry listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
