//! Server configuration.
//!
//! The library takes an explicit [`Config`]; the binary builds one from
//! environment variables.

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Duration;

use crate::models::ClientType;
use crate::scope::ScopeSet;
use crate::session::SessionUpsert;

/// Default grant lifetime in seconds.
const DEFAULT_GRANT_TTL: i64 = 600;

/// Default size of the binary's database pool.
const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// When PKCE is mandatory on the authorize request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PkceEnforcement {
    /// Every client must send a code challenge.
    #[default]
    All,
    /// Only public clients must.
    Public,
    /// PKCE is accepted but never required.
    No,
}

impl PkceEnforcement {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "all" => Some(PkceEnforcement::All),
            "public" => Some(PkceEnforcement::Public),
            "no" => Some(PkceEnforcement::No),
            _ => None,
        }
    }

    pub fn required_for(self, client_type: ClientType) -> bool {
        match self {
            PkceEnforcement::All => true,
            PkceEnforcement::Public => client_type == ClientType::Public,
            PkceEnforcement::No => false,
        }
    }
}

/// Hook for integrators to add claims to minted tokens. Claims the core
/// sets (`cid`, `scope`) and the minter's own claims always win.
pub type SessionUpsertHook = Arc<dyn Fn(&mut SessionUpsert) + Send + Sync>;

/// Recognized options of the authorization server core.
#[derive(Clone)]
pub struct Config {
    /// The universe of application scope strings.
    pub scopes: ScopeSet,

    /// PKCE policy (default: required for all clients).
    pub enforce_pkce: PkceEnforcement,

    /// Grant lifetime (default 600 s).
    pub grant_ttl: Duration,

    /// Optional hook to add claims to minted tokens.
    pub customize_session_upsert: Option<SessionUpsertHook>,

    /// Extra header names appended to the token endpoint's CORS allow-list.
    pub token_endpoint_additional_allowed_headers: Vec<String>,

    /// Maximum connections in the pool the bundled binary opens (default 10).
    /// Hosts embedding the library construct their own pool and ignore this.
    pub database_max_connections: u32,
}

impl Config {
    pub fn new(scopes: ScopeSet) -> Self {
        Self {
            scopes,
            enforce_pkce: PkceEnforcement::default(),
            grant_ttl: Duration::seconds(DEFAULT_GRANT_TTL),
            customize_session_upsert: None,
            token_endpoint_additional_allowed_headers: Vec::new(),
            database_max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
        }
    }

    pub fn with_enforce_pkce(mut self, enforce_pkce: PkceEnforcement) -> Self {
        self.enforce_pkce = enforce_pkce;
        self
    }

    pub fn with_grant_ttl(mut self, grant_ttl: Duration) -> Self {
        self.grant_ttl = grant_ttl;
        self
    }

    pub fn with_session_upsert_hook(mut self, hook: SessionUpsertHook) -> Self {
        self.customize_session_upsert = Some(hook);
        self
    }

    /// The token endpoint's CORS allow-list.
    pub fn allowed_headers(&self) -> String {
        let mut headers = vec!["authorization".to_string(), "content-type".to_string()];
        headers.extend(
            self.token_endpoint_additional_allowed_headers
                .iter()
                .map(|h| h.to_lowercase()),
        );
        headers.join(",")
    }

    /// Load the options from environment variables:
    /// `OAUTH2_SCOPES` (required, space- or comma-separated),
    /// `OAUTH2_ENFORCE_PKCE` (`all`/`public`/`no`), `OAUTH2_GRANT_TTL`
    /// (seconds), `DATABASE_MAX_CONNECTIONS`.
    pub fn from_env() -> Result<Self> {
        let scopes = env::var("OAUTH2_SCOPES")
            .context("OAUTH2_SCOPES environment variable is required")?;
        let scopes = ScopeSet::parse(&scopes).context("OAUTH2_SCOPES is not a valid scope set")?;

        let mut config = Config::new(scopes);

        if let Ok(raw) = env::var("OAUTH2_ENFORCE_PKCE") {
            config.enforce_pkce = PkceEnforcement::parse(&raw)
                .with_context(|| format!("OAUTH2_ENFORCE_PKCE must be all/public/no, got {raw}"))?;
        }

        if let Ok(raw) = env::var("OAUTH2_GRANT_TTL") {
            let seconds: i64 = raw
                .parse()
                .context("OAUTH2_GRANT_TTL must be a number of seconds")?;
            config.grant_ttl = Duration::seconds(seconds);
        }

        if let Ok(raw) = env::var("DATABASE_MAX_CONNECTIONS") {
            config.database_max_connections = raw
                .parse()
                .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;
        }

        Ok(config)
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("scopes", &self.scopes)
            .field("enforce_pkce", &self.enforce_pkce)
            .field("grant_ttl", &self.grant_ttl)
            .field(
                "customize_session_upsert",
                &self.customize_session_upsert.as_ref().map(|_| "<hook>"),
            )
            .field(
                "token_endpoint_additional_allowed_headers",
                &self.token_endpoint_additional_allowed_headers,
            )
            .field("database_max_connections", &self.database_max_connections)
            .finish()
    }
}
