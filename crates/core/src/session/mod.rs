//! Session and token integration boundary.
//!
//! The core never signs tokens itself: it builds a [`SessionUpsert`] and
//! hands it to a pluggable [`TokenMinter`], and it verifies incoming refresh
//! tokens through a pluggable [`RefreshTokenVerifier`]. [`JwtSessions`] is
//! the batteries-included implementation of both, backed by a
//! [`SessionStore`] for the server-side session records.

pub mod jwt;
pub mod memory;

pub use jwt::JwtSessions;
pub use memory::MemorySessionStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// How the issued tokens travel. Only bearer is used today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenTransport {
    Bearer,
}

impl TokenTransport {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenTransport::Bearer => "bearer",
        }
    }
}

/// Logical session namespace. Sessions minted by this subsystem live under
/// `oauth2` so bulk operations on the host's ordinary sessions leave
/// third-party connections alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    Oauth2,
}

impl SessionType {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionType::Oauth2 => "oauth2",
        }
    }
}

/// Arguments for minting (or refreshing) a session's token pair.
#[derive(Debug, Clone)]
pub struct SessionUpsert {
    pub user_id: Uuid,
    pub token_transport: TokenTransport,
    pub session_type: SessionType,
    /// Extra claims for the access token. The minter's own claims win on
    /// collision.
    pub access_claim_overrides: serde_json::Map<String, serde_json::Value>,
    /// Extra claims for the refresh token.
    pub refresh_claim_overrides: serde_json::Map<String, serde_json::Value>,
}

impl SessionUpsert {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            token_transport: TokenTransport::Bearer,
            session_type: SessionType::Oauth2,
            access_claim_overrides: serde_json::Map::new(),
            refresh_claim_overrides: serde_json::Map::new(),
        }
    }
}

/// The minted token pair with absolute expirations.
#[derive(Debug, Clone)]
pub struct TokenBundle {
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    /// Absent for flows that must not issue a refresh token, or when the
    /// minter chooses not to rotate.
    pub refresh_token: Option<String>,
    pub refresh_expires_at: Option<DateTime<Utc>>,
}

/// Minting failure. Details go to logs; callers surface an opaque 500.
#[derive(Debug, Error)]
#[error("token minting failed: {0}")]
pub struct MinterError(#[from] pub anyhow::Error);

/// Why a refresh token was rejected. The display strings double as OAuth
/// `error_description` values, so they follow the `field: message` shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RefreshVerifyError {
    #[error("refresh_token: is invalid")]
    Malformed,
    #[error("refresh_token: signature is invalid")]
    BadSignature,
    #[error("refresh_token: expired")]
    Expired,
    #[error("refresh_token: not yet valid")]
    NotYetValid,
    #[error("refresh_token: wrong token type")]
    WrongType,
    #[error("refresh_token: wrong session type")]
    WrongSessionType,
    #[error("refresh_token: session not found")]
    UnknownSession,
    #[error("refresh_token: session expired")]
    SessionExpired,
    #[error("refresh_token: already replaced")]
    Stale,
    #[error("refresh_token: verification unavailable")]
    Unavailable,
}

/// Verified refresh-token claims the core relies on.
#[derive(Debug, Clone)]
pub struct RefreshClaims {
    /// `sub` — the resource owner.
    pub user_id: Uuid,
    /// `cid` — the client the token was issued to.
    pub client_id: Uuid,
    /// Any remaining claims, for integrator hooks.
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// External token factory.
///
/// Implementations persist a server-side session record keyed by
/// `(user_id, session_type)` so revoking one class of sessions does not
/// disturb the other.
#[async_trait]
pub trait TokenMinter: Send + Sync {
    async fn upsert_session(&self, args: SessionUpsert) -> Result<TokenBundle, MinterError>;
}

/// External refresh-token verifier.
#[async_trait]
pub trait RefreshTokenVerifier: Send + Sync {
    async fn verify_refresh_token(&self, token: &str)
    -> Result<RefreshClaims, RefreshVerifyError>;
}

/// Server-side session record.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub user_id: Uuid,
    pub session_type: SessionType,
    pub session_id: Uuid,
    /// Monotonic refresh-token generation. Bumped on every mint.
    pub refresh_index: i64,
    /// When the index was last bumped; anchors the freshness grace window.
    pub rotated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Persistence for session records.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn upsert(&self, record: SessionRecord) -> anyhow::Result<()>;
    async fn get(
        &self,
        user_id: Uuid,
        session_type: SessionType,
    ) -> anyhow::Result<Option<SessionRecord>>;
    /// Remove a session, invalidating its refresh tokens. Returns false when
    /// no record existed.
    async fn delete(&self, user_id: Uuid, session_type: SessionType) -> anyhow::Result<bool>;
}
