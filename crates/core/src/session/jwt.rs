//! Default HS256 implementation of the session/token boundary.
//!
//! Access and refresh tokens are JWTs signed with a key the host derives
//! from its configuration secret. Refresh tokens carry the session id and a
//! monotonic rotation index; the verifier accepts the previous index for a
//! short grace window to tolerate clock skew and clients retrying near the
//! rotation boundary.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::session::{
    MinterError, RefreshClaims, RefreshTokenVerifier, RefreshVerifyError, SessionRecord,
    SessionStore, SessionUpsert, TokenBundle, TokenMinter,
};

/// Default access token lifetime in seconds (1 hour).
const ACCESS_TOKEN_LIFETIME: i64 = 3600;

/// Default refresh token lifetime in seconds (30 days).
const REFRESH_TOKEN_LIFETIME: i64 = 30 * 86400;

/// How long a just-replaced refresh token stays acceptable.
const REFRESH_GRACE_SECONDS: i64 = 10;

/// Claim names the minter owns; stripped from override maps.
const RESERVED_CLAIMS: &[&str] = &["sub", "iat", "nbf", "exp", "type", "styp", "sid", "idx"];

/// JWT claims for both token types.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    nbf: i64,
    exp: i64,
    /// "access" or "refresh".
    #[serde(rename = "type")]
    token_type: String,
    /// Session namespace, always "oauth2" here.
    styp: String,
    /// Server-side session id.
    sid: String,
    /// Refresh rotation index.
    idx: i64,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

/// HS256 token minter and refresh verifier over a [`SessionStore`].
pub struct JwtSessions {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    sessions: Arc<dyn SessionStore>,
    access_ttl: Duration,
    refresh_ttl: Duration,
    grace: Duration,
}

impl JwtSessions {
    /// Create with default lifetimes. The signing secret should be derived
    /// from the server base secret and must be at least 32 bytes.
    pub fn new(secret: &[u8], sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            sessions,
            access_ttl: Duration::seconds(ACCESS_TOKEN_LIFETIME),
            refresh_ttl: Duration::seconds(REFRESH_TOKEN_LIFETIME),
            grace: Duration::seconds(REFRESH_GRACE_SECONDS),
        }
    }

    pub fn with_lifetimes(mut self, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        self.access_ttl = access_ttl;
        self.refresh_ttl = refresh_ttl;
        self
    }

    fn encode(
        &self,
        token_type: &str,
        args: &SessionUpsert,
        record: &SessionRecord,
        iat: i64,
        exp: i64,
        overrides: &serde_json::Map<String, serde_json::Value>,
    ) -> anyhow::Result<String> {
        let mut extra = overrides.clone();
        for reserved in RESERVED_CLAIMS {
            extra.remove(*reserved);
        }

        let claims = Claims {
            sub: args.user_id.to_string(),
            iat,
            nbf: iat,
            exp,
            token_type: token_type.to_string(),
            styp: args.session_type.as_str().to_string(),
            sid: record.session_id.to_string(),
            idx: record.refresh_index,
            extra,
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .with_context(|| format!("failed to encode {token_type} token"))
    }
}

impl std::fmt::Debug for JwtSessions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSessions").finish()
    }
}

#[async_trait]
impl TokenMinter for JwtSessions {
    async fn upsert_session(&self, args: SessionUpsert) -> Result<TokenBundle, MinterError> {
        let now = Utc::now();

        let existing = self
            .sessions
            .get(args.user_id, args.session_type)
            .await
            .context("failed to load session")?;

        // Reuse a live session (bumping the rotation index), start a fresh
        // one otherwise.
        let (session_id, refresh_index) = match existing {
            Some(s) if s.expires_at > now => (s.session_id, s.refresh_index + 1),
            _ => (Uuid::now_v7(), 0),
        };

        let record = SessionRecord {
            user_id: args.user_id,
            session_type: args.session_type,
            session_id,
            refresh_index,
            rotated_at: now,
            expires_at: now + self.refresh_ttl,
        };
        self.sessions
            .upsert(record.clone())
            .await
            .context("failed to persist session")?;

        let iat = now.timestamp();
        let access_expires_at = now + self.access_ttl;
        let refresh_expires_at = now + self.refresh_ttl;

        let access_token = self.encode(
            "access",
            &args,
            &record,
            iat,
            access_expires_at.timestamp(),
            &args.access_claim_overrides,
        )?;
        let refresh_token = self.encode(
            "refresh",
            &args,
            &record,
            iat,
            refresh_expires_at.timestamp(),
            &args.refresh_claim_overrides,
        )?;

        debug!(
            user_id = %args.user_id,
            session_type = args.session_type.as_str(),
            refresh_index,
            "session upserted"
        );

        Ok(TokenBundle {
            access_token,
            access_expires_at,
            refresh_token: Some(refresh_token),
            refresh_expires_at: Some(refresh_expires_at),
        })
    }
}

#[async_trait]
impl RefreshTokenVerifier for JwtSessions {
    async fn verify_refresh_token(
        &self,
        token: &str,
    ) -> Result<RefreshClaims, RefreshVerifyError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp"]);

        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => RefreshVerifyError::Expired,
                ErrorKind::ImmatureSignature => RefreshVerifyError::NotYetValid,
                ErrorKind::InvalidSignature => RefreshVerifyError::BadSignature,
                _ => RefreshVerifyError::Malformed,
            })?;
        let claims = data.claims;

        if claims.token_type != "refresh" {
            return Err(RefreshVerifyError::WrongType);
        }
        if claims.styp != crate::session::SessionType::Oauth2.as_str() {
            return Err(RefreshVerifyError::WrongSessionType);
        }

        let user_id: Uuid = claims.sub.parse().map_err(|_| RefreshVerifyError::Malformed)?;
        let session_id: Uuid = claims.sid.parse().map_err(|_| RefreshVerifyError::Malformed)?;
        let client_id: Uuid = claims
            .extra
            .get("cid")
            .and_then(serde_json::Value::as_str)
            .and_then(|s| s.parse().ok())
            .ok_or(RefreshVerifyError::Malformed)?;

        let session = self
            .sessions
            .get(user_id, crate::session::SessionType::Oauth2)
            .await
            .map_err(|e| {
                debug!(error = %e, "session lookup failed during refresh verification");
                RefreshVerifyError::Unavailable
            })?
            .ok_or(RefreshVerifyError::UnknownSession)?;

        let now = Utc::now();
        if now >= session.expires_at {
            return Err(RefreshVerifyError::SessionExpired);
        }
        if session_id != session.session_id {
            return Err(RefreshVerifyError::UnknownSession);
        }

        // Current index is always fresh; the previous one only inside the
        // grace window.
        let fresh = claims.idx == session.refresh_index
            || (claims.idx == session.refresh_index - 1
                && now - session.rotated_at <= self.grace);
        if !fresh {
            return Err(RefreshVerifyError::Stale);
        }

        Ok(RefreshClaims {
            user_id,
            client_id,
            extra: claims.extra,
        })
    }
}
