//! Token-endpoint validation.
//!
//! Simpler than the authorize side: cast, recognize the grant type,
//! authenticate the client, then run grant-type-specific cross-checks. The
//! async pieces (client lookup, grant lookup) live in the route handler;
//! everything here is pure.

use axum::http::HeaderMap;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;

use crate::crypto;
use crate::error::{ErrorCode, OAuthError};
use crate::models::{Client, ClientType, Grant};
use crate::scope::ScopeSet;
use crate::validate::BLANK;

/// Raw token-request parameters (`application/x-www-form-urlencoded`).
#[derive(Debug, Default, Clone, Deserialize)]
pub struct TokenParams {
    #[serde(default)]
    pub grant_type: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub code_verifier: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Recognized grant types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestedGrantType {
    AuthorizationCode,
    RefreshToken,
}

/// Cast and recognize `grant_type`.
pub fn parse_grant_type(params: &TokenParams) -> Result<RequestedGrantType, OAuthError> {
    match non_empty(params.grant_type.as_deref()) {
        None => Err(OAuthError::new(
            ErrorCode::InvalidRequest,
            format!("grant_type: {BLANK}"),
        )),
        Some("authorization_code") => Ok(RequestedGrantType::AuthorizationCode),
        Some("refresh_token") => Ok(RequestedGrantType::RefreshToken),
        Some(_) => Err(OAuthError::new(
            ErrorCode::UnsupportedGrantType,
            "grant_type: server supports authorization_code and refresh_token",
        )),
    }
}

/// Where the client credentials came from. A Basic header wins over the
/// request body, and its failures get the 401 treatment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCredentials {
    Basic {
        client_id: String,
        client_secret: String,
    },
    Body {
        client_id: Option<String>,
        client_secret: Option<String>,
    },
}

/// Extract credentials from the `Authorization: Basic` header or the body.
///
/// Returns `None` for the Basic variant when the header is present but
/// unparseable — the caller must answer 401.
pub fn extract_credentials(
    headers: &HeaderMap,
    params: &TokenParams,
) -> Option<ClientCredentials> {
    let basic = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "));

    match basic {
        Some(encoded) => decode_basic(encoded),
        None => Some(ClientCredentials::Body {
            client_id: non_empty(params.client_id.as_deref()).map(str::to_string),
            client_secret: non_empty(params.client_secret.as_deref()).map(str::to_string),
        }),
    }
}

/// Decode RFC 6749 §2.3.1 Basic credentials: base64 of
/// `urlencode(id):urlencode(secret)`.
fn decode_basic(encoded: &str) -> Option<ClientCredentials> {
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (id, secret) = decoded.split_once(':')?;
    let client_id = urlencoding::decode(id).ok()?.into_owned();
    let client_secret = urlencoding::decode(secret).ok()?.into_owned();
    Some(ClientCredentials::Basic {
        client_id,
        client_secret,
    })
}

/// Constant-time client-secret check.
///
/// Confidential clients must present their secret. Public clients need not,
/// but a supplied secret must still match so a misconfigured public client
/// fails loudly in its integration tests.
pub fn check_client_secret(client: &Client, provided: Option<&str>) -> bool {
    match (client.client_type, non_empty(provided)) {
        (ClientType::Confidential, None) => false,
        (_, Some(provided)) => {
            crypto::constant_time_eq(provided.as_bytes(), client.secret.as_bytes())
        }
        (ClientType::Public, None) => true,
    }
}

/// Enforce the redirect binding between authorize and token requests: the
/// parameter is required iff the authorize call specified one, and whenever
/// present it must exactly equal the grant's resolved URI.
pub fn check_redirect_binding(grant: &Grant, provided: Option<&str>) -> Result<(), OAuthError> {
    match non_empty(provided) {
        Some(uri) => {
            if uri == grant.redirect_uri {
                Ok(())
            } else {
                Err(OAuthError::new(
                    ErrorCode::InvalidGrant,
                    "redirect_uri: does not match",
                ))
            }
        }
        None => {
            if grant.redirect_uri_specified {
                Err(OAuthError::new(
                    ErrorCode::InvalidRequest,
                    format!("redirect_uri: {BLANK}"),
                ))
            } else {
                Ok(())
            }
        }
    }
}

/// RFC 7636 §4.1 bounds on the verifier.
const MIN_CODE_VERIFIER_LENGTH: usize = 43;
const MAX_CODE_VERIFIER_LENGTH: usize = 128;

/// Verify the PKCE binding recorded on the grant.
pub fn check_pkce_binding(grant: &Grant, verifier: Option<&str>) -> Result<(), OAuthError> {
    match (grant.code_challenge.as_deref(), non_empty(verifier)) {
        (Some(challenge), Some(verifier)) => {
            if !(MIN_CODE_VERIFIER_LENGTH..=MAX_CODE_VERIFIER_LENGTH).contains(&verifier.len()) {
                return Err(OAuthError::new(
                    ErrorCode::InvalidGrant,
                    "code_verifier: does not match code_challenge",
                ));
            }
            if crypto::pkce_verify(challenge, verifier) {
                Ok(())
            } else {
                Err(OAuthError::new(
                    ErrorCode::InvalidGrant,
                    "code_verifier: does not match code_challenge",
                ))
            }
        }
        (Some(_), None) => Err(OAuthError::new(
            ErrorCode::InvalidRequest,
            format!("code_verifier: {BLANK}"),
        )),
        (None, Some(_)) => Err(OAuthError::new(
            ErrorCode::InvalidRequest,
            "code_verifier: no challenge was issued",
        )),
        (None, None) => Ok(()),
    }
}

/// Narrow the already-granted scope by an optional `scope` parameter.
pub fn narrow_scope(requested: Option<&str>, granted: &ScopeSet) -> Result<ScopeSet, OAuthError> {
    let Some(raw) = non_empty(requested) else {
        return Ok(granted.clone());
    };
    let requested = ScopeSet::parse(raw)
        .map_err(|_| OAuthError::new(ErrorCode::InvalidScope, "scope: is invalid"))?;
    if requested.is_empty() {
        return Ok(granted.clone());
    }
    if !requested.is_subset_of(granted) {
        return Err(OAuthError::new(
            ErrorCode::InvalidScope,
            "scope: exceeds the authorized scope",
        ));
    }
    Ok(requested)
}
