//! The token endpoint.
//!
//! `POST /token` accepts only `application/x-www-form-urlencoded`,
//! authenticates the client (Basic header wins over body credentials),
//! and dispatches on `grant_type`. Authorization codes are single-use: the
//! grant row is deleted before any token is minted, and the delete's
//! affected-row count gates issuance so concurrent exchanges of one code
//! produce exactly one success.

use axum::Form;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult, ErrorCode, OAuthError};
use crate::models::{Client, GrantType};
use crate::scope::ScopeSet;
use crate::session::SessionUpsert;
use crate::state::AppState;
use crate::validate::token::{
    ClientCredentials, RequestedGrantType, TokenParams, check_client_secret, check_pkce_binding,
    check_redirect_binding, extract_credentials, narrow_scope, parse_grant_type,
};

/// Success body per RFC 6749 §5.1, extended with the refresh expiry.
#[derive(Debug, Serialize)]
struct TokenResponse {
    access_token: String,
    token_type: &'static str,
    expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_expires_in: Option<i64>,
    scope: String,
}

/// Headers on every token response: cache suppression per RFC 6749 §5.1
/// plus the CORS grant for browser-based clients.
fn token_headers() -> [(HeaderName, &'static str); 3] {
    [
        (header::CACHE_CONTROL, "no-store"),
        (header::PRAGMA, "no-cache"),
        (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
    ]
}

/// POST /token.
pub async fn token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(params): Form<TokenParams>,
) -> AppResult<Response> {
    let grant_type = parse_grant_type(&params).map_err(AppError::OAuth)?;
    let client = authenticate_client(&state, &headers, &params).await?;

    let response = match grant_type {
        RequestedGrantType::AuthorizationCode => {
            exchange_authorization_code(&state, &client, &params).await?
        }
        RequestedGrantType::RefreshToken => refresh(&state, &client, &params).await?,
    };

    Ok((StatusCode::OK, token_headers(), Json(response)).into_response())
}

/// OPTIONS /token — CORS preflight for browser-based clients.
pub async fn preflight(State(state): State<AppState>) -> Response {
    (
        StatusCode::NO_CONTENT,
        [
            (
                header::ACCESS_CONTROL_ALLOW_ORIGIN,
                "*".to_string(),
            ),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "POST".to_string()),
            (
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                state.config().allowed_headers(),
            ),
        ],
    )
        .into_response()
}

fn invalid_client(description: &str) -> AppError {
    AppError::OAuth(OAuthError::new(ErrorCode::InvalidClient, description))
}

fn invalid_grant(description: impl Into<String>) -> AppError {
    AppError::OAuth(OAuthError::new(ErrorCode::InvalidGrant, description))
}

/// Authenticate the calling client (§2.3 of RFC 6749, OAuth 2.1 tightened).
///
/// Basic-header failures answer 401 with a `WWW-Authenticate` challenge;
/// body-credential failures are ordinary `invalid_client` responses.
async fn authenticate_client(
    state: &AppState,
    headers: &HeaderMap,
    params: &TokenParams,
) -> Result<Client, AppError> {
    match extract_credentials(headers, params) {
        // A Basic header that does not decode is a failed authentication
        // attempt, not a malformed request.
        None => Err(AppError::BasicAuthFailed),
        Some(ClientCredentials::Basic {
            client_id,
            client_secret,
        }) => {
            let Ok(id) = client_id.parse::<Uuid>() else {
                return Err(AppError::BasicAuthFailed);
            };
            let Some(client) = state.store().get_client(id).await? else {
                return Err(AppError::BasicAuthFailed);
            };
            if !check_client_secret(&client, Some(&client_secret)) {
                warn!(client_id = %id, "basic client authentication failed");
                return Err(AppError::BasicAuthFailed);
            }
            Ok(client)
        }
        Some(ClientCredentials::Body {
            client_id,
            client_secret,
        }) => {
            let Some(raw) = client_id else {
                return Err(invalid_client("client_id: can't be blank"));
            };
            let Ok(id) = raw.parse::<Uuid>() else {
                return Err(invalid_client("client_id: is invalid"));
            };
            let Some(client) = state.store().get_client(id).await? else {
                return Err(invalid_client("client_id: does not exist"));
            };
            if !check_client_secret(&client, client_secret.as_deref()) {
                warn!(client_id = %id, "client authentication failed");
                return Err(invalid_client("client_secret: is invalid"));
            }
            Ok(client)
        }
    }
}

/// The `authorization_code` exchange (RFC 6749 §4.1.3, PKCE per RFC 7636).
async fn exchange_authorization_code(
    state: &AppState,
    client: &Client,
    params: &TokenParams,
) -> Result<TokenResponse, AppError> {
    let code = params
        .code
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| {
            AppError::OAuth(OAuthError::new(
                ErrorCode::InvalidRequest,
                "code: can't be blank",
            ))
        })?;

    let Some((grant, authorization)) = state.store().get_grant_by_code(code).await? else {
        debug!(client_id = %client.id, "authorization code not found or expired");
        return Err(invalid_grant("code: not found"));
    };

    if authorization.client_id != client.id {
        return Err(invalid_grant("code: does not belong to this client"));
    }
    if !client.supports_grant_type(GrantType::AuthorizationCode) {
        return Err(AppError::OAuth(OAuthError::new(
            ErrorCode::UnauthorizedClient,
            "grant_type: is not enabled for this client",
        )));
    }

    check_redirect_binding(&grant, params.redirect_uri.as_deref()).map_err(AppError::OAuth)?;
    check_pkce_binding(&grant, params.code_verifier.as_deref()).map_err(AppError::OAuth)?;

    let scope =
        narrow_scope(params.scope.as_deref(), &authorization.scope).map_err(AppError::OAuth)?;

    // Single use: consume the grant first; losing the race to a concurrent
    // exchange of the same code means no token.
    if !state.store().delete_grant(grant.id).await? {
        return Err(invalid_grant("code: not found"));
    }

    info!(
        client_id = %client.id,
        user_id = %grant.resource_owner_id,
        "authorization code exchanged"
    );

    mint(state, grant.resource_owner_id, client, &scope).await
}

/// The `refresh_token` exchange (RFC 6749 §6).
async fn refresh(
    state: &AppState,
    client: &Client,
    params: &TokenParams,
) -> Result<TokenResponse, AppError> {
    let raw = params
        .refresh_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            AppError::OAuth(OAuthError::new(
                ErrorCode::InvalidRequest,
                "refresh_token: can't be blank",
            ))
        })?;

    let claims = state
        .refresh_verifier()
        .verify_refresh_token(raw)
        .await
        .map_err(|e| {
            info!(client_id = %client.id, reason = %e, "refresh token rejected");
            invalid_grant(e.to_string())
        })?;

    if claims.client_id != client.id {
        return Err(invalid_grant("client_id: does not match refresh token"));
    }
    if !client.supports_grant_type(GrantType::RefreshToken) {
        return Err(AppError::OAuth(OAuthError::new(
            ErrorCode::UnauthorizedClient,
            "grant_type: is not enabled for this client",
        )));
    }

    // The user revokes a client by deleting the authorization; without one
    // the refresh token is dead no matter how valid it looks.
    let Some(authorization) = state
        .store()
        .get_authorization(client.id, claims.user_id)
        .await?
    else {
        return Err(invalid_grant("authorization: not found"));
    };

    let scope =
        narrow_scope(params.scope.as_deref(), &authorization.scope).map_err(AppError::OAuth)?;

    mint(state, claims.user_id, client, &scope).await
}

/// Build the session upsert and hand it to the external minter.
async fn mint(
    state: &AppState,
    user_id: Uuid,
    client: &Client,
    scope: &ScopeSet,
) -> Result<TokenResponse, AppError> {
    let mut args = SessionUpsert::new(user_id);

    // Integrator claims first; the core's own claims always win.
    if let Some(hook) = &state.config().customize_session_upsert {
        hook(&mut args);
    }
    args.access_claim_overrides.insert(
        "cid".to_string(),
        serde_json::json!(client.id.to_string()),
    );
    args.access_claim_overrides
        .insert("scope".to_string(), serde_json::json!(scope.as_slice()));
    args.refresh_claim_overrides.insert(
        "cid".to_string(),
        serde_json::json!(client.id.to_string()),
    );

    let bundle = state.minter().upsert_session(args).await?;

    let now = Utc::now();
    Ok(TokenResponse {
        access_token: bundle.access_token,
        token_type: "bearer",
        expires_in: (bundle.access_expires_at - now).num_seconds(),
        refresh_token: bundle.refresh_token,
        refresh_expires_in: bundle
            .refresh_expires_at
            .map(|exp| (exp - now).num_seconds()),
        scope: scope.to_string(),
    })
}
