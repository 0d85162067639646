//! Application and protocol error types.

use axum::http::{HeaderName, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use thiserror::Error;

use crate::session::MinterError;
use crate::store::StoreError;

/// OAuth error codes the two endpoints emit (RFC 6749 §4.1.2.1 / §5.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    InvalidClient,
    InvalidGrant,
    UnauthorizedClient,
    UnsupportedGrantType,
    UnsupportedResponseType,
    InvalidScope,
    AccessDenied,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::InvalidClient => "invalid_client",
            ErrorCode::InvalidGrant => "invalid_grant",
            ErrorCode::UnauthorizedClient => "unauthorized_client",
            ErrorCode::UnsupportedGrantType => "unsupported_grant_type",
            ErrorCode::UnsupportedResponseType => "unsupported_response_type",
            ErrorCode::InvalidScope => "invalid_scope",
            ErrorCode::AccessDenied => "access_denied",
        }
    }
}

/// An OAuth protocol error: a code plus a human-readable description.
#[derive(Debug, Clone, Serialize)]
pub struct OAuthError {
    #[serde(rename = "error")]
    pub code: ErrorCode,
    #[serde(rename = "error_description")]
    pub description: String,
}

impl OAuthError {
    pub fn new(code: ErrorCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }
}

impl std::fmt::Display for OAuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.description)
    }
}

/// Token responses must never be cached (RFC 6749 §5.1); the authorize
/// envelope carries codes, so the same applies there.
pub(crate) fn no_store_headers() -> [(HeaderName, &'static str); 2] {
    [
        (header::CACHE_CONTROL, "no-store"),
        (header::PRAGMA, "no-cache"),
    ]
}

/// Endpoint-level error, mapped to an HTTP response.
#[derive(Debug, Error)]
pub enum AppError {
    /// No principal on the request — the upstream auth layer did not run.
    #[error("authentication required")]
    Unauthenticated,

    /// Request body media type is not accepted.
    #[error("unsupported media type")]
    UnsupportedMediaType,

    /// Protocol error surfaced as a 400 JSON body.
    #[error("{0}")]
    OAuth(OAuthError),

    /// Client authentication via the Basic header failed.
    #[error("invalid client credentials")]
    BasicAuthFailed,

    #[error("storage error")]
    Store(#[from] StoreError),

    #[error("minter error")]
    Minter(#[from] MinterError),

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl From<OAuthError> for AppError {
    fn from(e: OAuthError) -> Self {
        AppError::OAuth(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Unauthenticated => {
                (StatusCode::UNAUTHORIZED, "authentication required").into_response()
            }
            AppError::UnsupportedMediaType => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "expected application/x-www-form-urlencoded",
            )
                .into_response(),
            AppError::OAuth(e) => (
                StatusCode::BAD_REQUEST,
                [
                    (header::CACHE_CONTROL, "no-store"),
                    (header::PRAGMA, "no-cache"),
                    (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
                ],
                Json(e),
            )
                .into_response(),
            AppError::BasicAuthFailed => (
                StatusCode::UNAUTHORIZED,
                [
                    (header::WWW_AUTHENTICATE, "Basic"),
                    (header::CACHE_CONTROL, "no-store"),
                    (header::PRAGMA, "no-cache"),
                    (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
                ],
                "invalid client credentials",
            )
                .into_response(),
            AppError::Store(e) => {
                tracing::error!(error = %e, "storage error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
            AppError::Minter(e) => {
                tracing::error!(error = %e, "token minting error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
        }
    }
}

/// Result type alias using AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_serialize_to_rfc_names() {
        assert_eq!(ErrorCode::InvalidGrant.as_str(), "invalid_grant");
        let json = serde_json::to_string(&OAuthError::new(
            ErrorCode::UnsupportedGrantType,
            "grant_type: server supports authorization_code and refresh_token",
        ))
        .unwrap();
        assert!(json.contains("\"error\":\"unsupported_grant_type\""));
        assert!(json.contains("\"error_description\""));
    }

    #[test]
    fn oauth_error_maps_to_400_with_no_store() {
        let response =
            AppError::OAuth(OAuthError::new(ErrorCode::InvalidGrant, "code: not found"))
                .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            "no-store"
        );
    }

    #[test]
    fn basic_auth_failure_maps_to_401_with_challenge() {
        let response = AppError::BasicAuthFailed.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Basic"
        );
    }
}
