//! The authenticated caller of the authorize endpoint.
//!
//! The core does not authenticate users. The host's auth middleware verifies
//! the session or bearer token and inserts a [`Principal`] into the request
//! extensions; the extractor below rejects requests that lack one.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::AppError;

/// Opaque authenticated principal set by an upstream layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    /// The resource owner on whose behalf the request runs.
    pub user_id: Uuid,
}

impl Principal {
    pub fn new(user_id: Uuid) -> Self {
        Self { user_id }
    }
}

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .copied()
            .ok_or(AppError::Unauthenticated)
    }
}
