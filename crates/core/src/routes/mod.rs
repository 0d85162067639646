//! HTTP route handlers for the two protocol endpoints.

pub mod authorize;
pub mod token;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::post;

use crate::state::AppState;

/// Request bodies are bounded to 1 MiB.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Build the core router: `POST /authorize`, `POST /token`, and the CORS
/// preflight on the token path. Everything else is the host's 404.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/authorize", post(authorize::authorize))
        .route("/token", post(token::token).options(token::preflight))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}
