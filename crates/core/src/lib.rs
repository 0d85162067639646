//! Embeddable OAuth 2.1 authorization server core.
//!
//! The crate provides the two protocol endpoints (`POST /authorize`,
//! `POST /token`), the persistent data model behind them (clients,
//! authorizations, grants), and the validators that enforce the OAuth 2.1
//! invariants: PKCE, exact redirect-URI matching, scope subsetting, and
//! single-use codes. User authentication and token signing stay with the
//! host: the authorize endpoint reads the caller from a [`Principal`] the
//! host's auth layer injects, and token issuance goes through the pluggable
//! [`session::TokenMinter`] / [`session::RefreshTokenVerifier`] boundary.

pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod models;
pub mod principal;
pub mod routes;
pub mod scope;
pub mod session;
pub mod state;
pub mod store;
pub mod sweep;
pub mod validate;

// Re-export the types a host touches when embedding the core.
pub use config::{Config, PkceEnforcement};
pub use error::{AppError, ErrorCode, OAuthError};
pub use principal::Principal;
pub use scope::ScopeSet;
pub use state::AppState;
