//! Persistent entities: clients, authorizations, grants.

pub mod authorization;
pub mod client;
pub mod grant;

pub use authorization::Authorization;
pub use client::{Client, ClientType, GrantType, NewClient};
pub use grant::{Grant, NewGrant};
