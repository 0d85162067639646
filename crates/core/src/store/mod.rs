//! Storage contract and built-in backends.
//!
//! The core only performs the narrowly-typed operations below; everything
//! else about the relational schema (migrations, application CRUD UIs) is
//! the host's concern. [`PgStore`] is the production backend; [`MemoryStore`]
//! backs tests and demos.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::crypto::CryptoError;
use crate::models::{Authorization, Client, Grant, NewClient, NewGrant};
use crate::scope::ScopeSet;

/// Error type produced by [`Store`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A database-level unique index rejected the write.
    #[error("unique constraint violated on {0}")]
    UniqueViolation(&'static str),

    /// A referenced parent row does not exist.
    #[error("{0} does not exist")]
    ForeignKeyViolation(&'static str),

    /// A stored row could not be decoded into its domain type.
    #[error("corrupt row: {0}")]
    Corrupt(&'static str),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

/// Persistence contract for the authorization server core.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch a client by id.
    async fn get_client(&self, id: Uuid) -> Result<Option<Client>, StoreError>;

    /// Register a client. The store generates the id and a fresh
    /// high-entropy secret, stored encrypted at rest.
    async fn insert_client(&self, new: NewClient) -> Result<Client, StoreError>;

    /// Narrow a client's scope and, in the same transaction, intersect the
    /// scope of every dependent authorization with the new client scope.
    /// Authorizations whose scope would become empty are deleted.
    async fn update_client_scope(&self, id: Uuid, scope: &ScopeSet)
    -> Result<Client, StoreError>;

    /// Fetch the at-most-one authorization for a `(client, owner)` pair.
    async fn get_authorization(
        &self,
        client_id: Uuid,
        resource_owner_id: Uuid,
    ) -> Result<Option<Authorization>, StoreError>;

    /// Atomically insert an authorization or expand an existing row's scope
    /// to the union of old and new. An authorize call never shrinks scope.
    async fn upsert_authorization(
        &self,
        client_id: Uuid,
        resource_owner_id: Uuid,
        scope: &ScopeSet,
    ) -> Result<Authorization, StoreError>;

    /// Remove a user's consent for a client, cascading to its grants.
    /// Returns false when no row existed.
    async fn delete_authorization(
        &self,
        client_id: Uuid,
        resource_owner_id: Uuid,
    ) -> Result<bool, StoreError>;

    /// Look up an unexpired grant by its raw code, with the parent
    /// authorization preloaded. Expired rows are indistinguishable from
    /// absent ones.
    async fn get_grant_by_code(
        &self,
        code: &str,
    ) -> Result<Option<(Grant, Authorization)>, StoreError>;

    /// Insert a grant. The unique index on the hashed code column is the
    /// single-use guarantee.
    async fn insert_grant(&self, new: NewGrant) -> Result<Grant, StoreError>;

    /// Delete a grant by id. The returned flag gates token issuance: exactly
    /// one of two concurrent exchanges of the same code observes `true`.
    async fn delete_grant(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Bulk-delete grants whose `expires_at` has passed. Idempotent.
    async fn delete_expired_grants(&self) -> Result<u64, StoreError>;
}
