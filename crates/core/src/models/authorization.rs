//! A user's standing consent for a specific client.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::scope::ScopeSet;

/// Persistent consent record. At most one row exists per
/// `(client_id, resource_owner_id)` pair, and its scope is always a subset
/// of the owning client's scope.
#[derive(Debug, Clone, Serialize)]
pub struct Authorization {
    pub id: Uuid,
    pub client_id: Uuid,
    pub resource_owner_id: Uuid,
    pub scope: ScopeSet,
    pub created: DateTime<Utc>,
    pub changed: DateTime<Utc>,
}
