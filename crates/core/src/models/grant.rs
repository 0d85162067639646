//! Short-lived one-time authorization codes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::client::GrantType;

/// A one-time code bound to an authorization.
///
/// The raw code is not a field here: the store persists only its keyed hash
/// and lookups go through [`crate::store::Store::get_grant_by_code`].
#[derive(Debug, Clone, Serialize)]
pub struct Grant {
    pub id: Uuid,
    pub authorization_id: Uuid,
    pub resource_owner_id: Uuid,
    pub grant_type: GrantType,
    pub redirect_uri: String,
    /// Whether the authorize request carried an explicit `redirect_uri`.
    /// The token exchange must repeat the parameter iff it did.
    pub redirect_uri_specified: bool,
    pub code_challenge: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created: DateTime<Utc>,
}

impl Grant {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Parameters for inserting a grant. `code` is the raw one-time code; the
/// store hashes it before persisting.
#[derive(Debug, Clone)]
pub struct NewGrant {
    pub authorization_id: Uuid,
    pub resource_owner_id: Uuid,
    pub code: String,
    pub redirect_uri: String,
    pub redirect_uri_specified: bool,
    pub code_challenge: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn expiry_is_inclusive_at_the_boundary() {
        let now = Utc::now();
        let grant = Grant {
            id: Uuid::now_v7(),
            authorization_id: Uuid::now_v7(),
            resource_owner_id: Uuid::now_v7(),
            grant_type: GrantType::AuthorizationCode,
            redirect_uri: "https://app.example.com/cb".to_string(),
            redirect_uri_specified: true,
            code_challenge: None,
            expires_at: now,
            created: now - Duration::seconds(600),
        };

        assert!(grant.is_expired_at(now));
        assert!(!grant.is_expired_at(now - Duration::seconds(1)));
    }
}
