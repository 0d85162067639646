//! Registered third-party applications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::scope::ScopeSet;

/// Whether a client can keep a secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    Confidential,
    Public,
}

impl ClientType {
    pub fn as_str(self) -> &'static str {
        match self {
            ClientType::Confidential => "confidential",
            ClientType::Public => "public",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "confidential" => Some(ClientType::Confidential),
            "public" => Some(ClientType::Public),
            _ => None,
        }
    }
}

/// Grant types a client may be enabled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
}

impl GrantType {
    pub fn as_str(self) -> &'static str {
        match self {
            GrantType::AuthorizationCode => "authorization_code",
            GrantType::RefreshToken => "refresh_token",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "authorization_code" => Some(GrantType::AuthorizationCode),
            "refresh_token" => Some(GrantType::RefreshToken),
            _ => None,
        }
    }
}

impl std::fmt::Display for GrantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered third-party application.
///
/// `secret` is held decrypted in memory; at rest it is sealed by the store.
#[derive(Debug, Clone, Serialize)]
pub struct Client {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    #[serde(skip)]
    pub secret: String,
    pub redirect_uris: Vec<String>,
    pub scope: ScopeSet,
    pub grant_types: Vec<GrantType>,
    pub client_type: ClientType,
    pub owner_id: Uuid,
    pub created: DateTime<Utc>,
    pub changed: DateTime<Utc>,
}

impl Client {
    pub fn is_confidential(&self) -> bool {
        self.client_type == ClientType::Confidential
    }

    pub fn supports_grant_type(&self, grant_type: GrantType) -> bool {
        self.grant_types.contains(&grant_type)
    }
}

/// Parameters for registering a client. The store generates the id and the
/// secret; the secret is regenerated on every application-level write.
#[derive(Debug, Clone)]
pub struct NewClient {
    pub name: String,
    pub description: String,
    pub redirect_uris: Vec<String>,
    pub scope: ScopeSet,
    pub grant_types: Vec<GrantType>,
    pub client_type: ClientType,
    pub owner_id: Uuid,
}

impl NewClient {
    /// Validate registration input against the server's scope universe.
    ///
    /// Returns the offending field and message on failure.
    pub fn validate(&self, app_scopes: &ScopeSet) -> Result<(), (&'static str, String)> {
        if self.redirect_uris.is_empty() {
            return Err(("redirect_uris", "can't be blank".to_string()));
        }
        for uri in &self.redirect_uris {
            if let Err(msg) = validate_redirect_uri(uri) {
                return Err(("redirect_uris", format!("{uri}: {msg}")));
            }
        }
        if self.scope.is_empty() {
            return Err(("scope", "can't be blank".to_string()));
        }
        if !self.scope.is_subset_of(app_scopes) {
            return Err(("scope", "must be a subset of server scopes".to_string()));
        }
        if self.grant_types.is_empty() {
            return Err(("grant_types", "can't be blank".to_string()));
        }
        Ok(())
    }
}

/// A registrable redirect URI: absolute, no fragment, and `https` except for
/// loopback hosts (native-app development).
pub fn validate_redirect_uri(uri: &str) -> Result<(), &'static str> {
    let parsed = Url::parse(uri).map_err(|_| "is not a valid absolute URI")?;

    if parsed.fragment().is_some() {
        return Err("must not contain a fragment");
    }

    match parsed.scheme() {
        "https" => Ok(()),
        "http" => {
            let loopback = matches!(parsed.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));
            if loopback {
                Ok(())
            } else {
                Err("must use https")
            }
        }
        _ => Err("must use https"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn base_client() -> NewClient {
        NewClient {
            name: "Example".to_string(),
            description: String::new(),
            redirect_uris: vec!["https://app.example.com/cb".to_string()],
            scope: ScopeSet::parse("read write").unwrap(),
            grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
            client_type: ClientType::Confidential,
            owner_id: Uuid::now_v7(),
        }
    }

    #[test]
    fn grant_type_parse_roundtrip() {
        for gt in [GrantType::AuthorizationCode, GrantType::RefreshToken] {
            assert_eq!(GrantType::parse(gt.as_str()), Some(gt));
        }
        assert_eq!(GrantType::parse("client_credentials"), None);
    }

    #[test]
    fn redirect_uri_rules() {
        assert!(validate_redirect_uri("https://app.example.com/cb").is_ok());
        assert!(validate_redirect_uri("http://localhost:8080/cb").is_ok());
        assert!(validate_redirect_uri("http://127.0.0.1/cb").is_ok());
        assert!(validate_redirect_uri("http://app.example.com/cb").is_err());
        assert!(validate_redirect_uri("https://app.example.com/cb#frag").is_err());
        assert!(validate_redirect_uri("ftp://app.example.com/cb").is_err());
        assert!(validate_redirect_uri("/relative/path").is_err());
    }

    #[test]
    fn new_client_validation() {
        let app_scopes = ScopeSet::parse("read write admin").unwrap();
        assert!(base_client().validate(&app_scopes).is_ok());

        let mut no_uris = base_client();
        no_uris.redirect_uris.clear();
        assert_eq!(no_uris.validate(&app_scopes).unwrap_err().0, "redirect_uris");

        let mut wide_scope = base_client();
        wide_scope.scope = ScopeSet::parse("read everything").unwrap();
        assert_eq!(wide_scope.validate(&app_scopes).unwrap_err().0, "scope");

        let mut no_grants = base_client();
        no_grants.grant_types.clear();
        assert_eq!(no_grants.validate(&app_scopes).unwrap_err().0, "grant_types");
    }

    #[test]
    fn confidential_check() {
        let mut new = base_client();
        new.client_type = ClientType::Public;
        assert_eq!(new.client_type.as_str(), "public");
        assert_eq!(ClientType::parse("confidential"), Some(ClientType::Confidential));
        assert_eq!(ClientType::parse("other"), None);
    }
}
