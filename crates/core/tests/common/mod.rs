#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common test utilities for integration tests.
//!
//! Drives the real router through `tower::ServiceExt::oneshot` against the
//! in-memory store and session machinery, so the full request path runs
//! without external services.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, header};
use axum::response::Response;
use http_body_util::BodyExt;
use tower::ServiceExt;
use uuid::Uuid;

use consentry::crypto::Keys;
use consentry::models::{Client, ClientType, GrantType, NewClient};
use consentry::session::{JwtSessions, MemorySessionStore};
use consentry::store::MemoryStore;
use consentry::{AppState, Config, Principal, ScopeSet};

/// Base secret shared by the store keys and the JWT signer.
pub const BASE_SECRET: &[u8] = b"integration-test-base-secret-0123456789abcdef";

/// A 43-char PKCE verifier (RFC 7636 appendix B) and its S256 challenge.
pub const PKCE_VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";

pub fn pkce_challenge() -> String {
    consentry::crypto::pkce_challenge(PKCE_VERIFIER)
}

/// Test application over the real routes and state.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub sessions: Arc<MemorySessionStore>,
    pub state: AppState,
}

impl TestApp {
    pub fn new(config: Config) -> Self {
        let keys = Keys::derive(BASE_SECRET).unwrap();
        let store = Arc::new(MemoryStore::new(keys));
        let sessions = Arc::new(MemorySessionStore::new());
        let jwt = Arc::new(JwtSessions::new(BASE_SECRET, sessions.clone()));
        let state = AppState::new(store.clone(), config, jwt.clone(), jwt);
        let router = consentry::routes::router().with_state(state.clone());
        Self {
            router,
            store,
            sessions,
            state,
        }
    }

    /// Scope universe: read, write, admin.
    pub fn default_config() -> Config {
        Config::new(ScopeSet::parse("read write admin").unwrap())
    }

    pub async fn seed_client(
        &self,
        client_type: ClientType,
        scope: &str,
        redirect_uris: &[&str],
    ) -> Client {
        use consentry::store::Store;

        self.store
            .insert_client(NewClient {
                name: "Test App".to_string(),
                description: String::new(),
                redirect_uris: redirect_uris.iter().map(|s| s.to_string()).collect(),
                scope: ScopeSet::parse(scope).unwrap(),
                grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
                client_type,
                owner_id: Uuid::now_v7(),
            })
            .await
            .unwrap()
    }

    pub async fn post_authorize(
        &self,
        principal: Option<Principal>,
        form: &[(&str, &str)],
    ) -> Response {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/authorize")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(principal) = principal {
            builder = builder.extension(principal);
        }
        let request = builder.body(Body::from(encode_form(form))).unwrap();
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn post_authorize_json(
        &self,
        principal: Option<Principal>,
        body: serde_json::Value,
    ) -> Response {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/authorize")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(principal) = principal {
            builder = builder.extension(principal);
        }
        let request = builder.body(Body::from(body.to_string())).unwrap();
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn post_token(&self, form: &[(&str, &str)]) -> Response {
        self.post_token_with_headers(form, &[]).await
    }

    pub async fn post_token_with_headers(
        &self,
        form: &[(&str, &str)],
        headers: &[(&str, String)],
    ) -> Response {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/token")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        for (name, value) in headers {
            builder = builder.header(*name, value);
        }
        let request = builder.body(Body::from(encode_form(form))).unwrap();
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Run the full consent flow and return the issued code.
    pub async fn authorize_code(
        &self,
        client: &Client,
        user: Principal,
        scope: &str,
        with_pkce: bool,
    ) -> String {
        let challenge = pkce_challenge();
        let mut form = vec![
            ("client_id", client.id.to_string()),
            ("redirect_uri", client.redirect_uris[0].clone()),
            ("response_type", "code".to_string()),
            ("scope", scope.to_string()),
            ("permission_granted", "true".to_string()),
        ];
        if with_pkce {
            form.push(("code_challenge", challenge));
            form.push(("code_challenge_method", "S256".to_string()));
        }
        let form: Vec<(&str, &str)> = form.iter().map(|(k, v)| (*k, v.as_str())).collect();

        let response = self.post_authorize(Some(user), &form).await;
        assert_eq!(response.status(), 200, "authorize should succeed");

        let body = json_body(response).await;
        let redirect_to = body["redirect_to"].as_str().unwrap();
        query_params(redirect_to).remove("code").unwrap()
    }
}

/// `application/x-www-form-urlencoded` encoding of key/value pairs.
pub fn encode_form(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Collect a response body as JSON.
pub async fn json_body(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Parse the query parameters of a `redirect_to` URL.
pub fn query_params(redirect_to: &str) -> HashMap<String, String> {
    url::Url::parse(redirect_to)
        .unwrap()
        .query_pairs()
        .into_owned()
        .collect()
}

/// Decode JWT claims with the test signing key (no validation shortcuts:
/// signature and expiry both checked).
pub fn decode_claims(token: &str) -> serde_json::Value {
    use jsonwebtoken::{Algorithm, DecodingKey, Validation};

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_required_spec_claims(&["exp"]);
    jsonwebtoken::decode::<serde_json::Value>(
        token,
        &DecodingKey::from_secret(BASE_SECRET),
        &validation,
    )
    .unwrap()
    .claims
}

/// Basic auth header value for a client id/secret pair.
pub fn basic_auth(client_id: &str, client_secret: &str) -> String {
    use base64::Engine;
    let encoded = base64::engine::general_purpose::STANDARD
        .encode(format!("{client_id}:{client_secret}"));
    format!("Basic {encoded}")
}
