//! Authorize-endpoint validation.
//!
//! OAuth 2.1 wants three different failure behaviors out of this request,
//! so validation runs in stages and the outcome is a three-way sum:
//!
//! - `NoRedirect` — the client or redirect URI could not be established, or
//!   the consent UI itself misbehaved. Redirecting would hand control to an
//!   untrusted target, so these surface as a 400 JSON body.
//! - `ErrorRedirect` — the redirect target is trusted; the error goes back
//!   to the client application through the redirect envelope.
//! - `Proceed` — a fully validated changeset ready for grant issuance.

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::config::Config;
use crate::error::ErrorCode;
use crate::models::{Client, GrantType};
use crate::principal::Principal;
use crate::scope::ScopeSet;
use crate::validate::{BLANK, FieldErrors, INVALID, INVALID_ENTRY};

/// Raw authorize-request parameters, as strings. Blank values are treated
/// as absent during extraction.
#[derive(Debug, Default, Clone)]
pub struct AuthorizeParams {
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub response_type: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub permission_granted: Option<String>,
}

impl AuthorizeParams {
    /// Build from a decoded key/value body, ignoring unknown keys and
    /// treating empty values as absent.
    pub fn from_map(mut map: BTreeMap<String, String>) -> Self {
        let mut take = |key: &str| map.remove(key).filter(|v| !v.is_empty());
        Self {
            client_id: take("client_id"),
            redirect_uri: take("redirect_uri"),
            response_type: take("response_type"),
            scope: take("scope"),
            state: take("state"),
            code_challenge: take("code_challenge"),
            code_challenge_method: take("code_challenge_method"),
            permission_granted: take("permission_granted"),
        }
    }

    /// Whether the request carries a usable `scope` value.
    pub fn has_scope(&self) -> bool {
        self.scope.as_deref().is_some_and(|s| !s.trim().is_empty())
    }
}

/// Validated output of a successful authorize request.
#[derive(Debug, Clone)]
pub struct AuthorizeChangeset {
    pub client_id: Uuid,
    pub resource_owner_id: Uuid,
    pub redirect_uri: String,
    pub redirect_uri_specified: bool,
    pub scope: ScopeSet,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
}

/// The three-way validation outcome.
#[derive(Debug, Clone)]
pub enum AuthorizeOutcome {
    /// 400 JSON `{"errors": {...}}`; the redirect target is untrusted.
    NoRedirect(FieldErrors),
    /// Redirect back to the client with an OAuth error code.
    ErrorRedirect {
        redirect_uri: String,
        state: Option<String>,
        code: ErrorCode,
        description: String,
    },
    /// Proceed to grant issuance.
    Proceed(AuthorizeChangeset),
}

/// Lexically recognized `response_type` values. Only `code` is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseType {
    Code,
    Token,
}

impl ResponseType {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "code" => Some(ResponseType::Code),
            "token" => Some(ResponseType::Token),
            _ => None,
        }
    }
}

/// Lexically recognized `code_challenge_method` values. Only `S256` is
/// supported; `plain` is recognized but rejected later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChallengeMethod {
    S256,
    Plain,
}

impl ChallengeMethod {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "S256" => Some(ChallengeMethod::S256),
            "plain" => Some(ChallengeMethod::Plain),
            _ => None,
        }
    }
}

/// An accumulated cross-check failure with its OAuth error code.
struct Check {
    field: &'static str,
    message: String,
    code: ErrorCode,
}

/// Pick the most specific code when several checks failed at once.
fn most_specific(checks: &[Check]) -> ErrorCode {
    fn rank(code: ErrorCode) -> u8 {
        match code {
            ErrorCode::AccessDenied => 5,
            ErrorCode::UnauthorizedClient => 4,
            ErrorCode::UnsupportedResponseType => 3,
            ErrorCode::InvalidScope => 2,
            _ => 1,
        }
    }
    checks
        .iter()
        .max_by_key(|c| rank(c.code))
        .map_or(ErrorCode::InvalidRequest, |c| c.code)
}

fn joined(checks: &[Check]) -> String {
    checks
        .iter()
        .map(|c| format!("{}: {}", c.field, c.message))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and require `client_id` before anything else; the client lookup it
/// feeds is the one piece of I/O the caller performs for this validator.
pub fn parse_client_id(params: &AuthorizeParams) -> Result<Uuid, FieldErrors> {
    let Some(raw) = params.client_id.as_deref() else {
        return Err(FieldErrors::single("client_id", BLANK));
    };
    raw.parse()
        .map_err(|_| FieldErrors::single("client_id", INVALID))
}

/// Run the remaining stages against a resolved client.
///
/// `existing_scope` is the scope of the caller's prior authorization for
/// this client, if any; it backs an omitted `scope` parameter.
pub fn validate(
    params: &AuthorizeParams,
    client: &Client,
    principal: Principal,
    existing_scope: Option<&ScopeSet>,
    config: &Config,
) -> AuthorizeOutcome {
    // Stage 1 — establish a trusted redirect target or refuse to redirect.
    let (redirect_uri, redirect_uri_specified) =
        match resolve_redirect_uri(params.redirect_uri.as_deref(), &client.redirect_uris) {
            Ok(resolved) => resolved,
            Err(errors) => return AuthorizeOutcome::NoRedirect(errors),
        };

    let error_redirect = |code: ErrorCode, description: String| AuthorizeOutcome::ErrorRedirect {
        redirect_uri: redirect_uri.clone(),
        state: params.state.clone(),
        code,
        description,
    };

    // Stage 2 — lexical casts that gate everything downstream.
    let mut lexical = FieldErrors::new();
    let response_type = match params.response_type.as_deref() {
        None => {
            lexical.add("response_type", BLANK);
            None
        }
        Some(raw) => match ResponseType::parse(raw) {
            Some(rt) => Some(rt),
            None => {
                lexical.add("response_type", INVALID);
                None
            }
        },
    };
    let challenge_method = match params.code_challenge_method.as_deref() {
        None => None,
        Some(raw) => match ChallengeMethod::parse(raw) {
            Some(method) => Some(method),
            None => {
                lexical.add("code_challenge_method", INVALID);
                None
            }
        },
    };
    if !lexical.is_empty() {
        return error_redirect(ErrorCode::InvalidRequest, lexical.joined());
    }

    // Stage 3 — a missing or unparseable consent flag is a bug in the
    // consent UI, not in the client application; never redirect it.
    let permission_granted = match params.permission_granted.as_deref() {
        None => {
            return AuthorizeOutcome::NoRedirect(FieldErrors::single("permission_granted", BLANK));
        }
        Some("true") => true,
        Some("false") => false,
        Some(_) => {
            return AuthorizeOutcome::NoRedirect(FieldErrors::single(
                "permission_granted",
                INVALID,
            ));
        }
    };

    // Stage 4 — cross-checks, accumulated.
    let mut checks = Vec::new();

    if !permission_granted {
        checks.push(Check {
            field: "permission_granted",
            message: "access was denied".to_string(),
            code: ErrorCode::AccessDenied,
        });
    }

    match response_type {
        Some(ResponseType::Code) => {
            if !client.supports_grant_type(GrantType::AuthorizationCode) {
                checks.push(Check {
                    field: "response_type",
                    message: "is not enabled for this client".to_string(),
                    code: ErrorCode::UnauthorizedClient,
                });
            }
        }
        Some(ResponseType::Token) => checks.push(Check {
            field: "response_type",
            message: "is not supported".to_string(),
            code: ErrorCode::UnsupportedResponseType,
        }),
        // Unreachable past stage 2; kept for exhaustiveness.
        None => checks.push(Check {
            field: "response_type",
            message: BLANK.to_string(),
            code: ErrorCode::InvalidRequest,
        }),
    }

    let scope = resolve_scope(params, client, existing_scope, config, &mut checks);

    let code_challenge = check_pkce(params, challenge_method, client, config, &mut checks);

    if !checks.is_empty() {
        return error_redirect(most_specific(&checks), joined(&checks));
    }

    let Some(scope) = scope else {
        // resolve_scope pushed a check for every None it returns.
        return error_redirect(ErrorCode::InvalidRequest, "scope: can't be blank".to_string());
    };

    AuthorizeOutcome::Proceed(AuthorizeChangeset {
        client_id: client.id,
        resource_owner_id: principal.user_id,
        redirect_uri,
        redirect_uri_specified,
        scope,
        state: params.state.clone(),
        code_challenge,
    })
}

/// Resolve the redirect target per RFC 6749 §3.1.2.3: required when more
/// than one URI is registered, defaulted when exactly one is. Comparison is
/// by exact string; no normalization.
fn resolve_redirect_uri(
    requested: Option<&str>,
    registered: &[String],
) -> Result<(String, bool), FieldErrors> {
    match requested {
        Some(uri) => {
            if registered.iter().any(|r| r == uri) {
                Ok((uri.to_string(), true))
            } else {
                Err(FieldErrors::single("redirect_uri", INVALID_ENTRY))
            }
        }
        None => match registered {
            [only] => Ok((only.clone(), false)),
            _ => Err(FieldErrors::single("redirect_uri", BLANK)),
        },
    }
}

/// Determine the granted scope: the requested set when provided (checked
/// against the server and client universes), else the prior authorization's.
fn resolve_scope(
    params: &AuthorizeParams,
    client: &Client,
    existing_scope: Option<&ScopeSet>,
    config: &Config,
    checks: &mut Vec<Check>,
) -> Option<ScopeSet> {
    match params.scope.as_deref() {
        Some(raw) if params.has_scope() => {
            let Ok(requested) = ScopeSet::parse(raw) else {
                checks.push(Check {
                    field: "scope",
                    message: INVALID.to_string(),
                    code: ErrorCode::InvalidScope,
                });
                return None;
            };
            if !requested.is_subset_of(&config.scopes) {
                checks.push(Check {
                    field: "scope",
                    message: "must be a subset of server scopes".to_string(),
                    code: ErrorCode::InvalidScope,
                });
                return None;
            }
            if !requested.is_subset_of(&client.scope) {
                checks.push(Check {
                    field: "scope",
                    message: "exceeds client scope".to_string(),
                    code: ErrorCode::AccessDenied,
                });
                return None;
            }
            Some(requested)
        }
        _ => match existing_scope {
            Some(existing) => Some(existing.clone()),
            None => {
                checks.push(Check {
                    field: "scope",
                    message: BLANK.to_string(),
                    code: ErrorCode::InvalidRequest,
                });
                None
            }
        },
    }
}

/// Enforce the PKCE policy and the pairing of challenge and method.
fn check_pkce(
    params: &AuthorizeParams,
    method: Option<ChallengeMethod>,
    client: &Client,
    config: &Config,
    checks: &mut Vec<Check>,
) -> Option<String> {
    let challenge = params.code_challenge.as_deref();
    let required = config.enforce_pkce.required_for(client.client_type);

    match (challenge, method) {
        (Some(challenge), Some(ChallengeMethod::S256)) => {
            if is_valid_challenge(challenge) {
                Some(challenge.to_string())
            } else {
                checks.push(Check {
                    field: "code_challenge",
                    message: INVALID.to_string(),
                    code: ErrorCode::InvalidRequest,
                });
                None
            }
        }
        (Some(_), Some(ChallengeMethod::Plain)) => {
            checks.push(Check {
                field: "code_challenge_method",
                message: "only S256 is supported".to_string(),
                code: ErrorCode::InvalidRequest,
            });
            None
        }
        (Some(_), None) => {
            checks.push(Check {
                field: "code_challenge_method",
                message: BLANK.to_string(),
                code: ErrorCode::InvalidRequest,
            });
            None
        }
        (None, Some(_)) => {
            checks.push(Check {
                field: "code_challenge",
                message: BLANK.to_string(),
                code: ErrorCode::InvalidRequest,
            });
            None
        }
        (None, None) => {
            if required {
                checks.push(Check {
                    field: "code_challenge",
                    message: format!("{BLANK} (PKCE is required)"),
                    code: ErrorCode::InvalidRequest,
                });
                checks.push(Check {
                    field: "code_challenge_method",
                    message: BLANK.to_string(),
                    code: ErrorCode::InvalidRequest,
                });
            }
            None
        }
    }
}

/// An S256 challenge is base64url of a SHA-256 digest: 43–128 chars from
/// the verifier alphabet (RFC 7636 §4.2).
fn is_valid_challenge(challenge: &str) -> bool {
    (43..=128).contains(&challenge.len())
        && challenge
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::PkceEnforcement;
    use crate::crypto;
    use crate::models::ClientType;
    use chrono::Utc;

    fn client_with_uris(uris: &[&str]) -> Client {
        Client {
            id: Uuid::now_v7(),
            name: "App".to_string(),
            description: String::new(),
            secret: "secret".to_string(),
            redirect_uris: uris.iter().map(|s| s.to_string()).collect(),
            scope: ScopeSet::parse("read write").unwrap(),
            grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
            client_type: ClientType::Confidential,
            owner_id: Uuid::now_v7(),
            created: Utc::now(),
            changed: Utc::now(),
        }
    }

    fn client() -> Client {
        client_with_uris(&["https://app.example.com/cb"])
    }

    fn config() -> Config {
        Config::new(ScopeSet::parse("read write admin").unwrap())
            .with_enforce_pkce(PkceEnforcement::No)
    }

    fn params() -> AuthorizeParams {
        AuthorizeParams {
            client_id: None,
            redirect_uri: Some("https://app.example.com/cb".to_string()),
            response_type: Some("code".to_string()),
            scope: Some("read".to_string()),
            state: Some("xyz".to_string()),
            code_challenge: None,
            code_challenge_method: None,
            permission_granted: Some("true".to_string()),
        }
    }

    fn principal() -> Principal {
        Principal::new(Uuid::now_v7())
    }

    fn expect_redirect(outcome: AuthorizeOutcome) -> (ErrorCode, String) {
        match outcome {
            AuthorizeOutcome::ErrorRedirect {
                code, description, ..
            } => (code, description),
            other => panic!("expected ErrorRedirect, got {other:?}"),
        }
    }

    #[test]
    fn happy_path_produces_changeset() {
        let client = client();
        let who = principal();
        let outcome = validate(&params(), &client, who, None, &config());

        let AuthorizeOutcome::Proceed(changeset) = outcome else {
            panic!("expected Proceed");
        };
        assert_eq!(changeset.client_id, client.id);
        assert_eq!(changeset.resource_owner_id, who.user_id);
        assert_eq!(changeset.redirect_uri, "https://app.example.com/cb");
        assert!(changeset.redirect_uri_specified);
        assert_eq!(changeset.scope.as_slice(), &["read"]);
        assert_eq!(changeset.state.as_deref(), Some("xyz"));
        assert!(changeset.code_challenge.is_none());
    }

    #[test]
    fn missing_client_id_is_blank() {
        let errors = parse_client_id(&AuthorizeParams::default()).unwrap_err();
        assert_eq!(errors.joined(), "client_id: can't be blank");
    }

    #[test]
    fn malformed_client_id_is_invalid() {
        let mut p = params();
        p.client_id = Some("not-a-uuid".to_string());
        let errors = parse_client_id(&p).unwrap_err();
        assert_eq!(errors.joined(), "client_id: is invalid");
    }

    #[test]
    fn unregistered_redirect_uri_never_redirects() {
        let mut p = params();
        p.redirect_uri = Some("https://evil.example.com/cb".to_string());
        let outcome = validate(&p, &client(), principal(), None, &config());

        let AuthorizeOutcome::NoRedirect(errors) = outcome else {
            panic!("expected NoRedirect");
        };
        assert_eq!(
            serde_json::to_value(&errors).unwrap(),
            serde_json::json!({"redirect_uri": ["invalid entry"]})
        );
    }

    #[test]
    fn omitted_redirect_uri_resolves_when_single() {
        let mut p = params();
        p.redirect_uri = None;
        let outcome = validate(&p, &client(), principal(), None, &config());

        let AuthorizeOutcome::Proceed(changeset) = outcome else {
            panic!("expected Proceed");
        };
        assert_eq!(changeset.redirect_uri, "https://app.example.com/cb");
        assert!(!changeset.redirect_uri_specified);
    }

    #[test]
    fn omitted_redirect_uri_is_ambiguous_with_two_registered() {
        let client = client_with_uris(&["https://a.example.com/cb", "https://b.example.com/cb"]);
        let mut p = params();
        p.redirect_uri = None;
        let outcome = validate(&p, &client, principal(), None, &config());

        let AuthorizeOutcome::NoRedirect(errors) = outcome else {
            panic!("expected NoRedirect");
        };
        assert_eq!(errors.joined(), "redirect_uri: can't be blank");
    }

    #[test]
    fn missing_response_type_redirects_invalid_request() {
        let mut p = params();
        p.response_type = None;
        let (code, description) = expect_redirect(validate(&p, &client(), principal(), None, &config()));
        assert_eq!(code, ErrorCode::InvalidRequest);
        assert_eq!(description, "response_type: can't be blank");
    }

    #[test]
    fn unrecognized_response_type_redirects_invalid_request() {
        let mut p = params();
        p.response_type = Some("c0de".to_string());
        let (code, _) = expect_redirect(validate(&p, &client(), principal(), None, &config()));
        assert_eq!(code, ErrorCode::InvalidRequest);
    }

    #[test]
    fn token_response_type_is_unsupported() {
        let mut p = params();
        p.response_type = Some("token".to_string());
        let (code, description) =
            expect_redirect(validate(&p, &client(), principal(), None, &config()));
        assert_eq!(code, ErrorCode::UnsupportedResponseType);
        assert_eq!(description, "response_type: is not supported");
    }

    #[test]
    fn code_without_grant_type_is_unauthorized_client() {
        let mut client = client();
        client.grant_types = vec![GrantType::RefreshToken];
        let (code, _) = expect_redirect(validate(&params(), &client, principal(), None, &config()));
        assert_eq!(code, ErrorCode::UnauthorizedClient);
    }

    #[test]
    fn unknown_scope_is_invalid_scope() {
        let mut p = params();
        p.scope = Some("read nonexistent".to_string());
        let (code, description) =
            expect_redirect(validate(&p, &client(), principal(), None, &config()));
        assert_eq!(code, ErrorCode::InvalidScope);
        assert_eq!(description, "scope: must be a subset of server scopes");
    }

    #[test]
    fn recognized_scope_beyond_client_is_access_denied() {
        let mut p = params();
        // `admin` exists server-side but the client only has read/write.
        p.scope = Some("read admin".to_string());
        let (code, description) =
            expect_redirect(validate(&p, &client(), principal(), None, &config()));
        assert_eq!(code, ErrorCode::AccessDenied);
        assert_eq!(description, "scope: exceeds client scope");
    }

    #[test]
    fn omitted_scope_uses_prior_authorization() {
        let mut p = params();
        p.scope = None;
        let existing = ScopeSet::parse("write").unwrap();
        let outcome = validate(&p, &client(), principal(), Some(&existing), &config());

        let AuthorizeOutcome::Proceed(changeset) = outcome else {
            panic!("expected Proceed");
        };
        assert_eq!(changeset.scope.as_slice(), &["write"]);
    }

    #[test]
    fn omitted_scope_without_prior_authorization_is_required() {
        let mut p = params();
        p.scope = None;
        let (code, description) =
            expect_redirect(validate(&p, &client(), principal(), None, &config()));
        assert_eq!(code, ErrorCode::InvalidRequest);
        assert_eq!(description, "scope: can't be blank");
    }

    #[test]
    fn pkce_required_and_missing_accumulates_both_fields() {
        let config = Config::new(ScopeSet::parse("read write").unwrap());
        let (code, description) =
            expect_redirect(validate(&params(), &client(), principal(), None, &config));
        assert_eq!(code, ErrorCode::InvalidRequest);
        assert_eq!(
            description,
            "code_challenge: can't be blank (PKCE is required), code_challenge_method: can't be blank"
        );
    }

    #[test]
    fn pkce_public_only_spares_confidential_clients() {
        let config = Config::new(ScopeSet::parse("read write").unwrap())
            .with_enforce_pkce(PkceEnforcement::Public);
        assert!(matches!(
            validate(&params(), &client(), principal(), None, &config),
            AuthorizeOutcome::Proceed(_)
        ));

        let mut public = client();
        public.client_type = ClientType::Public;
        let (code, _) = expect_redirect(validate(&params(), &public, principal(), None, &config));
        assert_eq!(code, ErrorCode::InvalidRequest);
    }

    #[test]
    fn valid_pkce_pair_is_carried_into_the_changeset() {
        let challenge = crypto::pkce_challenge("verifier!");
        let mut p = params();
        p.code_challenge = Some(challenge.clone());
        p.code_challenge_method = Some("S256".to_string());

        let outcome = validate(&p, &client(), principal(), None, &config());
        let AuthorizeOutcome::Proceed(changeset) = outcome else {
            panic!("expected Proceed");
        };
        assert_eq!(changeset.code_challenge.as_deref(), Some(challenge.as_str()));
    }

    #[test]
    fn plain_challenge_method_is_rejected() {
        let mut p = params();
        p.code_challenge = Some(crypto::pkce_challenge("verifier!"));
        p.code_challenge_method = Some("plain".to_string());
        let (code, description) =
            expect_redirect(validate(&p, &client(), principal(), None, &config()));
        assert_eq!(code, ErrorCode::InvalidRequest);
        assert_eq!(description, "code_challenge_method: only S256 is supported");
    }

    #[test]
    fn challenge_without_method_and_vice_versa() {
        let mut only_challenge = params();
        only_challenge.code_challenge = Some(crypto::pkce_challenge("verifier!"));
        let (_, description) =
            expect_redirect(validate(&only_challenge, &client(), principal(), None, &config()));
        assert_eq!(description, "code_challenge_method: can't be blank");

        let mut only_method = params();
        only_method.code_challenge_method = Some("S256".to_string());
        let (_, description) =
            expect_redirect(validate(&only_method, &client(), principal(), None, &config()));
        assert_eq!(description, "code_challenge: can't be blank");
    }

    #[test]
    fn garbage_challenge_method_redirects_invalid_request() {
        let mut p = params();
        p.code_challenge = Some(crypto::pkce_challenge("verifier!"));
        p.code_challenge_method = Some("SHA256".to_string());
        let (code, description) =
            expect_redirect(validate(&p, &client(), principal(), None, &config()));
        assert_eq!(code, ErrorCode::InvalidRequest);
        assert_eq!(description, "code_challenge_method: is invalid");
    }

    #[test]
    fn missing_permission_is_a_consent_ui_bug() {
        let mut p = params();
        p.permission_granted = None;
        let AuthorizeOutcome::NoRedirect(errors) =
            validate(&p, &client(), principal(), None, &config())
        else {
            panic!("expected NoRedirect");
        };
        assert_eq!(errors.joined(), "permission_granted: can't be blank");
    }

    #[test]
    fn unparseable_permission_is_a_consent_ui_bug() {
        let mut p = params();
        p.permission_granted = Some("yes".to_string());
        assert!(matches!(
            validate(&p, &client(), principal(), None, &config()),
            AuthorizeOutcome::NoRedirect(_)
        ));
    }

    #[test]
    fn denied_permission_redirects_access_denied() {
        let mut p = params();
        p.permission_granted = Some("false".to_string());
        let (code, _) = expect_redirect(validate(&p, &client(), principal(), None, &config()));
        assert_eq!(code, ErrorCode::AccessDenied);
    }

    #[test]
    fn denial_outranks_other_check_failures() {
        let mut p = params();
        p.permission_granted = Some("false".to_string());
        p.scope = Some("read nonexistent".to_string());
        let (code, description) =
            expect_redirect(validate(&p, &client(), principal(), None, &config()));
        assert_eq!(code, ErrorCode::AccessDenied);
        assert!(description.contains("permission_granted"));
        assert!(description.contains("scope"));
    }

    #[test]
    fn state_is_echoed_on_error_redirects() {
        let mut p = params();
        p.response_type = None;
        let AuthorizeOutcome::ErrorRedirect { state, .. } =
            validate(&p, &client(), principal(), None, &config())
        else {
            panic!("expected ErrorRedirect");
        };
        assert_eq!(state.as_deref(), Some("xyz"));
    }

    #[test]
    fn params_from_map_drops_blanks_and_unknown_keys() {
        let mut map = BTreeMap::new();
        map.insert("client_id".to_string(), "abc".to_string());
        map.insert("redirect_uri".to_string(), String::new());
        map.insert("unknown".to_string(), "ignored".to_string());

        let p = AuthorizeParams::from_map(map);
        assert_eq!(p.client_id.as_deref(), Some("abc"));
        assert!(p.redirect_uri.is_none());
    }
}
