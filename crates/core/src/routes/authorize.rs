//! The authorization endpoint.
//!
//! `POST /authorize` is called by the consent UI on behalf of a logged-in
//! user. The response is always JSON: a 200 "redirect envelope"
//! `{"redirect_to": ...}` the UI navigates to, or a 400 `{"errors": {...}}`
//! body when the redirect target itself could not be trusted. The user
//! agent performs the actual redirect, which lets the single-page consent
//! UI handle every outcome uniformly.

use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::crypto;
use crate::error::{AppError, AppResult, no_store_headers};
use crate::models::NewGrant;
use crate::principal::Principal;
use crate::state::AppState;
use crate::validate::authorize::{AuthorizeOutcome, AuthorizeParams, parse_client_id, validate};
use crate::validate::{DOES_NOT_EXIST, FieldErrors, INVALID};

/// The 200 JSON envelope carrying the redirect the user agent performs.
#[derive(Debug, Serialize)]
struct RedirectEnvelope {
    redirect_to: String,
}

/// POST /authorize.
pub async fn authorize(
    State(state): State<AppState>,
    principal: Principal,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let map = match parse_body(&headers, &body) {
        Ok(map) => map,
        Err(BodyError::UnsupportedMediaType) => return Err(AppError::UnsupportedMediaType),
        Err(BodyError::Malformed) => {
            return Ok(no_redirect(FieldErrors::single("request", INVALID)));
        }
    };
    let params = AuthorizeParams::from_map(map);

    let client_id = match parse_client_id(&params) {
        Ok(id) => id,
        Err(errors) => return Ok(no_redirect(errors)),
    };
    let Some(client) = state.store().get_client(client_id).await? else {
        return Ok(no_redirect(FieldErrors::single("client_id", DOES_NOT_EXIST)));
    };

    // An omitted scope falls back to the caller's prior consent.
    let existing_scope = if params.has_scope() {
        None
    } else {
        state
            .store()
            .get_authorization(client.id, principal.user_id)
            .await?
            .map(|a| a.scope)
    };

    match validate(
        &params,
        &client,
        principal,
        existing_scope.as_ref(),
        state.config(),
    ) {
        AuthorizeOutcome::NoRedirect(errors) => Ok(no_redirect(errors)),
        AuthorizeOutcome::ErrorRedirect {
            redirect_uri,
            state: state_param,
            code,
            description,
        } => {
            let mut pairs = vec![
                ("error", code.as_str()),
                ("error_description", description.as_str()),
            ];
            if let Some(s) = &state_param {
                pairs.push(("state", s.as_str()));
            }
            Ok(envelope(append_query(&redirect_uri, &pairs)))
        }
        AuthorizeOutcome::Proceed(changeset) => {
            // Upsert never shrinks scope; explicit revocation is the user's
            // own CRUD path.
            let authorization = state
                .store()
                .upsert_authorization(
                    changeset.client_id,
                    changeset.resource_owner_id,
                    &changeset.scope,
                )
                .await?;

            let code = crypto::random_urlsafe();
            state
                .store()
                .insert_grant(NewGrant {
                    authorization_id: authorization.id,
                    resource_owner_id: changeset.resource_owner_id,
                    code: code.clone(),
                    redirect_uri: changeset.redirect_uri.clone(),
                    redirect_uri_specified: changeset.redirect_uri_specified,
                    code_challenge: changeset.code_challenge.clone(),
                    expires_at: Utc::now() + state.config().grant_ttl,
                })
                .await?;

            info!(
                client_id = %changeset.client_id,
                user_id = %changeset.resource_owner_id,
                "authorization code issued"
            );

            let mut pairs = vec![("code", code.as_str())];
            if let Some(s) = &changeset.state {
                pairs.push(("state", s.as_str()));
            }
            Ok(envelope(append_query(&changeset.redirect_uri, &pairs)))
        }
    }
}

#[derive(Debug)]
enum BodyError {
    UnsupportedMediaType,
    Malformed,
}

/// Decode the request body into string key/value pairs. Form bodies are the
/// default; JSON is accepted for the consent UI's convenience, with scalars
/// coerced to their string form.
fn parse_body(headers: &HeaderMap, body: &Bytes) -> Result<BTreeMap<String, String>, BodyError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/x-www-form-urlencoded");

    if content_type.starts_with("application/json") {
        let value: serde_json::Value =
            serde_json::from_slice(body).map_err(|_| BodyError::Malformed)?;
        let object = value.as_object().ok_or(BodyError::Malformed)?;

        let mut map = BTreeMap::new();
        for (key, value) in object {
            let coerced = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Bool(b) => b.to_string(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Null => continue,
                _ => return Err(BodyError::Malformed),
            };
            map.insert(key.clone(), coerced);
        }
        Ok(map)
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        Ok(url::form_urlencoded::parse(body).into_owned().collect())
    } else {
        Err(BodyError::UnsupportedMediaType)
    }
}

fn no_redirect(errors: FieldErrors) -> Response {
    (
        StatusCode::BAD_REQUEST,
        no_store_headers(),
        Json(serde_json::json!({ "errors": errors })),
    )
        .into_response()
}

fn envelope(redirect_to: String) -> Response {
    (
        StatusCode::OK,
        no_store_headers(),
        Json(RedirectEnvelope { redirect_to }),
    )
        .into_response()
}

/// Append query parameters to an already-validated redirect URI, stripping
/// CR/LF so the value can never smuggle headers once the user agent follows
/// it.
fn append_query(uri: &str, pairs: &[(&str, &str)]) -> String {
    let mut out = String::from(uri);
    let mut separator = if uri.contains('?') { '&' } else { '?' };
    for (key, value) in pairs {
        out.push(separator);
        out.push_str(key);
        out.push('=');
        out.push_str(&urlencoding::encode(value));
        separator = '&';
    }
    out.chars().filter(|c| *c != '\r' && *c != '\n').collect()
}
