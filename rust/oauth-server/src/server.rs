//! HTTP handlers of the mock authorization server.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    routing::{any, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use project_shim_utils::error_full_message;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use url::Url;

use crate::{code_store::CodeStore, login, token::TokenIssuer};

pub const DEFAULT_REDIRECT_URI: &str = "http://example.org?no=1234";
pub const DEFAULT_USERINFO_USERNAME: &str = "johndoe@gmail.com";

#[derive(Clone)]
pub struct AppState {
    pub codes: Arc<CodeStore>,
    pub tokens: Arc<dyn TokenIssuer>,
    /// Reported as `preferred_username` by `/userinfo`
    pub userinfo_username: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/auth", any(auth))
        .route("/token", post(token))
        .route("/userinfo", any(userinfo))
        .route("/review", any(review))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
struct AuthQuery {
    username: Option<String>,
    redirect_uri: Option<String>,
    state: Option<String>,
    code_challenge_method: Option<String>,
}

async fn auth(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let is_post = method == Method::POST;
    // Form body first, then the query string
    let mut principal = if is_post {
        form_value(&headers, &body, "username")
            .or_else(|| query.username.clone())
            .unwrap_or_default()
    } else {
        String::new()
    };
    if let Some(user) = basic_auth_user(&headers) {
        principal = user;
    }

    let redirect_to = |status: StatusCode| {
        let code = state.codes.issue(&principal);
        tracing::info!(%principal, %status, "issued authorization code");
        let location = redirect_location(
            query.redirect_uri.as_deref(),
            query.state.as_deref().unwrap_or_default(),
            &code,
        );
        (status, [(header::LOCATION, location)]).into_response()
    };

    // PKCE clients (`oc login`) authenticate with Basic credentials and must be challenged
    if is_set(query.code_challenge_method.as_deref()) {
        if has_basic_authorization(&headers) {
            return redirect_to(StatusCode::FOUND);
        }
        return (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, r#"Basic realm="openshift""#)],
        )
            .into_response();
    }
    if is_post {
        return redirect_to(StatusCode::TEMPORARY_REDIRECT);
    }
    Html(login::render(&uri.to_string())).into_response()
}

#[derive(Debug, Default, Deserialize)]
struct CodeQuery {
    code: Option<String>,
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    token: String,
    access_token: String,
    token_type: &'static str,
}

async fn token(
    State(state): State<AppState>,
    Query(query): Query<CodeQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let code = form_value(&headers, &body, "code").or(query.code);
    let Some(principal) = code.as_deref().and_then(|code| state.codes.redeem(code)) else {
        tracing::debug!("rejecting unknown or expired authorization code");
        return (
            StatusCode::UNAUTHORIZED,
            [(header::CONTENT_TYPE, "application/json")],
        )
            .into_response();
    };
    match state.tokens.issue(&principal).await {
        Ok(issued) => {
            tracing::info!(
                %principal,
                expires_at = ?issued.expires_at,
                "exchanged authorization code for token"
            );
            let token = issued.token.0;
            Json(TokenResponse {
                token: token.clone(),
                access_token: token,
                token_type: "Bearer",
            })
            .into_response()
        }
        Err(error) => {
            tracing::error!(
                error = &error as &dyn std::error::Error,
                %principal,
                "failed to issue token"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, error_full_message(&error)).into_response()
        }
    }
}

async fn userinfo(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "metadata": {
            "name": "kube-admin",
            "email": "a@a.com",
            "preferred_username": state.userinfo_username,
            "sub": "xxx62ccaea02",
        }
    }))
}

async fn review() -> Json<serde_json::Value> {
    Json(json!({"allowed": true}))
}

fn is_set(value: Option<&str>) -> bool {
    value.is_some_and(|value| !value.is_empty())
}

fn has_basic_authorization(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("Basic "))
}

/// The user name of `Authorization: Basic` credentials; the password is never checked.
fn basic_auth_user(headers: &HeaderMap) -> Option<String> {
    let encoded = headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;
    let (user, _password) = credentials.split_once(':')?;
    Some(user.to_string())
}

/// Looks up `key` in a url-encoded form body.
fn form_value(headers: &HeaderMap, body: &[u8], key: &str) -> Option<String> {
    let is_form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"));
    if !is_form {
        return None;
    }
    url::form_urlencoded::parse(body)
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.into_owned())
}

/// Sets `state` and `code` on the redirect URI, replacing any existing values.
///
/// URIs that don't parse get the parameters appended as-is.
fn redirect_location(redirect_uri: Option<&str>, state: &str, code: &str) -> String {
    let redirect_uri = redirect_uri
        .filter(|uri| !uri.is_empty())
        .unwrap_or(DEFAULT_REDIRECT_URI);
    match Url::parse(redirect_uri) {
        Ok(mut url) => {
            let kept = url
                .query_pairs()
                .filter(|(name, _)| name != "state" && name != "code")
                .map(|(name, value)| (name.into_owned(), value.into_owned()))
                .collect::<Vec<_>>();
            url.query_pairs_mut()
                .clear()
                .extend_pairs(kept)
                .append_pair("state", state)
                .append_pair("code", code);
            url.to_string()
        }
        Err(error) => {
            tracing::debug!(%error, redirect_uri, "passing unparseable redirect URI through");
            let params = url::form_urlencoded::Serializer::new(String::new())
                .append_pair("state", state)
                .append_pair("code", code)
                .finish();
            let separator = if redirect_uri.contains('?') { '&' } else { '?' };
            format!("{redirect_uri}{separator}{params}")
        }
    }
}
