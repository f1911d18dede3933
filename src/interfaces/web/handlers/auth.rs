use axum::{
    Extension, Json,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use super::error_response;
use crate::core::graph::scopes::decode_claims;
use crate::core::store::types::SignIn;
use crate::interfaces::web::auth::{clear_session_cookie, session_cookie, session_lifetime};
use crate::interfaces::web::{AppState, CurrentUser};
use crate::logging::token_preview;

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

fn redirect(location: String) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

fn login_error(state: &AppState, code: &str) -> Response {
    redirect(format!(
        "{}/login?error={}",
        state.config.frontend_url.trim_end_matches('/'),
        urlencoding::encode(code)
    ))
}

pub async fn login(State(state): State<AppState>) -> Response {
    let login_state = state.pending_logins.issue().await;
    match state.credentials.authorization_url(&login_state) {
        Ok(url) => redirect(url),
        Err(e) => {
            error!("Login error: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

pub async fn callback(State(state): State<AppState>, Query(query): Query<CallbackQuery>) -> Response {
    if let Some(err) = query.error.as_deref() {
        warn!(
            "Sign-in rejected by identity provider: {} {}",
            err,
            query.error_description.as_deref().unwrap_or_default()
        );
        return login_error(&state, err);
    }

    let Some(code) = query.code.as_deref().filter(|c| !c.is_empty()) else {
        return login_error(&state, "no_code");
    };

    let state_ok = match query.state.as_deref() {
        Some(s) => state.pending_logins.consume(s).await,
        None => false,
    };
    if !state_ok {
        warn!("Sign-in callback with unknown or expired state");
        return login_error(&state, "invalid_state");
    }

    match complete_sign_in(&state, code).await {
        Ok(session) => {
            let secure = state.config.frontend_url.starts_with("https://");
            (
                StatusCode::FOUND,
                [
                    (
                        header::LOCATION,
                        format!(
                            "{}/dashboard",
                            state.config.frontend_url.trim_end_matches('/')
                        ),
                    ),
                    (header::SET_COOKIE, session_cookie(&session, secure)),
                ],
            )
                .into_response()
        }
        Err(e) => {
            error!("Callback error: {}", e);
            login_error(&state, "auth_failed")
        }
    }
}

/// Exchange the code, record the user and open a session. Returns the raw session token.
async fn complete_sign_in(state: &AppState, code: &str) -> anyhow::Result<String> {
    let tokens = state.credentials.exchange_code(code).await?;
    let account = tokens.account()?;
    let user = state
        .store
        .upsert_user(&SignIn {
            azure_id: account.azure_id,
            email: account.email,
            name: account.name,
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            token_expires_at: tokens.expires_at,
        })
        .await?;
    let session = state
        .store
        .create_session(&user.id, Utc::now() + session_lifetime())
        .await?;
    info!(
        "User {} signed in (token {})",
        user.email,
        token_preview(&tokens.access_token)
    );
    Ok(session)
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Response {
    match state.store.delete_session(&current.session_token).await {
        Ok(_) => (
            [(header::SET_COOKIE, clear_session_cookie())],
            Json(json!({ "message": "Logged out successfully" })),
        )
            .into_response(),
        Err(e) => {
            error!("Logout error: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to logout")
        }
    }
}

pub async fn me(Extension(current): Extension<CurrentUser>) -> Json<Value> {
    Json(json!(current.user.profile()))
}

fn claim_time(claims: Option<&Value>, name: &str) -> Option<String> {
    let secs = claims?.get(name)?.as_i64()?;
    DateTime::<Utc>::from_timestamp(secs, 0).map(|t| t.to_rfc3339())
}

/// Token claims summary plus a live `/me` call against Graph.
pub async fn test_token(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Response {
    let claims = decode_claims(&current.access_token);
    let scopes = claims
        .as_ref()
        .and_then(|c| c.get("scp").or_else(|| c.get("roles")))
        .cloned()
        .unwrap_or_else(|| json!("Not found"));

    let profile = match state.graph_api.client(&current.access_token) {
        Ok(client) => client.get_me().await,
        Err(e) => Err(e),
    };

    match profile {
        Ok(profile) => {
            let user = &current.user;
            Json(json!({
                "success": true,
                "message": "Token is valid",
                "user": {
                    "id": user.id,
                    "email": user.email,
                    "name": user.name,
                    "tokenExpiresAt": user.token_expires_at.map(|t| t.to_rfc3339()),
                    "tokenIsExpired": user.token_expires_at.map(|t| t < Utc::now()),
                    "tokenLength": current.access_token.len(),
                },
                "tokenClaims": {
                    "scp": scopes,
                    "aud": claims.as_ref().and_then(|c| c.get("aud")).cloned(),
                    "iss": claims.as_ref().and_then(|c| c.get("iss")).cloned(),
                    "exp": claim_time(claims.as_ref(), "exp"),
                    "iat": claim_time(claims.as_ref(), "iat"),
                },
                "graphProfile": profile,
            }))
            .into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "success": false,
                "error": "Token test failed",
                "details": e.to_string(),
                "reauthenticate": e.needs_reauthentication(),
            })),
        )
            .into_response(),
    }
}
