use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use tracing::{error, warn};

use super::{AppState, CurrentUser};
use crate::core::oauth::{AuthError, ensure_valid_token};

pub(crate) const SESSION_COOKIE: &str = "consultflow_session";
pub(crate) const SESSION_TTL_HOURS: i64 = 24;

const LOGIN_REQUIRED: &str = "Unauthorized. Please login.";
const SESSION_EXPIRED: &str = "Session expired. Please login again.";

pub(crate) fn session_lifetime() -> Duration {
    Duration::hours(SESSION_TTL_HOURS)
}

/// `Set-Cookie` value for a new session. `Secure` is added when the frontend is served over https.
pub(crate) fn session_cookie(token: &str, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        token,
        SESSION_TTL_HOURS * 3600
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub(crate) fn clear_session_cookie() -> String {
    format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        SESSION_COOKIE
    )
}

/// Session token from the session cookie, or from `Authorization: Bearer` for API clients.
pub(crate) fn session_token(headers: &HeaderMap) -> Option<String> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string());

    from_cookie
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer "))
                .map(|s| s.trim().to_string())
        })
        .filter(|t| !t.is_empty())
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let Some(raw_token) = session_token(req.headers()) else {
        return unauthorized(LOGIN_REQUIRED);
    };

    let session = match state.store.find_session(&raw_token, Utc::now()).await {
        Ok(Some(session)) => session,
        Ok(None) => return unauthorized(SESSION_EXPIRED),
        Err(e) => {
            error!("Session lookup failed: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Authentication error" })),
            )
                .into_response();
        }
    };

    let authenticated = match ensure_valid_token(
        &state.store,
        state.credentials.as_ref(),
        &session.user_id,
        Utc::now(),
    )
    .await
    {
        Ok(authenticated) => authenticated,
        Err(AuthError::Store(e)) => {
            error!("Auth middleware error: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Authentication error" })),
            )
                .into_response();
        }
        Err(e) => {
            warn!("Rejecting session for user {}: {}", session.user_id, e);
            if let Err(e) = state.store.delete_session(&raw_token).await {
                warn!("Failed to delete rejected session: {}", e);
            }
            return match e {
                AuthError::UserNotFound => unauthorized(&e.to_string()),
                _ => unauthorized(SESSION_EXPIRED),
            };
        }
    };

    req.extensions_mut().insert(CurrentUser {
        user: authenticated.user,
        access_token: authenticated.access_token,
        session_token: raw_token,
    });
    next.run(req).await
}
