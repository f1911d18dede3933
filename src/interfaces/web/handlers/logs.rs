use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::error_response;
use crate::interfaces::web::{AppState, CurrentUser};

const DEFAULT_LIMIT: u32 = 50;

/// Raw query values; anything unparsable falls back to the defaults.
#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<String>,
    pub skip: Option<String>,
}

impl LogsQuery {
    fn limit(&self) -> u32 {
        self.limit
            .as_deref()
            .and_then(|v| v.trim().parse().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_LIMIT)
    }

    fn skip(&self) -> u32 {
        self.skip
            .as_deref()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }
}

pub async fn list_logs(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<LogsQuery>,
) -> Response {
    let (limit, skip) = (query.limit(), query.skip());
    match state
        .store
        .list_execution_logs(&current.user.id, limit, skip)
        .await
    {
        Ok((logs, total)) => Json(json!({
            "logs": logs,
            "total": total,
            "limit": limit,
            "skip": skip,
        }))
        .into_response(),
        Err(e) => {
            error!("Get logs error: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to get logs")
        }
    }
}

pub async fn get_log(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Response {
    match state.store.get_execution_log(&current.user.id, &id).await {
        Ok(Some(log)) => Json(log).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Log not found"),
        Err(e) => {
            error!("Get log error: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to get log")
        }
    }
}
