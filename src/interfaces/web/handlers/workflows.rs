use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{error, info};

use super::error_response;
use crate::core::oauth::{AuthError, ensure_valid_token};
use crate::core::store::types::NewWorkflow;
use crate::core::workflow::{
    ActionKind, ExecutionContext, ExecutionResult, TriggerKind, WorkflowExecutor,
};
use crate::interfaces::web::{AppState, CurrentUser};
use crate::logging::token_preview;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkflowRequest {
    pub name: Option<String>,
    pub actions: Option<Vec<String>>,
    pub action_configs: Option<Value>,
    pub trigger: Option<String>,
    pub canvas_data: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunWorkflowRequest {
    pub mom_content: Option<String>,
    pub email_to: Option<String>,
    pub email_subject: Option<String>,
    pub email_body: Option<String>,
    pub calendar_title: Option<String>,
    pub calendar_body: Option<String>,
    pub calendar_start: Option<String>,
    pub calendar_end: Option<String>,
    pub calendar_attendees: Option<Vec<String>>,
    pub teams_team_id: Option<String>,
    pub teams_channel_id: Option<String>,
    pub teams_message: Option<String>,
}

impl RunWorkflowRequest {
    fn into_context(self, actions: Vec<ActionKind>, access_token: String) -> ExecutionContext {
        ExecutionContext {
            actions,
            access_token,
            mom_content: self.mom_content,
            email_to: self.email_to,
            email_subject: self.email_subject,
            email_body: self.email_body,
            calendar_title: self.calendar_title,
            calendar_body: self.calendar_body,
            calendar_start: self.calendar_start,
            calendar_end: self.calendar_end,
            calendar_attendees: self.calendar_attendees,
            teams_team_id: self.teams_team_id,
            teams_channel_id: self.teams_channel_id,
            teams_message: self.teams_message,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunResponse<'a> {
    log_id: &'a str,
    #[serde(flatten)]
    result: &'a ExecutionResult,
}

fn parse_actions(names: &[String]) -> Result<Vec<ActionKind>, String> {
    names
        .iter()
        .map(|name| ActionKind::from_name(name).ok_or_else(|| format!("Unknown action: {}", name)))
        .collect()
}

pub async fn create_workflow(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<CreateWorkflowRequest>,
) -> Response {
    let name = payload.name.as_deref().map(str::trim).unwrap_or_default();
    let names = payload.actions.unwrap_or_default();
    if name.is_empty() || names.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Name and actions are required");
    }

    let actions = match parse_actions(&names) {
        Ok(actions) => actions,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, msg),
    };

    let trigger = match payload.trigger.as_deref() {
        None => TriggerKind::default(),
        Some(t) => match TriggerKind::from_name(t) {
            Some(trigger) => trigger,
            None => {
                return error_response(StatusCode::BAD_REQUEST, format!("Unknown trigger: {}", t));
            }
        },
    };

    let new = NewWorkflow {
        user_id: current.user.id.clone(),
        name: name.to_string(),
        trigger,
        actions,
        action_configs: payload.action_configs.unwrap_or_else(|| json!({})),
        canvas_data: payload.canvas_data,
    };

    match state.store.create_workflow(new).await {
        Ok(workflow) => {
            info!("Workflow '{}' created for {}", workflow.name, current.user.email);
            (StatusCode::CREATED, Json(workflow)).into_response()
        }
        Err(e) => {
            error!("Create workflow error: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create workflow")
        }
    }
}

pub async fn list_workflows(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Response {
    match state.store.list_workflows(&current.user.id).await {
        Ok(workflows) => Json(workflows).into_response(),
        Err(e) => {
            error!("Get workflows error: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to get workflows")
        }
    }
}

pub async fn get_workflow(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Response {
    match state.store.get_workflow(&current.user.id, &id).await {
        Ok(Some(workflow)) => Json(workflow).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Workflow not found"),
        Err(e) => {
            error!("Get workflow error: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to get workflow")
        }
    }
}

pub async fn delete_workflow(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Response {
    match state.store.delete_workflow(&current.user.id, &id).await {
        Ok(true) => Json(json!({ "message": "Workflow deleted successfully" })).into_response(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, "Workflow not found"),
        Err(e) => {
            error!("Delete workflow error: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete workflow")
        }
    }
}

/// Run a stored workflow with request-supplied inputs and record the outcome as an execution log.
pub async fn run_workflow(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(payload): Json<RunWorkflowRequest>,
) -> Response {
    let user_id = current.user.id.as_str();
    let workflow = match state.store.get_workflow(user_id, &id).await {
        Ok(Some(workflow)) => workflow,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Workflow not found"),
        Err(e) => {
            error!("Run workflow error: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to run workflow");
        }
    };

    let authenticated =
        match ensure_valid_token(&state.store, state.credentials.as_ref(), user_id, Utc::now())
            .await
        {
            Ok(authenticated) => authenticated,
            Err(AuthError::Store(e)) => {
                error!("Run workflow error: {}", e);
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to run workflow");
            }
            Err(e) => return error_response(StatusCode::UNAUTHORIZED, e.to_string()),
        };

    let log_id = match state.store.create_execution_log(user_id, &workflow.id).await {
        Ok(log_id) => log_id,
        Err(e) => {
            error!("Run workflow error: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to run workflow");
        }
    };

    info!(
        "Running workflow '{}' ({} actions) with token {} (len {})",
        workflow.name,
        workflow.actions.len(),
        token_preview(&authenticated.access_token),
        authenticated.access_token.len()
    );

    let ctx = payload.into_context(workflow.actions.clone(), authenticated.access_token);
    let executor = WorkflowExecutor::new(state.minutes.as_ref(), state.graph.as_ref());
    let result = executor.execute(&ctx).await;

    if let Err(e) = state.store.finish_execution_log(&log_id, &result).await {
        error!("Failed to record execution log {}: {}", log_id, e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "success": false, "logId": log_id, "error": e.to_string() })),
        )
            .into_response();
    }

    Json(RunResponse {
        log_id: &log_id,
        result: &result,
    })
    .into_response()
}
