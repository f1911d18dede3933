use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::workflow::{ActionKind, LogStatus, TriggerKind};

/// A signed-in user with decrypted credentials. Not serializable: tokens stay server-side.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    pub azure_id: String,
    pub email: String,
    pub name: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub created_at: String,
    pub updated_at: String,
}

impl UserRecord {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            azure_id: self.azure_id.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub azure_id: String,
    pub email: String,
    pub name: String,
}

/// Values written on every successful sign-in.
#[derive(Debug, Clone)]
pub struct SignIn {
    pub azure_id: String,
    pub email: String,
    pub name: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewWorkflow {
    pub user_id: String,
    pub name: String,
    pub trigger: TriggerKind,
    pub actions: Vec<ActionKind>,
    pub action_configs: serde_json::Value,
    pub canvas_data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
    pub actions: Vec<ActionKind>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLogRecord {
    pub id: String,
    pub user_id: String,
    pub workflow_id: String,
    pub status: LogStatus,
    pub actions_executed: Vec<ActionKind>,
    pub error: Option<String>,
    pub executed_at: String,
    /// Present while the workflow still exists.
    pub workflow: Option<WorkflowSummary>,
}
