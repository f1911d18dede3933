use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    GenerateMom,
    SendEmail,
    CreateCalendar,
    TeamsPost,
    CreatePpt,
    AiProcess,
    SaveData,
    ApiCall,
}

impl ActionKind {
    pub const ALL: [ActionKind; 8] = [
        ActionKind::GenerateMom,
        ActionKind::SendEmail,
        ActionKind::CreateCalendar,
        ActionKind::TeamsPost,
        ActionKind::CreatePpt,
        ActionKind::AiProcess,
        ActionKind::SaveData,
        ActionKind::ApiCall,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::GenerateMom => "generate_mom",
            ActionKind::SendEmail => "send_email",
            ActionKind::CreateCalendar => "create_calendar",
            ActionKind::TeamsPost => "teams_post",
            ActionKind::CreatePpt => "create_ppt",
            ActionKind::AiProcess => "ai_process",
            ActionKind::SaveData => "save_data",
            ActionKind::ApiCall => "api_call",
        }
    }

    pub fn from_name(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == value)
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    #[default]
    Manual,
    Schedule,
    Webhook,
    Transcript,
}

impl TriggerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerKind::Manual => "manual",
            TriggerKind::Schedule => "schedule",
            TriggerKind::Webhook => "webhook",
            TriggerKind::Transcript => "transcript",
        }
    }

    pub fn from_name(value: &str) -> Option<Self> {
        match value {
            "manual" => Some(TriggerKind::Manual),
            "schedule" => Some(TriggerKind::Schedule),
            "webhook" => Some(TriggerKind::Webhook),
            "transcript" => Some(TriggerKind::Transcript),
            _ => None,
        }
    }
}

/// A stored workflow. Immutable after creation apart from deletion.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub trigger: TriggerKind,
    pub actions: Vec<ActionKind>,
    pub action_configs: serde_json::Value,
    pub canvas_data: Option<serde_json::Value>,
    pub created_at: String,
    pub updated_at: String,
}

/// Request-scoped inputs for a single run. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub actions: Vec<ActionKind>,
    pub access_token: String,
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

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionFailure {
    pub action: ActionKind,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    pub actions_executed: Vec<ActionKind>,
    /// Most recent failure only; `action_errors` keeps all of them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub action_errors: Vec<ActionFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    Running,
    Success,
    Failed,
}

impl LogStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LogStatus::Running => "running",
            LogStatus::Success => "success",
            LogStatus::Failed => "failed",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "running" => Some(LogStatus::Running),
            "success" => Some(LogStatus::Success),
            "failed" => Some(LogStatus::Failed),
            _ => None,
        }
    }

    pub fn from_result(result: &ExecutionResult) -> Self {
        if result.success {
            LogStatus::Success
        } else {
            LogStatus::Failed
        }
    }
}
