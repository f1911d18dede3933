use tracing::{error, info, warn};

use crate::core::graph::{CalendarEvent, ChannelPost, GraphActions, OutgoingMail};
use crate::core::minutes::MinutesWriter;
use crate::core::workflow::types::{ActionFailure, ActionKind, ExecutionContext, ExecutionResult};

const NOTES_REQUIRED: &str = "Meeting notes are required for generate_mom action";
const EMAIL_BODY_REQUIRED: &str =
    "Email body is required. Please generate MOM first or provide email body content.";
const EMAIL_FIELDS_REQUIRED: &str = "Email recipient and subject are required";
const CALENDAR_FIELDS_REQUIRED: &str = "Calendar title, start, and end times are required";
const TEAMS_FIELDS_REQUIRED: &str = "Teams team ID, channel ID, and message are required";

/// `Some` only for values with non-whitespace content.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Runs a workflow's actions in order against one request's context.
///
/// `generate_mom` always runs first so later actions can use the minutes; its
/// failure aborts the run. Every other action fails in isolation.
pub struct WorkflowExecutor<'a> {
    minutes: &'a dyn MinutesWriter,
    graph: &'a dyn GraphActions,
}

impl<'a> WorkflowExecutor<'a> {
    pub fn new(minutes: &'a dyn MinutesWriter, graph: &'a dyn GraphActions) -> Self {
        Self { minutes, graph }
    }

    pub async fn execute(&self, ctx: &ExecutionContext) -> ExecutionResult {
        let mut result = ExecutionResult::default();

        let mut generated: Option<String> = None;
        if ctx.actions.contains(&ActionKind::GenerateMom) {
            let Some(notes) = present(&ctx.mom_content) else {
                return abort(result, NOTES_REQUIRED.to_string());
            };
            match self.minutes.generate_minutes(notes).await {
                Ok(minutes) => {
                    generated = Some(minutes);
                    result.actions_executed.push(ActionKind::GenerateMom);
                }
                Err(e) => {
                    return abort(result, format!("Failed to generate MOM: {}", e));
                }
            }
        }

        let minutes = generated
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .or_else(|| present(&ctx.mom_content));

        for &action in &ctx.actions {
            let outcome = match action {
                ActionKind::GenerateMom => continue,
                ActionKind::SendEmail => self.send_email(ctx, minutes).await,
                ActionKind::CreateCalendar => self.create_calendar(ctx, minutes).await,
                ActionKind::TeamsPost => self.teams_post(ctx).await,
                ActionKind::CreatePpt
                | ActionKind::AiProcess
                | ActionKind::SaveData
                | ActionKind::ApiCall => {
                    warn!("Action {} is not executable yet; skipping", action);
                    continue;
                }
            };

            match outcome {
                Ok(()) => {
                    info!("Action {} completed", action);
                    result.actions_executed.push(action);
                }
                Err(message) => {
                    error!("Error executing action {}: {}", action, message);
                    result.action_errors.push(ActionFailure {
                        action,
                        error: message.clone(),
                    });
                    result.error = Some(message);
                }
            }
        }

        result.success = !result.actions_executed.is_empty() && result.error.is_none();
        result
    }

    async fn send_email(&self, ctx: &ExecutionContext, minutes: Option<&str>) -> Result<(), String> {
        let body = present(&ctx.email_body).or(minutes).unwrap_or("");
        if body.trim().is_empty() {
            return Err(EMAIL_BODY_REQUIRED.to_string());
        }
        let (Some(to), Some(subject)) = (present(&ctx.email_to), present(&ctx.email_subject))
        else {
            return Err(EMAIL_FIELDS_REQUIRED.to_string());
        };
        let mail = OutgoingMail {
            to: to.to_string(),
            subject: subject.to_string(),
            html_body: body.to_string(),
        };
        self.graph
            .send_mail(&ctx.access_token, &mail)
            .await
            .map_err(|e| e.to_string())
    }

    async fn create_calendar(
        &self,
        ctx: &ExecutionContext,
        minutes: Option<&str>,
    ) -> Result<(), String> {
        let (Some(title), Some(start), Some(end)) = (
            present(&ctx.calendar_title),
            present(&ctx.calendar_start),
            present(&ctx.calendar_end),
        ) else {
            return Err(CALENDAR_FIELDS_REQUIRED.to_string());
        };
        let body = present(&ctx.calendar_body).or(minutes).unwrap_or("");
        let event = CalendarEvent {
            subject: title.to_string(),
            html_body: body.to_string(),
            start: start.to_string(),
            end: end.to_string(),
            attendees: ctx.calendar_attendees.clone().unwrap_or_default(),
        };
        self.graph
            .create_event(&ctx.access_token, &event)
            .await
            .map_err(|e| e.to_string())
    }

    async fn teams_post(&self, ctx: &ExecutionContext) -> Result<(), String> {
        let (Some(team_id), Some(channel_id), Some(message)) = (
            present(&ctx.teams_team_id),
            present(&ctx.teams_channel_id),
            present(&ctx.teams_message),
        ) else {
            return Err(TEAMS_FIELDS_REQUIRED.to_string());
        };
        let post = ChannelPost {
            team_id: team_id.to_string(),
            channel_id: channel_id.to_string(),
            html_body: message.to_string(),
        };
        self.graph
            .post_channel_message(&ctx.access_token, &post)
            .await
            .map_err(|e| e.to_string())
    }
}

fn abort(mut result: ExecutionResult, message: String) -> ExecutionResult {
    error!("Workflow aborted: {}", message);
    result.action_errors.push(ActionFailure {
        action: ActionKind::GenerateMom,
        error: message.clone(),
    });
    result.success = false;
    result.error = Some(message);
    result
}
