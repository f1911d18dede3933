pub mod errors;
pub mod scopes;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::WWW_AUTHENTICATE;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::logging::token_preview;
pub use errors::GraphError;
pub use scopes::{ScopeCheck, check_scopes};

pub const SCOPE_MAIL_SEND: &str = "Mail.Send";
pub const SCOPE_CALENDARS: &str = "Calendars.ReadWrite";
pub const SCOPE_CHANNEL_MESSAGE: &str = "ChannelMessage.Send";
pub const SCOPE_USER_READ: &str = "User.Read";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    pub subject: String,
    pub html_body: String,
    pub start: String,
    pub end: String,
    pub attendees: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPost {
    pub team_id: String,
    pub channel_id: String,
    pub html_body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GraphProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub mail: Option<String>,
    #[serde(default)]
    pub user_principal_name: Option<String>,
}

/// The Microsoft 365 operations a workflow run can perform.
#[async_trait]
pub trait GraphActions: Send + Sync {
    async fn send_mail(&self, access_token: &str, mail: &OutgoingMail) -> Result<(), GraphError>;

    async fn create_event(
        &self,
        access_token: &str,
        event: &CalendarEvent,
    ) -> Result<(), GraphError>;

    async fn post_channel_message(
        &self,
        access_token: &str,
        post: &ChannelPost,
    ) -> Result<(), GraphError>;
}

/// Shared HTTP settings for Microsoft Graph; hands out per-token clients.
#[derive(Clone)]
pub struct GraphApi {
    http: reqwest::Client,
    base_url: String,
}

impl GraphApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn client(&self, access_token: &str) -> Result<GraphClient<'_>, GraphError> {
        GraphClient::new(self, access_token)
    }
}

#[async_trait]
impl GraphActions for GraphApi {
    async fn send_mail(&self, access_token: &str, mail: &OutgoingMail) -> Result<(), GraphError> {
        self.client(access_token)?.send_mail(mail).await
    }

    async fn create_event(
        &self,
        access_token: &str,
        event: &CalendarEvent,
    ) -> Result<(), GraphError> {
        self.client(access_token)?.create_event(event).await.map(|_| ())
    }

    async fn post_channel_message(
        &self,
        access_token: &str,
        post: &ChannelPost,
    ) -> Result<(), GraphError> {
        self.client(access_token)?
            .post_channel_message(post)
            .await
            .map(|_| ())
    }
}

/// A Graph client bound to one access token.
pub struct GraphClient<'a> {
    api: &'a GraphApi,
    access_token: String,
}

impl<'a> GraphClient<'a> {
    pub fn new(api: &'a GraphApi, access_token: &str) -> Result<Self, GraphError> {
        if access_token.trim().is_empty() {
            return Err(GraphError::EmptyToken);
        }
        debug!(
            "Graph client for token {} (length {})",
            token_preview(access_token),
            access_token.len()
        );
        Ok(Self {
            api,
            access_token: access_token.to_string(),
        })
    }

    fn require_scope(&self, scope: &str) -> Result<(), GraphError> {
        let check = check_scopes(&self.access_token, &[scope]);
        if check.has_all {
            return Ok(());
        }
        warn!(
            "Token is missing {:?}; present scopes: {:?}",
            check.missing, check.actual
        );
        Err(GraphError::MissingScopes {
            missing: check.missing,
            present: check.actual,
        })
    }

    async fn call(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&Value>,
        operation: &str,
        scope: &str,
    ) -> Result<Value, GraphError> {
        self.require_scope(scope)?;

        let url = format!("{}{}", self.api.base_url, path);
        debug!("Graph {} {}", method, url);
        let mut request = self
            .api
            .http
            .request(method, &url)
            .bearer_auth(&self.access_token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let transport = |source| GraphError::Transport {
            operation: operation.to_string(),
            source,
        };
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        let www_authenticate = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let request_id = response
            .headers()
            .get("request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = response.text().await.map_err(transport)?;

        if !status.is_success() {
            warn!(
                "Graph {} failed: status={} request-id={} body={}",
                operation,
                status,
                request_id.as_deref().unwrap_or("-"),
                text
            );
            return Err(errors::classify(
                status,
                www_authenticate.as_deref(),
                &text,
                operation,
                scope,
            ));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }

    pub async fn send_mail(&self, mail: &OutgoingMail) -> Result<(), GraphError> {
        let payload = json!({
            "message": {
                "subject": mail.subject,
                "body": { "contentType": "HTML", "content": mail.html_body },
                "toRecipients": [{ "emailAddress": { "address": mail.to } }],
            },
            "saveToSentItems": true,
        });
        self.call(
            reqwest::Method::POST,
            "/me/sendMail",
            Some(&payload),
            "send email",
            SCOPE_MAIL_SEND,
        )
        .await?;
        info!("Email sent to {}", mail.to);
        Ok(())
    }

    pub async fn create_event(&self, event: &CalendarEvent) -> Result<Value, GraphError> {
        let attendees: Vec<Value> = event
            .attendees
            .iter()
            .map(|email| {
                json!({
                    "emailAddress": { "address": email, "name": email },
                    "type": "required",
                })
            })
            .collect();
        let payload = json!({
            "subject": event.subject,
            "body": { "contentType": "HTML", "content": event.html_body },
            "start": { "dateTime": event.start, "timeZone": "UTC" },
            "end": { "dateTime": event.end, "timeZone": "UTC" },
            "attendees": attendees,
        });
        let created = self
            .call(
                reqwest::Method::POST,
                "/me/events",
                Some(&payload),
                "create calendar event",
                SCOPE_CALENDARS,
            )
            .await?;
        info!("Calendar event '{}' created", event.subject);
        Ok(created)
    }

    pub async fn post_channel_message(&self, post: &ChannelPost) -> Result<Value, GraphError> {
        let path = format!(
            "/teams/{}/channels/{}/messages",
            urlencoding::encode(&post.team_id),
            urlencoding::encode(&post.channel_id)
        );
        let payload = json!({ "body": { "contentType": "html", "content": post.html_body } });
        let created = self
            .call(
                reqwest::Method::POST,
                &path,
                Some(&payload),
                "post Teams message",
                SCOPE_CHANNEL_MESSAGE,
            )
            .await?;
        info!("Posted message to Teams channel {}", post.channel_id);
        Ok(created)
    }

    pub async fn get_me(&self) -> Result<GraphProfile, GraphError> {
        let value = self
            .call(
                reqwest::Method::GET,
                "/me",
                None,
                "get user profile",
                SCOPE_USER_READ,
            )
            .await?;
        serde_json::from_value(value).map_err(|e| GraphError::Request {
            operation: "get user profile".to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockServer, fake_jwt};
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    fn all_scopes_token() -> String {
        fake_jwt(json!({
            "scp": "User.Read Mail.Send Calendars.ReadWrite ChannelMessage.Send"
        }))
    }

    fn api(base_url: &str) -> GraphApi {
        GraphApi::new(base_url, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn blank_token_is_rejected_at_construction() {
        let api = api("http://127.0.0.1:9");
        let err = api.client("   ").err().unwrap();
        assert_eq!(err.to_string(), "Access token is empty or invalid");
    }

    #[tokio::test]
    async fn missing_scope_fails_without_network() {
        // Port 9 (discard) is never served here; a request would fail differently.
        let api = api("http://127.0.0.1:9");
        let token = fake_jwt(json!({"scp": "User.Read"}));
        let err = api
            .send_mail(
                &token,
                &OutgoingMail {
                    to: "a@contoso.com".into(),
                    subject: "s".into(),
                    html_body: "b".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::MissingScopes { .. }));
        assert!(
            err.to_string()
                .starts_with("Missing required permissions: Mail.Send. Token has scopes: User.Read.")
        );
    }

    #[tokio::test]
    async fn send_mail_posts_html_message_with_bearer_token() {
        let captured: Arc<Mutex<Option<(String, Value)>>> = Arc::default();
        let sink = captured.clone();
        let app = Router::new().route(
            "/v1.0/me/sendMail",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let sink = sink.clone();
                async move {
                    let auth = headers["authorization"].to_str().unwrap().to_string();
                    *sink.lock().unwrap() = Some((auth, body));
                    StatusCode::ACCEPTED
                }
            }),
        );
        let server = MockServer::start(app).await;
        let token = all_scopes_token();

        api(&format!("{}/v1.0", server.base_url))
            .send_mail(
                &token,
                &OutgoingMail {
                    to: "team@contoso.com".into(),
                    subject: "Minutes".into(),
                    html_body: "<p>hi</p>".into(),
                },
            )
            .await
            .unwrap();

        let (auth, body) = captured.lock().unwrap().take().unwrap();
        assert_eq!(auth, format!("Bearer {}", token));
        assert_eq!(body["message"]["body"]["contentType"], "HTML");
        assert_eq!(
            body["message"]["toRecipients"][0]["emailAddress"]["address"],
            "team@contoso.com"
        );
        assert_eq!(body["saveToSentItems"], true);
        server.shutdown().await;
    }

    #[tokio::test]
    async fn create_event_sends_utc_times_and_required_attendees() {
        let app = Router::new().route(
            "/me/events",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["start"]["timeZone"], "UTC");
                assert_eq!(body["end"]["dateTime"], "2026-03-10T11:00:00");
                assert_eq!(body["attendees"][0]["type"], "required");
                assert_eq!(body["attendees"][0]["emailAddress"]["name"], "bob@contoso.com");
                (StatusCode::CREATED, Json(json!({"id": "evt-1"})))
            }),
        );
        let server = MockServer::start(app).await;

        let api = api(&server.base_url);
        let token = all_scopes_token();
        let created = api
            .client(&token)
            .unwrap()
            .create_event(&CalendarEvent {
                subject: "Follow-up".into(),
                html_body: "Agenda".into(),
                start: "2026-03-10T10:00:00".into(),
                end: "2026-03-10T11:00:00".into(),
                attendees: vec!["bob@contoso.com".into()],
            })
            .await
            .unwrap();
        assert_eq!(created["id"], "evt-1");
        server.shutdown().await;
    }

    #[tokio::test]
    async fn channel_message_targets_team_and_channel() {
        let app = Router::new().route(
            "/teams/{team}/channels/{channel}/messages",
            post(
                |Path((team, channel)): Path<(String, String)>, Json(body): Json<Value>| async move {
                    assert_eq!(team, "team-1");
                    assert_eq!(channel, "19:abc@thread.tacv2");
                    assert_eq!(body["body"]["contentType"], "html");
                    Json(json!({"id": "msg-1"}))
                },
            ),
        );
        let server = MockServer::start(app).await;
        let api = api(&server.base_url);
        api.post_channel_message(
            &all_scopes_token(),
            &ChannelPost {
                team_id: "team-1".into(),
                channel_id: "19:abc@thread.tacv2".into(),
                html_body: "Minutes posted".into(),
            },
        )
        .await
        .unwrap();
        server.shutdown().await;
    }

    #[tokio::test]
    async fn unauthorized_response_is_classified() {
        let app = Router::new().route(
            "/me/sendMail",
            post(|| async {
                (
                    StatusCode::UNAUTHORIZED,
                    [("WWW-Authenticate", r#"Bearer error="invalid_token""#)],
                    "",
                )
                    .into_response()
            }),
        );
        let server = MockServer::start(app).await;
        let err = api(&server.base_url)
            .send_mail(
                &all_scopes_token(),
                &OutgoingMail {
                    to: "a@contoso.com".into(),
                    subject: "s".into(),
                    html_body: "b".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(
            err.to_string()
                .starts_with("Authentication failed (401): Invalid token.")
        );
        server.shutdown().await;
    }

    #[tokio::test]
    async fn get_me_returns_profile() {
        let app = Router::new().route(
            "/me",
            get(|| async {
                Json(json!({
                    "id": "user-42",
                    "displayName": "Ada Lovelace",
                    "mail": "ada@contoso.com",
                    "userPrincipalName": "ada@contoso.com"
                }))
            }),
        );
        let server = MockServer::start(app).await;
        let api = api(&server.base_url);
        let token = all_scopes_token();
        let me = api.client(&token).unwrap().get_me().await.unwrap();
        assert_eq!(me.id, "user-42");
        assert_eq!(me.display_name.as_deref(), Some("Ada Lovelace"));
        server.shutdown().await;
    }
}
