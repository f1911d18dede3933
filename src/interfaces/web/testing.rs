//! Fixtures for router and handler tests.

use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use chrono::{DateTime, Duration, Utc};
use serde_json::{Value, json};
use tower::util::ServiceExt;

use super::AppState;
use super::auth::SESSION_COOKIE;
use crate::core::config::AppConfig;
use crate::core::graph::{CalendarEvent, ChannelPost, GraphActions, GraphApi, GraphError, OutgoingMail};
use crate::core::minutes::MinutesWriter;
use crate::core::oauth::{CredentialProvider, PendingLogins, TokenSet};
use crate::core::store::types::{SignIn, UserRecord};
use crate::core::store::{Store, test_store};
use crate::test_support::fake_jwt;

pub(crate) const GOOD_CODE: &str = "good-code";
pub(crate) const SAMPLE_MINUTES: &str = "# Meeting Minutes\n\n## Overview\nQ3 planning.\n";

pub(crate) struct FakeCredentials {
    pub(crate) refresh_reply: Option<TokenSet>,
}

#[async_trait]
impl CredentialProvider for FakeCredentials {
    fn authorization_url(&self, state: &str) -> Result<String> {
        Ok(format!("https://login.example/authorize?state={}", state))
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenSet> {
        if code != GOOD_CODE {
            return Err(anyhow!("Authentication failed: invalid_grant"));
        }
        Ok(TokenSet {
            access_token: fake_jwt(json!({ "scp": "User.Read Mail.Send" })),
            refresh_token: Some("refresh-1".to_string()),
            expires_at: Some(Utc::now() + Duration::hours(1)),
            id_token: Some(fake_jwt(json!({
                "oid": "azure-ada",
                "preferred_username": "ada@contoso.com",
                "name": "Ada Lovelace"
            }))),
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenSet> {
        self.refresh_reply
            .clone()
            .ok_or_else(|| anyhow!("invalid_grant"))
    }
}

pub(crate) struct FakeMinutes;

#[async_trait]
impl MinutesWriter for FakeMinutes {
    async fn generate_minutes(&self, meeting_notes: &str) -> Result<String> {
        if meeting_notes.contains("fail") {
            return Err(anyhow!("OpenAI API error: quota exceeded"));
        }
        Ok(SAMPLE_MINUTES.to_string())
    }
}

/// Records mail instead of sending it. Recipients at `invalid.example` are rejected.
#[derive(Default)]
pub(crate) struct RecordingGraph {
    pub(crate) mails: Mutex<Vec<(String, OutgoingMail)>>,
}

#[async_trait]
impl GraphActions for RecordingGraph {
    async fn send_mail(&self, access_token: &str, mail: &OutgoingMail) -> Result<(), GraphError> {
        if mail.to.ends_with("@invalid.example") {
            return Err(GraphError::Request {
                operation: "send email".to_string(),
                message: "Recipient not found".to_string(),
            });
        }
        self.mails
            .lock()
            .unwrap()
            .push((access_token.to_string(), mail.clone()));
        Ok(())
    }

    async fn create_event(&self, _token: &str, _event: &CalendarEvent) -> Result<(), GraphError> {
        Ok(())
    }

    async fn post_channel_message(
        &self,
        _token: &str,
        _post: &ChannelPost,
    ) -> Result<(), GraphError> {
        Ok(())
    }
}

pub(crate) fn test_state() -> AppState {
    test_state_with(test_store(), Arc::new(RecordingGraph::default()), None)
}

pub(crate) fn test_state_with(
    store: Store,
    graph: Arc<RecordingGraph>,
    refresh_reply: Option<TokenSet>,
) -> AppState {
    let config = AppConfig {
        frontend_url: "http://app.example".to_string(),
        ..AppConfig::default()
    };
    AppState {
        store,
        credentials: Arc::new(FakeCredentials { refresh_reply }),
        minutes: Arc::new(FakeMinutes),
        graph,
        // Nothing listens on the discard port, so direct Graph calls fail fast.
        graph_api: GraphApi::new("http://127.0.0.1:9", std::time::Duration::from_secs(2))
            .expect("graph api"),
        pending_logins: Arc::new(PendingLogins::default()),
        config: Arc::new(config),
    }
}

pub(crate) async fn sign_in(
    store: &Store,
    expires_at: Option<DateTime<Utc>>,
    refresh_token: Option<&str>,
) -> (UserRecord, String) {
    let user = store
        .upsert_user(&SignIn {
            azure_id: "azure-ada".to_string(),
            email: "ada@contoso.com".to_string(),
            name: "Ada Lovelace".to_string(),
            access_token: "stored-access".to_string(),
            refresh_token: refresh_token.map(str::to_string),
            token_expires_at: expires_at,
        })
        .await
        .expect("upsert user");
    let session = store
        .create_session(&user.id, Utc::now() + Duration::hours(24))
        .await
        .expect("create session");
    (user, session)
}

pub(crate) async fn signed_in_user(store: &Store) -> (UserRecord, String) {
    sign_in(store, Some(Utc::now() + Duration::hours(1)), Some("refresh-1")).await
}

pub(crate) async fn send(
    app: Router,
    method: Method,
    path: &str,
    body: Option<Value>,
    session: Option<&str>,
) -> (StatusCode, HeaderMap, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header("content-type", "application/json");
    if let Some(token) = session {
        builder = builder.header("cookie", format!("{}={}", SESSION_COOKIE, token));
    }
    let body = match body {
        Some(json) => Body::from(json.to_string()),
        None => Body::empty(),
    };
    let resp = app.oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, json)
}
