//! Azure AD sign-in (OAuth2 authorization code flow, v2.0 endpoints) and the
//! access-token lifecycle shared by the auth middleware and workflow runs.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::core::config::AppConfig;
use crate::core::graph::scopes::decode_claims;
use crate::core::store::Store;
use crate::core::store::types::UserRecord;

pub const AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const SCOPES: &[&str] = &[
    "User.Read",
    "Mail.Send",
    "Calendars.ReadWrite",
    "ChannelMessage.Send",
    "offline_access",
    "openid",
    "profile",
    "email",
];
pub const LOGIN_STATE_TTL: Duration = Duration::from_secs(600);
const MISSING_CONFIG: &str = "Azure AD configuration is missing. Check environment variables.";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    id_token: Option<String>,
    expires_in: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub id_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub azure_id: String,
    pub email: String,
    pub name: String,
}

impl TokenSet {
    /// Account identity from the ID token, falling back to the access token's claims.
    pub fn account(&self) -> Result<AccountInfo> {
        let claims = self
            .id_token
            .as_deref()
            .and_then(decode_claims)
            .or_else(|| decode_claims(&self.access_token))
            .ok_or_else(|| anyhow!("No account information in token response"))?;
        account_from_claims(&claims)
    }
}

fn claim<'a>(claims: &'a Value, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .filter_map(|n| claims.get(*n).and_then(Value::as_str))
        .find(|v| !v.trim().is_empty())
}

pub fn account_from_claims(claims: &Value) -> Result<AccountInfo> {
    let azure_id = claim(claims, &["oid", "sub"])
        .ok_or_else(|| anyhow!("No account information in token response"))?
        .to_string();
    let email = claim(claims, &["preferred_username", "email", "upn"])
        .unwrap_or_default()
        .to_string();
    let name = claim(claims, &["name"]).unwrap_or(&email).to_string();
    Ok(AccountInfo {
        azure_id,
        email,
        name,
    })
}

fn parse_expires_in(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Issues authorization URLs and token sets.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    fn authorization_url(&self, state: &str) -> Result<String>;

    async fn exchange_code(&self, code: &str) -> Result<TokenSet>;

    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet>;
}

#[derive(Debug, Clone)]
struct AzureAdSettings {
    client_id: String,
    client_secret: String,
    tenant_id: String,
}

pub struct AzureAdProvider {
    settings: Option<AzureAdSettings>,
    redirect_uri: String,
    authority_host: String,
    http: reqwest::Client,
}

impl AzureAdProvider {
    /// Missing client settings are only reported when a login is attempted.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let azure = &config.azure;
        let settings = match (&azure.client_id, &azure.client_secret, &azure.tenant_id) {
            (Some(client_id), Some(client_secret), Some(tenant_id)) => Some(AzureAdSettings {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
                tenant_id: tenant_id.clone(),
            }),
            _ => {
                warn!("Azure AD client settings are incomplete; sign-in is disabled");
                None
            }
        };
        Ok(Self {
            settings,
            redirect_uri: config.redirect_uri(),
            authority_host: azure
                .authority_host
                .clone()
                .unwrap_or_else(|| AUTHORITY_HOST.to_string())
                .trim_end_matches('/')
                .to_string(),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.http_timeout_secs))
                .build()?,
        })
    }

    fn settings(&self) -> Result<&AzureAdSettings> {
        self.settings.as_ref().ok_or_else(|| anyhow!(MISSING_CONFIG))
    }

    fn endpoint(&self, tenant_id: &str, kind: &str) -> String {
        format!(
            "{}/{}/oauth2/v2.0/{}",
            self.authority_host,
            urlencoding::encode(tenant_id),
            kind
        )
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenSet> {
        let settings = self.settings()?;
        let scope = SCOPES.join(" ");
        let mut form: Vec<(&str, &str)> = vec![
            ("client_id", settings.client_id.as_str()),
            ("client_secret", settings.client_secret.as_str()),
        ];
        form.extend_from_slice(params);
        form.push(("scope", scope.as_str()));

        let requested_at = Utc::now();
        let response = self
            .http
            .post(self.endpoint(&settings.tenant_id, "token"))
            .form(&form)
            .send()
            .await
            .map_err(|e| anyhow!("HTTP request failed: {}", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read response body: {}", e))?;

        let token: TokenResponse = match serde_json::from_str(&body) {
            Ok(token) => token,
            Err(_) if !status.is_success() => {
                return Err(anyhow!("Token request failed (HTTP {}): {}", status, body));
            }
            Err(e) => return Err(anyhow!("Failed to parse token response: {}", e)),
        };

        if let Some(error) = token.error {
            let desc = token.error_description.unwrap_or_default();
            return Err(anyhow!("OAuth error: {} - {}", error, desc));
        }
        if !status.is_success() {
            return Err(anyhow!("Token request failed (HTTP {}): {}", status, body));
        }

        let access_token = token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| anyhow!("No access_token in token response"))?;
        let expires_at = parse_expires_in(token.expires_in.as_ref())
            .map(|secs| requested_at + chrono::Duration::seconds(secs));

        Ok(TokenSet {
            access_token,
            refresh_token: token.refresh_token.filter(|t| !t.is_empty()),
            expires_at,
            id_token: token.id_token,
        })
    }
}

#[async_trait]
impl CredentialProvider for AzureAdProvider {
    fn authorization_url(&self, state: &str) -> Result<String> {
        let settings = self.settings()?;
        Ok(format!(
            "{}?client_id={}&response_type=code&redirect_uri={}&response_mode=query&scope={}&state={}",
            self.endpoint(&settings.tenant_id, "authorize"),
            urlencoding::encode(&settings.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&SCOPES.join(" ")),
            urlencoding::encode(state)
        ))
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenSet> {
        let tokens = self
            .token_request(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .await
            .map_err(|e| anyhow!("Authentication failed: {}", e))?;
        info!(
            "Token acquired; expires at {}",
            tokens
                .expires_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "unknown".into())
        );
        Ok(tokens)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet> {
        let tokens = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .await?;
        info!("Access token refreshed");
        Ok(tokens)
    }
}

pub fn generate_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Login `state` values awaiting their callback. Each is accepted once, within the TTL.
pub struct PendingLogins {
    ttl: Duration,
    states: Mutex<HashMap<String, Instant>>,
}

impl Default for PendingLogins {
    fn default() -> Self {
        Self::with_ttl(LOGIN_STATE_TTL)
    }
}

impl PendingLogins {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub async fn issue(&self) -> String {
        let state = generate_state();
        let mut states = self.states.lock().await;
        let ttl = self.ttl;
        states.retain(|_, issued| issued.elapsed() < ttl);
        states.insert(state.clone(), Instant::now());
        state
    }

    pub async fn consume(&self, state: &str) -> bool {
        let mut states = self.states.lock().await;
        match states.remove(state) {
            Some(issued) => issued.elapsed() < self.ttl,
            None => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("User not found. Please login again.")]
    UserNotFound,

    #[error("User access token not found. Please login again.")]
    MissingAccessToken,

    #[error("Token expired. Please login again.")]
    ReauthenticationRequired,

    #[error("Failed to refresh token. Please login again.")]
    RefreshFailed { cause: String },

    #[error("Authentication error: {0}")]
    Store(String),
}

/// A user whose access token is usable right now.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: UserRecord,
    pub access_token: String,
    pub refreshed: bool,
}

/// Return a non-expired access token for `user_id`, refreshing and persisting
/// a new token set when the stored one has expired.
pub async fn ensure_valid_token(
    store: &Store,
    provider: &dyn CredentialProvider,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<AuthenticatedUser, AuthError> {
    let user = store
        .get_user(user_id)
        .await
        .map_err(|e| AuthError::Store(e.to_string()))?
        .ok_or(AuthError::UserNotFound)?;

    let access_token = user
        .access_token
        .clone()
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingAccessToken)?;

    let expired = user.token_expires_at.is_some_and(|at| at <= now);
    if !expired {
        return Ok(AuthenticatedUser {
            user,
            access_token,
            refreshed: false,
        });
    }

    let refresh_token = user
        .refresh_token
        .clone()
        .ok_or(AuthError::ReauthenticationRequired)?;

    let tokens = provider.refresh(&refresh_token).await.map_err(|e| {
        warn!("Token refresh for user {} failed: {}", user_id, e);
        AuthError::RefreshFailed {
            cause: e.to_string(),
        }
    })?;

    store
        .update_user_tokens(
            user_id,
            &tokens.access_token,
            tokens.refresh_token.as_deref(),
            tokens.expires_at,
        )
        .await
        .map_err(|e| AuthError::Store(e.to_string()))?;

    let mut user = user;
    user.access_token = Some(tokens.access_token.clone());
    if let Some(refresh) = tokens.refresh_token {
        user.refresh_token = Some(refresh);
    }
    user.token_expires_at = tokens.expires_at;
    info!("Refreshed access token for user {}", user_id);

    Ok(AuthenticatedUser {
        user,
        access_token: tokens.access_token,
        refreshed: true,
    })
}
