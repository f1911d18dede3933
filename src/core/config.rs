//! Service configuration.
//!
//! Resolution order: built-in defaults, then `config.toml` in the data
//! directory, then environment variables, then CLI flags (applied by the
//! caller through [`AppConfig::with_overrides`]).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:3001/auth/callback";
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
pub const DEFAULT_SESSION_SECRET: &str = "consultflow-secret-change-in-production";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AzureAdConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub tenant_id: Option<String>,
    pub redirect_uri: Option<String>,
    /// Overrides `https://login.microsoftonline.com`; used by tests.
    pub authority_host: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AzureOpenAiConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub deployment: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
    pub session_secret: String,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub graph_base_url: String,
    pub http_timeout_secs: u64,
    pub azure: AzureAdConfig,
    pub openai: OpenAiConfig,
    pub azure_openai: AzureOpenAiConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            frontend_url: DEFAULT_FRONTEND_URL.to_string(),
            session_secret: DEFAULT_SESSION_SECRET.to_string(),
            log_level: "info".to_string(),
            log_file: None,
            graph_base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
            http_timeout_secs: 60,
            azure: AzureAdConfig::default(),
            openai: OpenAiConfig::default(),
            azure_openai: AzureOpenAiConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load `config.toml` from `data_dir` (if present) and overlay the process environment.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join("config.toml");
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Self::from_toml(&contents)
                .with_context(|| format!("Invalid configuration in {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Overlay values from an environment lookup. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("HOST") {
            self.host = v;
        }
        if let Some(port) = get("PORT").and_then(|v| v.parse().ok()) {
            self.port = port;
        }
        if let Some(v) = get("FRONTEND_URL") {
            self.frontend_url = v;
        }
        if let Some(v) = get("SESSION_SECRET") {
            self.session_secret = v;
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = get("GRAPH_BASE_URL") {
            self.graph_base_url = v;
        }
        if let Some(v) = get("AZURE_CLIENT_ID") {
            self.azure.client_id = Some(v);
        }
        if let Some(v) = get("AZURE_CLIENT_SECRET") {
            self.azure.client_secret = Some(v);
        }
        if let Some(v) = get("AZURE_TENANT_ID") {
            self.azure.tenant_id = Some(v);
        }
        if let Some(v) = get("AZURE_REDIRECT_URI") {
            self.azure.redirect_uri = Some(v);
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.openai.api_key = Some(v);
        }
        if let Some(v) = get("OPENAI_MODEL") {
            self.openai.model = Some(v);
        }
        if let Some(v) = get("AZURE_OPENAI_ENDPOINT") {
            self.azure_openai.endpoint = Some(v);
        }
        if let Some(v) = get("AZURE_OPENAI_API_KEY") {
            self.azure_openai.api_key = Some(v);
        }
        if let Some(v) = get("AZURE_OPENAI_DEPLOYMENT_NAME") {
            self.azure_openai.deployment = Some(v);
        }
    }

    pub fn with_overrides(mut self, host: Option<String>, port: Option<u16>) -> Self {
        if let Some(host) = host {
            self.host = host;
        }
        if let Some(port) = port {
            self.port = port;
        }
        self
    }

    pub fn redirect_uri(&self) -> String {
        self.azure
            .redirect_uri
            .clone()
            .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string())
    }

    pub fn uses_default_session_secret(&self) -> bool {
        self.session_secret == DEFAULT_SESSION_SECRET
    }
}
