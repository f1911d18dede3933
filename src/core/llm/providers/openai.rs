use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::core::llm::{ChatMessage, GenerationOptions, LlmProvider, ProviderType};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_AZURE_DEPLOYMENT: &str = "gpt-35-turbo";
pub const AZURE_API_VERSION: &str = "2024-02-15-preview";

#[derive(Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<RequestMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct RequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

enum Endpoint {
    OpenAi { base_url: String, model: String },
    Azure { endpoint: String, deployment: String },
}

/// Chat completions against OpenAI or an Azure OpenAI deployment. Both speak
/// the same wire format and differ only in URL and auth header.
pub struct OpenAiProvider {
    api_key: String,
    endpoint: Endpoint,
    client: Client,
}

impl OpenAiProvider {
    pub fn openai(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            api_key,
            endpoint: Endpoint::OpenAi {
                base_url: base_url
                    .unwrap_or_else(|| OPENAI_BASE_URL.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                model: model.unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            },
            client: Client::builder().timeout(timeout).build()?,
        })
    }

    pub fn azure(
        endpoint: String,
        api_key: String,
        deployment: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            api_key,
            endpoint: Endpoint::Azure {
                endpoint: endpoint.trim_end_matches('/').to_string(),
                deployment: deployment.unwrap_or_else(|| DEFAULT_AZURE_DEPLOYMENT.to_string()),
            },
            client: Client::builder().timeout(timeout).build()?,
        })
    }

    pub fn completions_url(&self) -> String {
        match &self.endpoint {
            Endpoint::OpenAi { base_url, .. } => format!("{}/chat/completions", base_url),
            Endpoint::Azure {
                endpoint,
                deployment,
            } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint,
                urlencoding::encode(deployment),
                AZURE_API_VERSION
            ),
        }
    }

    pub fn model(&self) -> &str {
        match &self.endpoint {
            Endpoint::OpenAi { model, .. } => model,
            Endpoint::Azure { deployment, .. } => deployment,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn provider_type(&self) -> ProviderType {
        match self.endpoint {
            Endpoint::OpenAi { .. } => ProviderType::OpenAI,
            Endpoint::Azure { .. } => ProviderType::AzureOpenAI,
        }
    }

    async fn generate(
        &self,
        messages: &[ChatMessage],
        options: GenerationOptions,
    ) -> Result<String> {
        let req = ChatRequest {
            model: match &self.endpoint {
                Endpoint::OpenAi { model, .. } => Some(model.as_str()),
                Endpoint::Azure { .. } => None,
            },
            messages: messages
                .iter()
                .map(|m| RequestMessage {
                    role: &m.role,
                    content: &m.content,
                })
                .collect(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        let builder = self.client.post(self.completions_url()).json(&req);
        let builder = match self.endpoint {
            Endpoint::OpenAi { .. } => {
                builder.header("Authorization", format!("Bearer {}", self.api_key))
            }
            Endpoint::Azure { .. } => builder.header("api-key", &self.api_key),
        };

        let res = builder.send().await?;
        if !res.status().is_success() {
            let status = res.status();
            return Err(anyhow!(
                "{:?} API Error ({}): {}",
                self.provider_type(),
                status,
                res.text().await.unwrap_or_default()
            ));
        }
        let parsed: ChatResponse = res.json().await?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}
