pub mod annotate;

pub use annotate::{
    annotate_posts, classify, failure_sentinel, parse_classification, summarize, AnnotationStats,
};

use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use sentiment_core::{CoreError, LlmCredentials, LlmError, LlmProviderKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};

pub const OPENAI_API_BASE: &str = "https://api.openai.com";
pub const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const DEFAULT_CLAUDE_MODEL: &str = "claude-3-5-sonnet-latest";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// A remote text-generation service answering a single user prompt.
pub trait TextGenerator {
    fn provider_name(&self) -> &str;

    async fn generate(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, CoreError>;
}

fn http_client() -> Result<Client, CoreError> {
    Ok(Client::builder().timeout(Duration::from_secs(60)).build()?)
}

fn retry_after_secs(headers: &HeaderMap) -> u64 {
    headers
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<f64>().ok())
        .map(|secs| secs.ceil() as u64)
        .unwrap_or(60)
}

fn status_error(provider: &str, model: &str, status: StatusCode, headers: &HeaderMap) -> CoreError {
    let provider = provider.to_string();
    let error = match status.as_u16() {
        401 => LlmError::InvalidApiKey { provider },
        403 => LlmError::AuthenticationFailed { provider },
        404 => LlmError::ModelNotAvailable {
            model: model.to_string(),
        },
        429 => LlmError::RateLimitExceeded {
            provider,
            retry_after: retry_after_secs(headers),
        },
        500 | 502 | 503 | 529 => LlmError::ServiceUnavailable { provider },
        code => LlmError::UnexpectedStatus {
            provider,
            status_code: code,
        },
    };
    CoreError::Llm(error)
}

fn transport_error(provider: &str, e: reqwest::Error) -> CoreError {
    error!("Network error calling {}: {}", provider, e);
    if e.is_timeout() {
        CoreError::Llm(LlmError::RequestTimeout {
            provider: provider.to_string(),
        })
    } else {
        CoreError::Network(e)
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

pub struct OpenAiProvider {
    api_key: String,
    model: String,
    base_url: String,
    http_client: Client,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: Option<String>) -> Result<Self, CoreError> {
        Ok(Self {
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            base_url: OPENAI_API_BASE.to_string(),
            http_client: http_client()?,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl TextGenerator for OpenAiProvider {
    fn provider_name(&self) -> &str {
        "openai"
    }

    async fn generate(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, CoreError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature,
            max_tokens,
        };

        debug!("Requesting OpenAI completion with {}", self.model);
        let response = self
            .http_client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error("openai", e))?;

        let status = response.status();
        if !status.is_success() {
            warn!("OpenAI request failed with status {}", status);
            return Err(status_error("openai", &self.model, status, response.headers()));
        }

        let body: ChatCompletionResponse = response.json().await.map_err(|e| {
            error!("Failed to parse OpenAI response: {}", e);
            CoreError::Llm(LlmError::InvalidResponseFormat {
                provider: "openai".to_string(),
            })
        })?;

        let choice = body.choices.into_iter().next().ok_or_else(|| {
            CoreError::Llm(LlmError::InvalidResponseFormat {
                provider: "openai".to_string(),
            })
        })?;

        match choice.message.content.filter(|content| !content.trim().is_empty()) {
            Some(content) => Ok(content.trim().to_string()),
            None if choice.finish_reason.as_deref() == Some("content_filter") => {
                warn!("OpenAI withheld the completion");
                Err(CoreError::Llm(LlmError::ContentFiltered {
                    reason: "content_filter".to_string(),
                }))
            }
            None => Err(CoreError::Llm(LlmError::InvalidResponseFormat {
                provider: "openai".to_string(),
            })),
        }
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

pub struct ClaudeProvider {
    api_key: String,
    model: String,
    base_url: String,
    http_client: Client,
}

impl ClaudeProvider {
    pub fn new(api_key: String, model: Option<String>) -> Result<Self, CoreError> {
        Ok(Self {
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_CLAUDE_MODEL.to_string()),
            base_url: ANTHROPIC_API_BASE.to_string(),
            http_client: http_client()?,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl TextGenerator for ClaudeProvider {
    fn provider_name(&self) -> &str {
        "anthropic"
    }

    async fn generate(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, CoreError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens,
            temperature,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        debug!("Requesting Claude message with {}", self.model);
        let response = self
            .http_client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error("anthropic", e))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Anthropic request failed with status {}", status);
            return Err(status_error("anthropic", &self.model, status, response.headers()));
        }

        let body: MessagesResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Anthropic response: {}", e);
            CoreError::Llm(LlmError::InvalidResponseFormat {
                provider: "anthropic".to_string(),
            })
        })?;

        let body_stop_reason = body.stop_reason;
        let text: String = body
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n");

        if text.trim().is_empty() {
            if body_stop_reason.as_deref() == Some("refusal") {
                warn!("Anthropic declined to answer");
                return Err(CoreError::Llm(LlmError::ContentFiltered {
                    reason: "refusal".to_string(),
                }));
            }
            return Err(CoreError::Llm(LlmError::InvalidResponseFormat {
                provider: "anthropic".to_string(),
            }));
        }
        Ok(text.trim().to_string())
    }
}

/// The provider picked from the environment.
pub enum LlmClient {
    OpenAi(OpenAiProvider),
    Claude(ClaudeProvider),
}

impl LlmClient {
    pub fn from_credentials(credentials: &LlmCredentials) -> Result<Self, CoreError> {
        let api_key = credentials.api_key.clone();
        let model = credentials.model.clone();
        Ok(match credentials.provider {
            LlmProviderKind::OpenAi => LlmClient::OpenAi(OpenAiProvider::new(api_key, model)?),
            LlmProviderKind::Anthropic => LlmClient::Claude(ClaudeProvider::new(api_key, model)?),
        })
    }

    pub fn model(&self) -> &str {
        match self {
            LlmClient::OpenAi(provider) => provider.model(),
            LlmClient::Claude(provider) => provider.model(),
        }
    }
}

impl TextGenerator for LlmClient {
    fn provider_name(&self) -> &str {
        match self {
            LlmClient::OpenAi(provider) => provider.provider_name(),
            LlmClient::Claude(provider) => provider.provider_name(),
        }
    }

    async fn generate(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, CoreError> {
        match self {
            LlmClient::OpenAi(provider) => provider.generate(prompt, temperature, max_tokens).await,
            LlmClient::Claude(provider) => provider.generate(prompt, temperature, max_tokens).await,
        }
    }
}
