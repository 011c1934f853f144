//! Gateway to the content-generation backend.
//!
//! Requests reach this module only after passing the admission middleware.
//! The backend speaks the OpenAI-compatible chat completions protocol.

use std::time::Duration;

use async_trait::async_trait;
use kbase_core::error::CoreError;
use serde::{Deserialize, Serialize};

use crate::config::GenerationConfig;

const SERVICE: &str = "generation";

/// Upper bound on a single completion call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Input for one completion.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedContent {
    pub content: String,
    pub model: String,
}

/// Produces text for a prompt.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedContent, CoreError>;
}

/// [`ContentGenerator`] backed by an HTTP chat completions endpoint.
pub struct HttpContentGenerator {
    client: reqwest::Client,
    config: GenerationConfig,
}

impl HttpContentGenerator {
    pub fn new(config: GenerationConfig) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CoreError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

fn dependency(message: impl std::fmt::Display) -> CoreError {
    CoreError::Dependency {
        service: SERVICE,
        message: message.to_string(),
    }
}

#[async_trait]
impl ContentGenerator for HttpContentGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedContent, CoreError> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: [ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            max_tokens: request.max_tokens,
        };

        let mut call = self.client.post(&self.config.api_url).json(&body);
        if let Some(key) = &self.config.api_key {
            call = call.bearer_auth(key);
        }

        let response = call.send().await.map_err(dependency)?;
        let status = response.status();
        if !status.is_success() {
            return Err(dependency(format!("backend answered {status}")));
        }

        let parsed: ChatResponse = response.json().await.map_err(dependency)?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| dependency("backend returned no completion"))?;

        Ok(GeneratedContent {
            content,
            model: parsed.model.unwrap_or_else(|| self.config.model.clone()),
        })
    }
}
