use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::FinishReason;
use crate::url::Endpoint;

/// One message of a chat completions request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiMessage {
    pub role: String,
    pub content: String,
}

impl ApiMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Sampling knobs shared by both endpoint payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingOptions {
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub n: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub presence_penalty: f64,
    #[serde(default)]
    pub frequency_penalty: f64,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            max_tokens: 200,
            temperature: 0.9,
            top_p: 1.0,
            n: 1,
            stop: None,
            stream: false,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
        }
    }
}

/// Request payload for `POST /chat/completions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ApiMessage>,
    #[serde(flatten)]
    pub options: SamplingOptions,
}

/// Request payload for the legacy `POST /completions` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextCompletionRequest {
    pub model: String,
    pub prompt: String,
    #[serde(flatten)]
    pub options: SamplingOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<u32>,
}

/// Either endpoint payload, carrying the endpoint it targets.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiRequest {
    Chat(ChatCompletionRequest),
    Text(TextCompletionRequest),
}

impl ApiRequest {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            Self::Chat(_) => Endpoint::ChatCompletions,
            Self::Text(_) => Endpoint::Completions,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Self::Chat(request) => &request.model,
            Self::Text(request) => &request.model,
        }
    }

    pub fn options(&self) -> &SamplingOptions {
        match self {
            Self::Chat(request) => &request.options,
            Self::Text(request) => &request.options,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.options().stream
    }

    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Chat(request) => serde_json::to_value(request),
            Self::Text(request) => serde_json::to_value(request),
        }
    }
}

/// Non-streaming response body shared by both endpoints.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CompletionResponse {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<ResponseChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ResponseChoice {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub message: Option<ResponseMessage>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

impl ResponseChoice {
    pub fn content(&self) -> &str {
        self.message
            .as_ref()
            .and_then(|message| message.content.as_deref())
            .or(self.text.as_deref())
            .unwrap_or("")
    }

    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason.as_deref().and_then(FinishReason::parse)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// Body of `GET /models`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ModelList {
    #[serde(default)]
    pub data: Vec<ModelEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ModelEntry {
    pub id: String,
}
