//! OpenAI-backed implementation of the shared `completion_provider` contract.
//!
//! This adapter picks the chat or legacy completions endpoint per model,
//! translates `openai_api` stream deltas into [`CompletionEvent`]s and keeps an
//! optional on-disk backup of every raw response.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use completion_provider::{
    BackendError, BackendErrorKind, ChatRole, Completion, CompletionBackend, CompletionEvent,
    CompletionRequest, EngineParams, Prompt, PromptShape, ProviderInitError, ProviderProfile,
    DEFAULT_MODEL,
};
use openai_api::{
    is_chat_model, ApiCompletion, ApiMessage, ApiRequest, CancellationSignal,
    ChatCompletionRequest, OpenAiApiConfig, OpenAiApiError, OpenAiClient, OpenAiStreamEvent,
    SamplingOptions, TextCompletionRequest,
};
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{debug, warn};

/// Stable provider identifier used for explicit startup selection.
pub const OPENAI_PROVIDER_ID: &str = "openai";

/// Runtime configuration for the OpenAI backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAiBackendConfig {
    pub api_key: String,
    pub default_model: String,
    pub base_url: Option<String>,
    pub organization: Option<String>,
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
    /// Directory receiving `<timestamp>.json` copies of raw responses.
    pub backup_dir: Option<PathBuf>,
}

impl OpenAiBackendConfig {
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            default_model: DEFAULT_MODEL.to_string(),
            base_url: None,
            organization: None,
            timeout: None,
            max_retries: None,
            backup_dir: None,
        }
    }

    #[must_use]
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    #[must_use]
    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = Some(dir.into());
        self
    }

    fn to_api_config(&self) -> OpenAiApiConfig {
        let mut config = OpenAiApiConfig::new(self.api_key.clone());

        if let Some(base_url) = &self.base_url {
            config = config.with_base_url(base_url.clone());
        }

        if let Some(organization) = &self.organization {
            config = config.with_organization(organization.clone());
        }

        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }

        if let Some(max_retries) = self.max_retries {
            let base_delay = config.retry_base_delay;
            config = config.with_retries(max_retries, base_delay);
        }

        config
    }
}

trait CompletionClient: Send + Sync {
    fn complete(
        &self,
        request: &ApiRequest,
        cancel: Option<&CancellationSignal>,
        on_event: &mut dyn FnMut(&OpenAiStreamEvent),
    ) -> Result<ApiCompletion, OpenAiApiError>;

    fn list_models(&self) -> Result<Vec<String>, OpenAiApiError>;
}

#[derive(Debug)]
struct DefaultCompletionClient {
    client: OpenAiClient,
}

impl DefaultCompletionClient {
    fn runtime() -> Result<tokio::runtime::Runtime, OpenAiApiError> {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|error| {
                OpenAiApiError::Unknown(format!("failed to initialize tokio runtime: {error}"))
            })
    }
}

impl CompletionClient for DefaultCompletionClient {
    fn complete(
        &self,
        request: &ApiRequest,
        cancel: Option<&CancellationSignal>,
        on_event: &mut dyn FnMut(&OpenAiStreamEvent),
    ) -> Result<ApiCompletion, OpenAiApiError> {
        Self::runtime()?.block_on(self.client.complete(request, cancel, on_event))
    }

    fn list_models(&self) -> Result<Vec<String>, OpenAiApiError> {
        Self::runtime()?.block_on(self.client.list_models())
    }
}

/// `CompletionBackend` adapter backed by `openai_api` transport primitives.
pub struct OpenAiBackend {
    default_model: String,
    backup_dir: Option<PathBuf>,
    cancel: Option<CancellationSignal>,
    client: Arc<dyn CompletionClient>,
}

impl OpenAiBackend {
    /// Creates a backend using real OpenAI HTTP transport.
    pub fn new(config: OpenAiBackendConfig) -> Result<Self, ProviderInitError> {
        let client = OpenAiClient::new(config.to_api_config()).map_err(map_init_error)?;
        Ok(Self {
            default_model: sanitize_model(&config.default_model),
            backup_dir: config.backup_dir,
            cancel: None,
            client: Arc::new(DefaultCompletionClient { client }),
        })
    }

    /// Shares a flag that aborts in-flight requests once set.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn backup_response(&self, raw: &serde_json::Value) {
        let Some(dir) = &self.backup_dir else {
            return;
        };
        match write_backup(dir, raw) {
            Ok(path) => debug!(path = %path.display(), "backed up raw response"),
            Err(error) => warn!(dir = %dir.display(), %error, "failed to back up raw response"),
        }
    }

    #[cfg(test)]
    fn with_client_for_tests(
        default_model: &str,
        backup_dir: Option<PathBuf>,
        client: Arc<dyn CompletionClient>,
    ) -> Self {
        Self {
            default_model: sanitize_model(default_model),
            backup_dir,
            cancel: None,
            client,
        }
    }
}

impl CompletionBackend for OpenAiBackend {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: OPENAI_PROVIDER_ID.to_string(),
            model_id: self.default_model.clone(),
        }
    }

    fn prompt_shape(&self, model: &str) -> PromptShape {
        if is_chat_model(model) {
            PromptShape::Messages
        } else {
            PromptShape::Text
        }
    }

    fn list_models(&self) -> Result<Vec<String>, BackendError> {
        self.client.list_models().map_err(map_api_error)
    }

    fn complete(
        &self,
        request: CompletionRequest,
        emit: &mut dyn FnMut(CompletionEvent),
    ) -> Result<Completion, BackendError> {
        let request_id = request.request_id;
        let api_request = build_api_request(&request.prompt, &request.params);

        let mut started = false;
        let completion = self.client.complete(&api_request, self.cancel.as_ref(), &mut |event| {
            if let OpenAiStreamEvent::Delta { choice, text } = event {
                if !started {
                    emit(CompletionEvent::Started { request_id });
                    started = true;
                }
                emit(CompletionEvent::Chunk {
                    request_id,
                    choice: *choice,
                    text: text.clone(),
                });
            }
        });
        let completion = completion.map_err(map_api_error)?;

        self.backup_response(&completion.raw);

        if !started {
            emit(CompletionEvent::Started { request_id });
        }
        emit(CompletionEvent::Finished { request_id });

        Ok(Completion {
            request_id,
            model: completion.model,
            choices: completion.choices,
        })
    }
}

/// Builds the endpoint payload for `params.model`.
///
/// Chat models receive messages (a text prompt becomes one user message);
/// completion models receive text (messages are flattened).
fn build_api_request(prompt: &Prompt, params: &EngineParams) -> ApiRequest {
    let options = SamplingOptions {
        max_tokens: params.max_tokens,
        temperature: params.temperature,
        top_p: params.top_p,
        n: params.n,
        stop: params.stop.clone(),
        stream: params.stream,
        presence_penalty: params.presence_penalty,
        frequency_penalty: params.frequency_penalty,
    };

    if is_chat_model(&params.model) {
        let messages = match prompt {
            Prompt::Messages(messages) => messages
                .iter()
                .map(|message| ApiMessage::new(message.role.as_str(), message.content.clone()))
                .collect(),
            Prompt::Text(text) => vec![ApiMessage::new(ChatRole::User.as_str(), text.clone())],
        };
        ApiRequest::Chat(ChatCompletionRequest {
            model: params.model.clone(),
            messages,
            options,
        })
    } else {
        ApiRequest::Text(TextCompletionRequest {
            model: params.model.clone(),
            prompt: prompt.flatten(),
            options,
            logprobs: params.logprobs,
        })
    }
}

/// Classifies a transport failure into the provider-neutral error kinds.
pub fn map_api_error(error: OpenAiApiError) -> BackendError {
    let kind = match &error {
        OpenAiApiError::Timeout => BackendErrorKind::Timeout,
        OpenAiApiError::Cancelled => BackendErrorKind::Cancelled,
        OpenAiApiError::MissingApiKey => BackendErrorKind::Authentication,
        OpenAiApiError::Request(_) | OpenAiApiError::RetryExhausted { status: None, .. } => {
            BackendErrorKind::Transport
        }
        OpenAiApiError::Status(..) | OpenAiApiError::RetryExhausted { .. } => {
            match error.status().map(|status| status.as_u16()) {
                Some(401 | 403) => BackendErrorKind::Authentication,
                Some(429) => BackendErrorKind::RateLimited,
                Some(400 | 404 | 413 | 422) => BackendErrorKind::InvalidRequest,
                _ => BackendErrorKind::Provider,
            }
        }
        OpenAiApiError::InvalidHeader(_) | OpenAiApiError::Serde(_) => {
            BackendErrorKind::InvalidRequest
        }
        OpenAiApiError::MalformedResponse(_)
        | OpenAiApiError::StreamFailed { .. }
        | OpenAiApiError::Unknown(_) => BackendErrorKind::Provider,
    };
    BackendError::new(kind, error.to_string())
}

fn write_backup(dir: &Path, raw: &serde_json::Value) -> Result<PathBuf, String> {
    fs::create_dir_all(dir).map_err(|error| error.to_string())?;
    let stamp = OffsetDateTime::now_utc()
        .format(format_description!(
            "[year]-[month]-[day]T[hour]-[minute]-[second].[subsecond digits:6]"
        ))
        .map_err(|error| error.to_string())?;

    let mut path = dir.join(format!("{stamp}.json"));
    let mut suffix = 1;
    while path.exists() {
        path = dir.join(format!("{stamp}-{suffix}.json"));
        suffix += 1;
    }

    let body = serde_json::to_vec_pretty(raw).map_err(|error| error.to_string())?;
    fs::write(&path, body).map_err(|error| error.to_string())?;
    Ok(path)
}

fn sanitize_model(model: &str) -> String {
    let trimmed = model.trim();
    if trimmed.is_empty() {
        DEFAULT_MODEL.to_string()
    } else {
        trimmed.to_string()
    }
}

fn map_init_error(error: OpenAiApiError) -> ProviderInitError {
    ProviderInitError::new(format!("Failed to initialize openai provider: {error}"))
}
