//! Minimal provider-agnostic contract for executing a single completion call.
//!
//! This crate defines only the request/params/response shapes and the
//! [`CompletionBackend`] capability shared by every provider. It excludes
//! provider transport details and conversation state.

use std::fmt;

mod params;

pub use params::{EngineParams, ParamError, DEFAULT_MODEL};

/// Identifier for one completion request.
pub type RequestId = u64;

/// Error returned while constructing/configuring a backend before any request starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInitError {
    message: String,
}

impl ProviderInitError {
    /// Creates a new provider initialization error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the underlying error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ProviderInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ProviderInitError {}

impl From<String> for ProviderInitError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ProviderInitError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Classification of a failed completion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    RateLimited,
    Authentication,
    InvalidRequest,
    Timeout,
    Transport,
    Cancelled,
    Provider,
}

impl BackendErrorKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate limited",
            Self::Authentication => "authentication failed",
            Self::InvalidRequest => "invalid request",
            Self::Timeout => "timed out",
            Self::Transport => "transport failure",
            Self::Cancelled => "cancelled",
            Self::Provider => "provider error",
        }
    }
}

/// Typed failure surfaced by a backend instead of a panic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    kind: BackendErrorKind,
    message: String,
}

impl BackendError {
    #[must_use]
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> BackendErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true for failures a user may reasonably retry unchanged.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            BackendErrorKind::RateLimited | BackendErrorKind::Timeout | BackendErrorKind::Transport
        )
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for BackendError {}

/// Chat role used in message-list prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One role/content pair of a chat-shaped prompt.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Which prompt payload a backend expects for a given model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptShape {
    Text,
    Messages,
}

/// Literal payload sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    Text(String),
    Messages(Vec<ChatMessage>),
}

impl Prompt {
    #[must_use]
    pub fn shape(&self) -> PromptShape {
        match self {
            Self::Text(_) => PromptShape::Text,
            Self::Messages(_) => PromptShape::Messages,
        }
    }

    /// Flattened text used for token accounting and logging.
    #[must_use]
    pub fn flatten(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Messages(messages) => messages
                .iter()
                .map(|message| message.content.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Input required to run one completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub request_id: RequestId,
    pub prompt: Prompt,
    pub params: EngineParams,
}

/// Result of a completion: one text per requested choice, in choice order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub request_id: RequestId,
    pub model: String,
    pub choices: Vec<String>,
}

impl Completion {
    /// Returns the first choice, which becomes the checked-out reply.
    #[must_use]
    pub fn primary(&self) -> Option<&str> {
        self.choices.first().map(String::as_str)
    }
}

/// Provider-emitted progress event for a completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionEvent {
    Started {
        request_id: RequestId,
    },
    Chunk {
        request_id: RequestId,
        choice: usize,
        text: String,
    },
    Finished {
        request_id: RequestId,
    },
}

impl CompletionEvent {
    /// Returns the request identifier associated with this event.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        match self {
            Self::Started { request_id }
            | Self::Chunk { request_id, .. }
            | Self::Finished { request_id } => *request_id,
        }
    }

    /// Returns true when this event terminates the request lifecycle.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished { .. })
    }
}

/// Immutable metadata describing a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub provider_id: String,
    pub model_id: String,
}

/// Backend capability: run one completion request.
pub trait CompletionBackend: Send + Sync + 'static {
    /// Returns provider/model identity metadata.
    fn profile(&self) -> ProviderProfile;

    /// Returns the prompt payload shape the backend wants for `model`.
    fn prompt_shape(&self, _model: &str) -> PromptShape {
        PromptShape::Text
    }

    /// Lists model identifiers known to the provider.
    fn list_models(&self) -> Result<Vec<String>, BackendError> {
        Ok(Vec::new())
    }

    /// Executes a completion request.
    ///
    /// Incremental text is surfaced through `emit` while the call is in flight;
    /// the returned [`Completion`] is authoritative.
    fn complete(
        &self,
        request: CompletionRequest,
        emit: &mut dyn FnMut(CompletionEvent),
    ) -> Result<Completion, BackendError>;
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{
        BackendError, BackendErrorKind, ChatMessage, ChatRole, Completion, CompletionBackend,
        CompletionEvent, CompletionRequest, EngineParams, Prompt, PromptShape, ProviderInitError,
        ProviderProfile,
    };

    struct MinimalBackend;

    impl CompletionBackend for MinimalBackend {
        fn profile(&self) -> ProviderProfile {
            ProviderProfile {
                provider_id: "minimal".to_string(),
                model_id: "minimal-model".to_string(),
            }
        }

        fn complete(
            &self,
            request: CompletionRequest,
            emit: &mut dyn FnMut(CompletionEvent),
        ) -> Result<Completion, BackendError> {
            emit(CompletionEvent::Started {
                request_id: request.request_id,
            });
            emit(CompletionEvent::Finished {
                request_id: request.request_id,
            });
            Ok(Completion {
                request_id: request.request_id,
                model: request.params.model,
                choices: vec!["ok".to_string()],
            })
        }
    }

    #[test]
    fn completion_event_request_id_returns_event_request_id() {
        let request_id = 42;
        let events = [
            CompletionEvent::Started { request_id },
            CompletionEvent::Chunk {
                request_id,
                choice: 0,
                text: "partial".to_string(),
            },
            CompletionEvent::Finished { request_id },
        ];

        for event in events {
            assert_eq!(event.request_id(), request_id);
        }
    }

    #[test]
    fn only_finished_is_terminal() {
        assert!(!CompletionEvent::Started { request_id: 1 }.is_terminal());
        assert!(!CompletionEvent::Chunk {
            request_id: 1,
            choice: 0,
            text: "hello".to_string(),
        }
        .is_terminal());
        assert!(CompletionEvent::Finished { request_id: 1 }.is_terminal());
    }

    #[test]
    fn provider_init_error_preserves_message() {
        let error = ProviderInitError::new("missing api key");
        assert_eq!(error.message(), "missing api key");
        assert_eq!(error.to_string(), "missing api key");
    }

    #[test]
    fn backend_error_display_includes_kind_and_message() {
        let error = BackendError::new(BackendErrorKind::RateLimited, "slow down");
        assert_eq!(error.to_string(), "rate limited: slow down");
        assert!(error.is_transient());
        assert!(!BackendError::new(BackendErrorKind::Authentication, "bad key").is_transient());
    }

    #[test]
    fn default_backend_hooks_are_text_shaped_and_modelless() {
        let backend = MinimalBackend;
        assert_eq!(backend.prompt_shape("anything"), PromptShape::Text);
        assert!(backend
            .list_models()
            .expect("default list should succeed")
            .is_empty());
    }

    #[test]
    fn minimal_backend_returns_primary_choice() {
        let backend = MinimalBackend;
        let mut events = Vec::new();
        let completion = backend
            .complete(
                CompletionRequest {
                    request_id: 3,
                    prompt: Prompt::Text("hi".to_string()),
                    params: EngineParams::default(),
                },
                &mut |event| events.push(event),
            )
            .expect("minimal backend should complete");

        assert_eq!(completion.primary(), Some("ok"));
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn message_prompt_flattens_contents_in_order() {
        let prompt = Prompt::Messages(vec![
            ChatMessage::new(ChatRole::User, "hello"),
            ChatMessage::new(ChatRole::Assistant, "hi there"),
        ]);

        assert_eq!(prompt.shape(), PromptShape::Messages);
        assert_eq!(prompt.flatten(), "hello\nhi there");
    }
}
