//! Transport-only OpenAI API client primitives.
//!
//! This crate owns request building, response parsing, SSE stream decoding and
//! retry behavior for the chat/completions and legacy completions endpoints.
//! It contains no conversation state and no terminal coupling.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod headers;
pub mod payload;
pub mod retry;
pub mod sse;
pub mod url;

pub use client::{ApiCompletion, CancellationSignal, OpenAiClient};
pub use config::OpenAiApiConfig;
pub use error::OpenAiApiError;
pub use events::{FinishReason, OpenAiStreamEvent};
pub use payload::{
    ApiMessage, ApiRequest, ChatCompletionRequest, SamplingOptions, TextCompletionRequest,
};
pub use sse::SseStreamParser;
pub use url::{is_chat_model, normalize_base_url, Endpoint};
