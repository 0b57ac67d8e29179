use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Transport-level failure talking to the OpenAI API.
#[derive(Debug, Error)]
pub enum OpenAiApiError {
    #[error("API key is required")]
    MissingApiKey,

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("request error: {0}")]
    Request(reqwest::Error),

    #[error("request timed out")]
    Timeout,

    #[error("request was cancelled")]
    Cancelled,

    #[error("HTTP {0} {1}")]
    Status(StatusCode, String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error(
        "gave up after retrying (status: {}, last error: {})",
        status_label(.status),
        .last_error.as_deref().unwrap_or("none")
    )]
    RetryExhausted {
        status: Option<StatusCode>,
        last_error: Option<String>,
    },

    #[error("stream failed{}: {message}", code_label(.code))]
    StreamFailed {
        code: Option<String>,
        message: String,
    },

    #[error("{0}")]
    Unknown(String),
}

impl OpenAiApiError {
    /// HTTP status attached to the failure, when one was received.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status(status, _) => Some(*status),
            Self::RetryExhausted { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for OpenAiApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::Request(error)
        }
    }
}

fn status_label(status: &Option<StatusCode>) -> String {
    status
        .map(|status| status.as_u16().to_string())
        .unwrap_or_else(|| "none".to_string())
}

fn code_label(code: &Option<String>) -> String {
    match code.as_deref().map(str::trim) {
        Some(code) if !code.is_empty() => format!(" ({code})"),
        _ => String::new(),
    }
}

/// `{"error": {"message": ..., "type": ..., "code": ...}}`
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
    code: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

impl ErrorDetail {
    fn is_quota(&self) -> bool {
        [self.code.as_deref(), self.kind.as_deref()]
            .into_iter()
            .flatten()
            .any(|label| label.eq_ignore_ascii_case("insufficient_quota"))
    }

    fn message(&self) -> Option<&str> {
        self.message
            .as_deref()
            .map(str::trim)
            .filter(|message| !message.is_empty())
    }
}

/// Human-readable message for a failed response body.
///
/// Prefers the API's own message, calls out exhausted quota explicitly and
/// falls back to the raw body or the status reason.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.error);

    if let Some(detail) = detail {
        if detail.is_quota() {
            let suffix = detail
                .message()
                .map(|message| format!(" {message}"))
                .unwrap_or_default();
            return format!("insufficient_quota: your OpenAI quota is exhausted.{suffix}");
        }
        if let Some(message) = detail.message() {
            return message.to_string();
        }
    }

    if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.to_string()
    }
}
