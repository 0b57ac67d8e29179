/// Default base URL for OpenAI requests.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

const CHAT_MODEL_PREFIXES: [&str; 3] = ["gpt-3.5-turbo", "gpt-4", "gpt-4o"];

/// Endpoint families served by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    ChatCompletions,
    Completions,
    Models,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Self::ChatCompletions => "/chat/completions",
            Self::Completions => "/completions",
            Self::Models => "/models",
        }
    }

    /// Full URL for this endpoint under `base`.
    pub fn url(&self, base: &str) -> String {
        format!("{}{}", normalize_base_url(base), self.path())
    }
}

/// Returns true when `model` is served by the chat endpoint.
///
/// Instruct variants of chat families still use the legacy completions endpoint.
pub fn is_chat_model(model: &str) -> bool {
    let id = model.rsplit('/').next().unwrap_or(model);
    if id.contains("instruct") {
        return false;
    }
    CHAT_MODEL_PREFIXES
        .iter()
        .any(|prefix| id.starts_with(prefix))
}

/// Normalize a base URL so endpoint paths can be appended.
///
/// Normalization rules:
/// 1) empty input falls back to the default base URL
/// 2) trailing slashes are removed
/// 3) a trailing endpoint path (`/chat/completions`, `/completions`, `/models`) is stripped
pub fn normalize_base_url(input: &str) -> String {
    let base = if input.trim().is_empty() {
        DEFAULT_OPENAI_BASE_URL
    } else {
        input.trim()
    };

    let mut trimmed = base.trim_end_matches('/');
    for endpoint in [
        Endpoint::ChatCompletions,
        Endpoint::Completions,
        Endpoint::Models,
    ] {
        if let Some(stripped) = trimmed.strip_suffix(endpoint.path()) {
            trimmed = stripped.trim_end_matches('/');
            break;
        }
    }
    trimmed.to_string()
}
