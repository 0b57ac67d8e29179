use std::collections::BTreeMap;

use crate::config::OpenAiApiConfig;
use crate::error::OpenAiApiError;

pub const HEADER_ACCEPT: &str = "accept";
pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_AUTHORIZATION: &str = "authorization";
pub const HEADER_ORGANIZATION: &str = "OpenAI-Organization";
pub const HEADER_USER_AGENT: &str = "User-Agent";

/// Build a deterministic header map for OpenAI requests.
///
/// `streaming` selects the `accept` value; extra headers from the config win
/// over the defaults.
pub fn build_headers(
    config: &OpenAiApiConfig,
    streaming: bool,
) -> Result<BTreeMap<String, String>, OpenAiApiError> {
    let mut headers = BTreeMap::new();

    let api_key = config.api_key.trim();
    if api_key.is_empty() {
        return Err(OpenAiApiError::MissingApiKey);
    }

    headers.insert(
        HEADER_AUTHORIZATION.to_owned(),
        format!("Bearer {api_key}"),
    );
    headers.insert(
        HEADER_ACCEPT.to_owned(),
        if streaming {
            "text/event-stream"
        } else {
            "application/json"
        }
        .to_owned(),
    );
    headers.insert(
        HEADER_CONTENT_TYPE.to_owned(),
        "application/json".to_owned(),
    );

    if let Some(organization) = config
        .organization
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        headers.insert(HEADER_ORGANIZATION.to_owned(), organization.to_owned());
    }

    let ua = match config.user_agent.as_deref() {
        Some(explicit) if !explicit.trim().is_empty() => explicit.trim().to_owned(),
        _ => default_user_agent(),
    };
    headers.insert(HEADER_USER_AGENT.to_owned(), ua);

    for (key, value) in &config.extra_headers {
        headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_owned());
    }

    Ok(headers)
}

fn default_user_agent() -> String {
    format!(
        "ttt/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_defaults_to_crate_identity() {
        let headers = build_headers(&OpenAiApiConfig::new("sk-test"), false)
            .expect("headers should build");
        let ua = headers.get(HEADER_USER_AGENT).expect("user agent present");
        assert!(ua.starts_with("ttt/"));
    }

    #[test]
    fn blank_organization_is_omitted() {
        let config = OpenAiApiConfig::new("sk-test").with_organization("  ");
        let headers = build_headers(&config, true).expect("headers should build");
        assert!(!headers.contains_key(HEADER_ORGANIZATION));
        assert_eq!(
            headers.get(HEADER_ACCEPT).map(String::as_str),
            Some("text/event-stream")
        );
    }
}
