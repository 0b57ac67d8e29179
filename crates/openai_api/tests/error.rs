use reqwest::StatusCode;

use openai_api::error::parse_error_message;
use openai_api::OpenAiApiError;

#[test]
fn parse_error_message_uses_openai_error_message() {
    let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error","code":"invalid_api_key"}}"#;
    let message = parse_error_message(StatusCode::UNAUTHORIZED, body);
    assert_eq!(message, "Incorrect API key provided");
}

#[test]
fn parse_error_message_is_explicit_about_quota() {
    let body = r#"{"error":{"message":"You exceeded your current quota","type":"insufficient_quota","code":null}}"#;
    let message = parse_error_message(StatusCode::TOO_MANY_REQUESTS, body);
    assert!(message.starts_with("insufficient_quota"));
    assert!(message.contains("You exceeded your current quota"));
}

#[test]
fn parse_error_message_falls_back_to_raw_body() {
    let body = "raw failure text";
    let message = parse_error_message(StatusCode::INTERNAL_SERVER_ERROR, body);
    assert_eq!(message, "raw failure text");
}

#[test]
fn parse_error_message_uses_canonical_reason_for_empty_body() {
    let message = parse_error_message(StatusCode::BAD_GATEWAY, "");
    assert_eq!(message, "Bad Gateway");
}

#[test]
fn status_errors_expose_their_status() {
    let error = OpenAiApiError::Status(StatusCode::TOO_MANY_REQUESTS, "slow".to_string());
    assert_eq!(error.status(), Some(StatusCode::TOO_MANY_REQUESTS));
    assert_eq!(error.to_string(), "HTTP 429 Too Many Requests slow");
    assert_eq!(OpenAiApiError::Timeout.status(), None);
}
