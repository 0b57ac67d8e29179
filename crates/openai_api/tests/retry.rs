use std::time::Duration;

use openai_api::retry::{is_retryable_http_error, retry_delay, retry_delay_ms};

#[test]
fn overload_and_server_statuses_are_retried() {
    for status in [429, 500, 502, 503, 504] {
        assert!(is_retryable_http_error(status, ""), "status {status}");
    }
    assert!(!is_retryable_http_error(400, "bad request"));
    assert!(!is_retryable_http_error(401, "invalid api key"));
    assert!(!is_retryable_http_error(404, "model not found"));
}

#[test]
fn transient_error_text_is_retried_regardless_of_status() {
    assert!(is_retryable_http_error(400, "Rate limit reached for requests"));
    assert!(is_retryable_http_error(400, "The server had an error while processing"));
    assert!(is_retryable_http_error(0, "connection reset by peer"));
}

#[test]
fn exhausted_quota_is_never_retried() {
    let body = r#"{"error":{"type":"insufficient_quota","message":"quota"}}"#;
    assert!(!is_retryable_http_error(429, body));
}

#[test]
fn backoff_doubles_from_one_second() {
    assert_eq!(retry_delay_ms(0), Duration::from_millis(1000));
    assert_eq!(retry_delay_ms(1), Duration::from_millis(2000));
    assert_eq!(retry_delay_ms(2), Duration::from_millis(4000));
    assert_eq!(
        retry_delay(Duration::from_millis(5), 3),
        Duration::from_millis(40)
    );
    assert_eq!(
        retry_delay(Duration::from_secs(1), 64),
        Duration::from_secs(u64::from(u32::MAX))
    );
}
