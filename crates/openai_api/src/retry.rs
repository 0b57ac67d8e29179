use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

/// Retries after the first attempt.
pub const MAX_RETRIES: u32 = 3;
/// Delay before the first retry; each further retry doubles it.
pub const BASE_DELAY_MS: u64 = 1000;

const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

fn transient_text() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)rate.?limit|overloaded|service.?unavailable|upstream.?connect|connection.?(refused|reset)|server.?had.?an.?error|try.?again",
        )
        .expect("transient error pattern must compile")
    })
}

/// Whether a failed response is worth retrying unchanged.
///
/// Exhausted quota also answers 429 but never clears by waiting.
pub fn is_retryable_http_error(status: u16, error_text: &str) -> bool {
    if error_text.contains("insufficient_quota") {
        return false;
    }
    RETRYABLE_STATUSES.contains(&status) || transient_text().is_match(error_text)
}

/// `base * 2^attempt`, saturating.
pub fn retry_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

pub fn retry_delay_ms(attempt: u32) -> Duration {
    retry_delay(Duration::from_millis(BASE_DELAY_MS), attempt)
}
