//! Maps GitHub responses onto the pipeline's error taxonomy.
//!
//! | Response | Kind |
//! |----------|------|
//! | 401 | `AuthFailure` |
//! | 403 with exhausted quota or a rate-limit message | `RateLimited` |
//! | other 403 | `AuthFailure` |
//! | 429 | `RateLimited` |
//! | 404 | `NotFound` |
//! | 400, 409, 422 | `ValidationError` |
//! | 5xx, timeouts, connection errors | `TransientNetwork` |
//! | anything else, undecodable bodies | `PermanentApi` |

use std::time::Duration;

use pipeline::{ApiError, ErrorKind, RateLimitInfo, Timestamp};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;

/// Reads the rate-limit headers of a response.
///
/// `Retry-After` (seconds) takes precedence over `x-ratelimit-reset`
/// (epoch seconds). Returns `None` when neither quota header is present.
pub fn rate_limit_info(headers: &HeaderMap, now: Timestamp) -> Option<RateLimitInfo> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
    };
    let remaining = header("x-ratelimit-remaining").and_then(|v| v.parse::<u64>().ok());
    let retry_after = header("retry-after")
        .and_then(|v| v.parse::<u64>().ok())
        .map(|secs| now.plus(Duration::from_secs(secs)));
    let reset = header("x-ratelimit-reset")
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(Timestamp::from_unix_seconds);

    let reset_at = retry_after.or(reset);
    if remaining.is_none() && reset_at.is_none() {
        return None;
    }
    Some(RateLimitInfo {
        remaining,
        reset_at,
    })
}

/// GitHub error bodies carry a `message` field; fall back to the raw text.
fn error_message(status: StatusCode, body: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().chars().take(200).collect());
    if message.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {message}")
    }
}

/// Classifies a non-success response.
pub fn classify_status(
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
    now: Timestamp,
) -> ApiError {
    let message = error_message(status, body);
    let rate_limit = rate_limit_info(headers, now);

    let kind = match status.as_u16() {
        401 => ErrorKind::AuthFailure,
        403 => {
            let exhausted = rate_limit
                .as_ref()
                .is_some_and(|r| r.remaining == Some(0))
                || headers.contains_key("retry-after")
                || message.to_lowercase().contains("rate limit");
            if exhausted {
                ErrorKind::RateLimited
            } else {
                ErrorKind::AuthFailure
            }
        }
        429 => ErrorKind::RateLimited,
        404 => ErrorKind::NotFound,
        400 | 409 | 422 => ErrorKind::ValidationError,
        500..=599 => ErrorKind::TransientNetwork,
        _ => ErrorKind::PermanentApi,
    };

    let error = ApiError::new(kind, message);
    match (kind, rate_limit) {
        (ErrorKind::RateLimited, Some(info)) => error.with_rate_limit(info),
        _ => error,
    }
}

/// Classifies a failure to get any response at all.
pub fn classify_transport(err: &reqwest::Error) -> ApiError {
    if err.is_decode() {
        ApiError::permanent(format!("unexpected response body: {err}"))
    } else if err.is_builder() {
        ApiError::permanent(format!("invalid request: {err}"))
    } else {
        ApiError::transient(format!("request failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn now() -> Timestamp {
        Timestamp::from_unix_seconds(1_700_000_000).unwrap()
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn primary_rate_limit_uses_reset_header() {
        let err = classify_status(
            StatusCode::FORBIDDEN,
            &headers(&[("x-ratelimit-remaining", "0"), ("x-ratelimit-reset", "1700000600")]),
            r#"{"message":"API rate limit exceeded for installation"}"#,
            now(),
        );
        assert_eq!(err.kind, ErrorKind::RateLimited);
        assert_eq!(
            err.rate_limit_reset(),
            Timestamp::from_unix_seconds(1_700_000_600)
        );
    }

    #[test]
    fn secondary_rate_limit_uses_retry_after() {
        let err = classify_status(
            StatusCode::FORBIDDEN,
            &headers(&[("retry-after", "60")]),
            r#"{"message":"You have exceeded a secondary rate limit"}"#,
            now(),
        );
        assert_eq!(err.kind, ErrorKind::RateLimited);
        assert_eq!(err.rate_limit_reset(), Some(now().plus(Duration::from_secs(60))));
    }

    #[test]
    fn forbidden_without_quota_signal_is_auth_failure() {
        let err = classify_status(
            StatusCode::FORBIDDEN,
            &headers(&[("x-ratelimit-remaining", "4999")]),
            r#"{"message":"Resource not accessible by integration"}"#,
            now(),
        );
        assert_eq!(err.kind, ErrorKind::AuthFailure);
        assert!(err.rate_limit.is_none());
        assert!(err.message.contains("Resource not accessible"));
    }

    #[test]
    fn status_table() {
        let cases = [
            (401, ErrorKind::AuthFailure),
            (404, ErrorKind::NotFound),
            (409, ErrorKind::ValidationError),
            (422, ErrorKind::ValidationError),
            (429, ErrorKind::RateLimited),
            (502, ErrorKind::TransientNetwork),
            (503, ErrorKind::TransientNetwork),
            (418, ErrorKind::PermanentApi),
        ];
        for (code, kind) in cases {
            let status = StatusCode::from_u16(code).unwrap();
            assert_eq!(
                classify_status(status, &HeaderMap::new(), "", now()).kind,
                kind,
                "{code}"
            );
        }
    }
}
