//! Response surface consumed by HTTP middleware.
//!
//! The engine itself never touches HTTP; this module renders a decision into
//! the header values attached to every response and the problem-details body
//! returned with a 429.

use serde::Serialize;

use super::engine::CheckResult;

/// Limit header, attached to every response.
pub const HEADER_LIMIT: &str = "X-RateLimit-Limit";
/// Remaining-quota header, attached to every response.
pub const HEADER_REMAINING: &str = "X-RateLimit-Remaining";
/// Window-reset header (epoch seconds), attached to every response.
pub const HEADER_RESET: &str = "X-RateLimit-Reset";
/// Retry hint header, attached to 429 responses only.
pub const HEADER_RETRY_AFTER: &str = "Retry-After";

/// Rendered header values for one decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitHeaders {
    /// Value for `X-RateLimit-Limit`
    pub limit: String,
    /// Value for `X-RateLimit-Remaining`
    pub remaining: String,
    /// Value for `X-RateLimit-Reset`
    pub reset: String,
    /// Value for `Retry-After`, present only on denials
    pub retry_after: Option<String>,
}

impl RateLimitHeaders {
    /// Render the headers for a decision.
    pub fn from_check(result: &CheckResult) -> Self {
        Self {
            limit: result.limit.to_string(),
            remaining: result.remaining.to_string(),
            reset: result.reset_epoch().to_string(),
            retry_after: result.retry_after_secs.map(|s| s.to_string()),
        }
    }

    /// (name, value) pairs in emission order.
    pub fn pairs(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = vec![
            (HEADER_LIMIT, self.limit.as_str()),
            (HEADER_REMAINING, self.remaining.as_str()),
            (HEADER_RESET, self.reset.as_str()),
        ];
        if let Some(retry) = &self.retry_after {
            pairs.push((HEADER_RETRY_AFTER, retry.as_str()));
        }
        pairs
    }
}

/// RFC 7807 problem-details body for a rejected request.
#[derive(Debug, Clone, Serialize)]
pub struct ProblemDetails {
    /// Error kind identifier
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Short human-readable summary
    pub title: &'static str,
    /// HTTP status code
    pub status: u16,
    /// Human-readable explanation for this occurrence
    pub detail: String,
    /// Seconds until a retry can succeed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ProblemDetails {
    /// Body for a 429 produced by a rate limit denial.
    pub fn too_many_requests(result: &CheckResult) -> Self {
        Self {
            kind: "rate-limit-exceeded",
            title: "Too Many Requests",
            status: 429,
            detail: format!(
                "Rate limit of {} requests per window exceeded",
                result.limit
            ),
            retry_after: result.retry_after_secs,
        }
    }
}
