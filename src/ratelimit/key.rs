//! Counter key construction and caller identity.

use std::fmt;

/// The authenticated caller as seen by the engine.
///
/// Carries the stable account id and the quota tier assigned to it. How the
/// identity was established (tokens, sessions) is the middleware's business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// Stable unique account id
    pub user_id: String,
    /// Quota tier name, e.g. `tier1`
    pub tier: String,
}

impl Caller {
    /// Create a new caller identity.
    pub fn new(user_id: impl Into<String>, tier: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            tier: tier.into(),
        }
    }
}

/// A key that uniquely identifies one rate limit counter.
///
/// Composed of the caller's user id and the endpoint identifier. The endpoint
/// is expected to be a method + path *pattern* (`GET /api/v1/data/{path}`),
/// not the raw URL, so parameterized routes share a single counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    /// The caller's user id
    pub user_id: String,
    /// The endpoint identifier
    pub endpoint: String,
}

impl RateLimitKey {
    /// Create a new key from a user id and endpoint identifier.
    pub fn new(user_id: &str, endpoint: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            endpoint: endpoint.to_string(),
        }
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user_id, self.endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display() {
        let key = RateLimitKey::new("user-42", "GET /api/v1/data/{path}");
        assert_eq!(key.to_string(), "user-42:GET /api/v1/data/{path}");
    }

    #[test]
    fn test_key_equality_is_structural() {
        let a = RateLimitKey::new("user-1", "GET /health");
        let b = RateLimitKey::new("user-1", "GET /health");
        let c = RateLimitKey::new("user-2", "GET /health");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_same_user_different_endpoints_are_distinct() {
        let a = RateLimitKey::new("user-1", "GET /api/v1/data/{path}");
        let b = RateLimitKey::new("user-1", "POST /api/v1/auth/refresh");
        assert_ne!(a, b);
    }
}
