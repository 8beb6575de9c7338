//! Rate limiting logic and state management.

mod engine;
mod key;
mod response;
mod store;
mod sweeper;
mod tier;

pub use engine::{CheckResult, RateLimiter};
pub use key::{Caller, RateLimitKey};
pub use response::{
    ProblemDetails, RateLimitHeaders, HEADER_LIMIT, HEADER_REMAINING, HEADER_RESET,
    HEADER_RETRY_AFTER,
};
pub use store::{Admission, InMemoryWindowStore, WindowState, WindowStore};
pub use sweeper::{Sweeper, SweeperHandle};
pub use tier::{TierPolicy, TierQuota};
