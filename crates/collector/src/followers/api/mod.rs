//! Provider API access: rate-limited execution and typed endpoints

pub mod executor;
pub mod social_api;

// Re-export common API types
pub use executor::{rate_limit_wait, RateLimit, RateLimitStatus, RequestExecutor, StatusClass};
pub use social_api::{Cursor, FollowerIdsPage, LookupUser, SocialApi};
