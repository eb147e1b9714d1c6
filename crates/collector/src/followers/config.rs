//! Configuration types for the collection pipeline

use std::time::Duration;
use url::Url;

use crate::followers::core::{CollectorError, Result};

/// Default provider API root
pub const DEFAULT_API_BASE: &str = "https://api.twitter.com/";

/// Largest page the listing endpoint serves
pub const MAX_PAGE_SIZE: usize = 5000;

/// Largest id batch the lookup endpoint accepts
pub const MAX_LOOKUP_CHUNK: usize = 100;

/// Configuration for collection operations
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Root of the provider API; endpoint paths are joined onto it
    pub api_base: String,
    pub bearer_token: String,
    pub user_agent: String,
    pub timeout: Duration,
    /// Ids requested per listing page
    pub page_size: usize,
    /// Ids per batch lookup request
    pub lookup_chunk_size: usize,
    /// Attempts per request when the connection fails
    pub transport_retries: usize,
    /// Fixed delay between connection retries
    pub transport_retry_delay: Duration,
    /// Wait used when a rate-limited response carries no usable reset header
    pub rate_limit_default_wait: Duration,
    /// Lower bound on any rate-limit wait
    pub rate_limit_min_wait: Duration,
    /// Slack added past the provider's reset instant
    pub rate_limit_margin: Duration,
}

impl CollectorConfig {
    /// Default configuration with the given bearer token
    pub fn new<S: Into<String>>(bearer_token: S) -> Self {
        Self {
            bearer_token: bearer_token.into(),
            ..Self::default()
        }
    }

    pub fn with_api_base<S: Into<String>>(mut self, api_base: S) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_lookup_chunk_size(mut self, chunk_size: usize) -> Self {
        self.lookup_chunk_size = chunk_size;
        self
    }

    pub fn with_transport_retries(mut self, retries: usize, delay: Duration) -> Self {
        self.transport_retries = retries;
        self.transport_retry_delay = delay;
        self
    }

    pub fn with_rate_limit_waits(mut self, default_wait: Duration, min_wait: Duration, margin: Duration) -> Self {
        self.rate_limit_default_wait = default_wait;
        self.rate_limit_min_wait = min_wait;
        self.rate_limit_margin = margin;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Parsed API base, always ending in `/` so endpoint paths join beneath it
    pub fn api_base_url(&self) -> Result<Url> {
        let mut base = self.api_base.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        Url::parse(&base).map_err(|e| CollectorError::Configuration {
            message: format!("Invalid API base URL '{}': {}", self.api_base, e),
            field: Some("api_base".to_string()),
            suggestion: Some("URL must be absolute (include http:// or https://)".to_string()),
        })
    }

    /// Chunk size actually used, clamped to what the lookup endpoint accepts
    pub fn effective_chunk_size(&self) -> usize {
        self.lookup_chunk_size.clamp(1, MAX_LOOKUP_CHUNK)
    }

    /// Page size actually requested, clamped to the provider maximum
    pub fn effective_page_size(&self) -> usize {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    /// Reject settings that would make a run impossible
    pub fn validate(&self) -> Result<()> {
        if self.bearer_token.trim().is_empty() {
            return Err(CollectorError::Configuration {
                message: "Bearer token is empty".to_string(),
                field: Some("bearer_token".to_string()),
                suggestion: Some("Set X_BEARER_TOKEN or pass --token".to_string()),
            });
        }
        if self.page_size == 0 {
            return Err(CollectorError::Configuration {
                message: "Page size must be at least 1".to_string(),
                field: Some("page_size".to_string()),
                suggestion: None,
            });
        }
        if self.lookup_chunk_size == 0 {
            return Err(CollectorError::Configuration {
                message: "Lookup chunk size must be at least 1".to_string(),
                field: Some("lookup_chunk_size".to_string()),
                suggestion: None,
            });
        }
        if self.transport_retries == 0 {
            return Err(CollectorError::Configuration {
                message: "Transport retry budget must allow at least one attempt".to_string(),
                field: Some("transport_retries".to_string()),
                suggestion: None,
            });
        }
        self.api_base_url()?;
        Ok(())
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            bearer_token: String::new(),
            user_agent: "follower-rank/0.1.0".to_string(),
            timeout: Duration::from_secs(30),
            page_size: MAX_PAGE_SIZE,
            lookup_chunk_size: MAX_LOOKUP_CHUNK,
            transport_retries: 3,
            transport_retry_delay: Duration::from_secs(5),
            rate_limit_default_wait: Duration::from_secs(60),
            rate_limit_min_wait: Duration::from_secs(1),
            rate_limit_margin: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty_token() {
        let err = CollectorConfig::default().validate().unwrap_err();
        match err {
            CollectorError::Configuration { field, .. } => {
                assert_eq!(field.as_deref(), Some("bearer_token"));
            }
            other => panic!("Expected Configuration error, got {:?}", other),
        }
        assert!(CollectorConfig::new("token").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_budgets() {
        assert!(CollectorConfig::new("t").with_page_size(0).validate().is_err());
        assert!(CollectorConfig::new("t").with_lookup_chunk_size(0).validate().is_err());
        assert!(CollectorConfig::new("t")
            .with_transport_retries(0, Duration::from_secs(1))
            .validate()
            .is_err());
    }

    #[test]
    fn test_chunk_size_clamped_to_lookup_ceiling() {
        let config = CollectorConfig::new("t").with_lookup_chunk_size(250);
        assert_eq!(config.effective_chunk_size(), 100);
        let config = CollectorConfig::new("t").with_lookup_chunk_size(2);
        assert_eq!(config.effective_chunk_size(), 2);
    }

    #[test]
    fn test_api_base_gets_trailing_slash() {
        let config = CollectorConfig::new("t").with_api_base("http://localhost:8080/proxy");
        let url = config.api_base_url().unwrap();
        assert_eq!(url.join("1.1/users/show.json").unwrap().path(), "/proxy/1.1/users/show.json");
    }
}
