//! HTTP transport seam
//!
//! The pipeline only needs "perform a GET, hand back status, headers and
//! body". `Transport` captures that capability so the executor can be driven
//! by reqwest in production and by scripted transports in tests.

use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::followers::config::CollectorConfig;
use crate::followers::core::{CollectorError, Result};

/// A GET request against the provider API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    url: Url,
}

impl ApiRequest {
    /// Build a request for `path` relative to the API base URL
    pub fn new(base: &Url, path: &str) -> Result<Self> {
        let url = base.join(path).map_err(|e| CollectorError::Configuration {
            message: format!("Cannot build endpoint URL from '{}' and '{}': {}", base, path, e),
            field: Some("api_base".to_string()),
            suggestion: Some("Use an absolute base URL such as https://api.twitter.com/".to_string()),
        })?;
        Ok(Self { url })
    }

    /// Append a query parameter
    pub fn with_query<V: fmt::Display>(mut self, key: &str, value: V) -> Self {
        self.url.query_pairs_mut().append_pair(key, &value.to_string());
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Value of a query parameter, if present
    pub fn query_value(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }
}

impl fmt::Display for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Status, headers and body of a completed HTTP exchange
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    /// Header names are lower-cased
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl RawResponse {
    pub fn new<S: Into<String>>(status: u16, body: S) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers.insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// A connection-level failure: no HTTP status was received
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportFailure {
    pub message: String,
}

impl TransportFailure {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self { message: message.into() }
    }
}

impl From<reqwest::Error> for TransportFailure {
    fn from(error: reqwest::Error) -> Self {
        let kind = if error.is_timeout() {
            "timed out"
        } else if error.is_connect() {
            "connection failed"
        } else if error.is_body() || error.is_decode() {
            "response body interrupted"
        } else {
            "request failed"
        };
        TransportFailure::new(format!("{}: {}", kind, error))
    }
}

/// Capability to perform a single GET request
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, request: &ApiRequest) -> std::result::Result<RawResponse, TransportFailure>;
}

/// reqwest-backed transport with bearer authentication
pub struct ReqwestTransport {
    client: Client,
    bearer_token: String,
}

impl ReqwestTransport {
    /// Create a transport from collector configuration
    pub fn from_config(config: &CollectorConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| CollectorError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
                field: None,
                suggestion: None,
            })?;

        Ok(Self {
            client,
            bearer_token: config.bearer_token.clone(),
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, request: &ApiRequest) -> std::result::Result<RawResponse, TransportFailure> {
        debug!("GET {}", request);
        let response = self.client
            .get(request.url().clone())
            .bearer_auth(&self.bearer_token)
            .send()
            .await?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.text().await?;
        debug!("GET {} -> {} ({} bytes)", request, status, body.len());

        Ok(RawResponse { status, headers, body })
    }
}
