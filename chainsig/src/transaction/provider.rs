//! Transaction provider

use std::time::Duration;

use crate::error::{Error, Result};

/// Provider configuration
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Provider URL
    pub url: String,
    /// API key (if required)
    pub api_key: Option<String>,
    /// Timeout in seconds
    pub timeout: Option<u64>,
}

impl ProviderConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: u64) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// URL without a trailing slash, for joining REST paths
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Build an HTTP client honoring the configured timeout and API key
    pub fn http_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder();

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        if let Some(api_key) = &self.api_key {
            let mut headers = reqwest::header::HeaderMap::new();
            let value = format!("Bearer {}", api_key)
                .parse::<reqwest::header::HeaderValue>()
                .map_err(|e| Error::Provider(format!("Invalid API key: {}", e)))?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
            builder = builder.default_headers(headers);
        }

        builder
            .build()
            .map_err(|e| Error::Provider(format!("Failed to create HTTP client: {}", e)))
    }
}
