//! HTTP client for the report collector
//!
//! One endpoint, one verb: the serialized report document is POSTed as-is.
//! Every failure comes back already classified as a [`SubmitError`].

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};

use crate::config::CollectorConfig;
use crate::error::{Error, Result};

use super::{SubmitError, SubmitResponse};

/// HTTP client for the collector endpoint
pub struct CollectorClient {
    http_client: reqwest::Client,
    endpoint: String,
}

impl CollectorClient {
    /// Create a new collector client from configuration
    ///
    /// Returns an error if the endpoint or timeouts are missing or invalid.
    /// No identity is required: every document carries its own.
    pub fn new(config: &CollectorConfig) -> Result<Self> {
        config.validate_endpoint()?;

        let endpoint = config
            .server_url
            .clone()
            .ok_or_else(|| Error::Config("collector.server_url is required".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POST one serialized report
    pub async fn send_report(&self, document: &str) -> std::result::Result<SubmitResponse, SubmitError> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .body(document.to_owned())
            .send()
            .await
            .map_err(|e| classify_request_error(&e))?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            return Err(SubmitError::Terminal(format!(
                "API error ({}): {}",
                status, error_text
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| SubmitError::Terminal(format!("failed to read response: {}", e)))?;

        let body = if text.trim().is_empty() {
            None
        } else {
            let value: serde_json::Value = serde_json::from_str(&text)
                .map_err(|e| SubmitError::Terminal(format!("failed to parse response: {}", e)))?;
            Some(value)
        };

        Ok(SubmitResponse {
            status: status.as_u16(),
            body,
        })
    }
}

/// Classify a failure that happened before any response arrived.
///
/// Only a failure to reach the endpoint is worth retrying later.
fn classify_request_error(error: &reqwest::Error) -> SubmitError {
    if error.is_connect() {
        SubmitError::Transient(format!("collector unreachable: {}", error))
    } else {
        SubmitError::Terminal(format!("HTTP request failed: {}", error))
    }
}
