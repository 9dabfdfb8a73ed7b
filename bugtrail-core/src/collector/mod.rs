//! Collector transport
//!
//! Reports are delivered with a single `POST` of the JSON document to the
//! configured endpoint. TLS is handled by the HTTP client.
//!
//! ## Failure classification
//!
//! The HTTP layer returns a [`SubmitError`] that is already classified:
//! - [`SubmitError::Transient`]: the endpoint could not be reached. Durable
//!   paths keep the report and try again on the next pass.
//! - [`SubmitError::Terminal`]: anything else (error status, unreadable or
//!   malformed response). The report is dropped.
//!
//! ## Configuration
//!
//! ```toml
//! [collector]
//! server_url = "https://collector.example.com/api/v1/reports.json"
//! api_key = "bt_live_xxxxxxxxxxxx"
//! ```

mod client;
mod transport;

use thiserror::Error;

pub use client::CollectorClient;
pub use transport::{HttpTransport, ReportTransport};

/// A successful delivery
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitResponse {
    /// HTTP status code
    pub status: u16,
    /// Parsed JSON body, if the collector sent one
    pub body: Option<serde_json::Value>,
}

/// A failed delivery, classified at the source
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// Connection-level failure; retry later
    #[error("transient network error: {0}")]
    Transient(String),

    /// Server-side or serialization failure; do not retry
    #[error("terminal submission error: {0}")]
    Terminal(String),
}

impl SubmitError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SubmitError::Transient(_))
    }
}
