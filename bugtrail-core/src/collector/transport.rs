//! Blocking transport seam used by the retry worker, the job runner and
//! MANUAL submissions

use crate::config::CollectorConfig;
use crate::error::{Error, Result};

use super::client::CollectorClient;
use super::{SubmitError, SubmitResponse};

/// Delivers one serialized report and classifies the outcome.
///
/// Calls block until the collector answers or the client times out.
pub trait ReportTransport: Send + Sync {
    fn submit(&self, document: &str) -> std::result::Result<SubmitResponse, SubmitError>;
}

/// [`ReportTransport`] over HTTP
///
/// Owns a current-thread runtime and blocks on the async client, so it must
/// not be called from inside another tokio runtime.
pub struct HttpTransport {
    client: CollectorClient,
    runtime: tokio::runtime::Runtime,
}

impl HttpTransport {
    pub fn new(config: &CollectorConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Collector(format!("failed to create runtime: {}", e)))?;

        Ok(Self {
            client: CollectorClient::new(config)?,
            runtime,
        })
    }

    pub fn endpoint(&self) -> &str {
        self.client.endpoint()
    }
}

impl ReportTransport for HttpTransport {
    fn submit(&self, document: &str) -> std::result::Result<SubmitResponse, SubmitError> {
        self.runtime.block_on(self.client.send_report(document))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_http_transport_requires_endpoint() {
        assert!(HttpTransport::new(&CollectorConfig::default()).is_err());
    }

    #[test]
    fn test_blocking_submit_classifies_refused_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = CollectorConfig {
            server_url: Some(format!("http://{}/reports", addr)),
            email: Some("qa@example.com".to_string()),
            ..Default::default()
        };
        let transport = HttpTransport::new(&config).unwrap();

        let err = transport.submit("{}").unwrap_err();
        assert!(matches!(err, SubmitError::Transient(_)));
    }
}
