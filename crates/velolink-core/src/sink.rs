//! Uplink sink abstraction and the HTTP collector client.
//!
//! The pump and supervisor talk to the collector through [`UplinkSink`].
//! The production implementation is [`HttpSink`] (behind the `http-sink`
//! feature); tests use [`crate::mock::MockSink`].

use async_trait::async_trait;
use thiserror::Error;
use velolink_types::ReadingEnvelope;

/// Errors surfaced by sink implementations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SinkError {
    /// The endpoint could not be reached at the transport level.
    #[error("Collector not reachable at {url}: {source}")]
    NotReachable {
        /// The URL that was being contacted.
        url: String,
        /// The underlying transport error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The endpoint answered with a non-success status.
    #[error("Collector rejected the request: HTTP {status}: {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Error body, or the status line when the body had none.
        message: String,
    },

    /// The configured URL is not usable.
    #[error("Invalid collector URL: {0}")]
    InvalidUrl(String),

    /// The sink is not accepting traffic.
    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}

impl SinkError {
    /// Transport-level failure to reach `url`.
    pub fn not_reachable(
        url: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::NotReachable {
            url: url.into(),
            source: Box::new(source),
        }
    }

    /// Non-success HTTP answer.
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }

    /// Unusable collector URL.
    pub fn invalid_url(message: impl Into<String>) -> Self {
        Self::InvalidUrl(message.into())
    }

    /// The sink refused service.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// Destination for decoded reading envelopes.
#[async_trait]
pub trait UplinkSink: Send + Sync {
    /// Probe the sink without sending data. The supervisor polls this at
    /// bootstrap until the collector answers.
    async fn ready(&self) -> std::result::Result<(), SinkError>;

    /// Deliver one envelope. Callers treat failures as best-effort losses.
    async fn submit(&self, envelope: &ReadingEnvelope) -> std::result::Result<(), SinkError>;
}

#[cfg(feature = "http-sink")]
pub use http::HttpSink;

#[cfg(feature = "http-sink")]
mod http {
    use std::time::Duration;

    use async_trait::async_trait;
    use reqwest::Client;
    use tracing::debug;
    use velolink_types::ReadingEnvelope;

    use super::{SinkError, UplinkSink};

    /// HTTP collector client posting JSON envelopes.
    ///
    /// `ready` probes `GET {base}/api/health`; `submit` posts to
    /// `POST {base}/api/readings`.
    #[derive(Debug, Clone)]
    pub struct HttpSink {
        client: Client,
        base_url: String,
    }

    impl HttpSink {
        /// Create a sink for `base_url` (e.g. "http://localhost:8080") with
        /// a 10 second request timeout.
        pub fn new(base_url: &str) -> Result<Self, SinkError> {
            Self::with_timeout(base_url, Duration::from_secs(10))
        }

        /// Create a sink with a custom request timeout.
        pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, SinkError> {
            let base_url = normalize_url(base_url)?;
            let client = Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| SinkError::unavailable(format!("failed to build HTTP client: {e}")))?;
            Ok(Self { client, base_url })
        }

        /// Create a sink with a caller-provided reqwest client.
        pub fn with_client(base_url: &str, client: Client) -> Result<Self, SinkError> {
            let base_url = normalize_url(base_url)?;
            Ok(Self { client, base_url })
        }

        /// The normalized base URL.
        pub fn base_url(&self) -> &str {
            &self.base_url
        }
    }

    fn normalize_url(base_url: &str) -> Result<String, SinkError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(SinkError::invalid_url(format!(
                "URL must start with http:// or https://, got: {base_url}"
            )));
        }
        Ok(base_url)
    }

    #[async_trait]
    impl UplinkSink for HttpSink {
        async fn ready(&self) -> Result<(), SinkError> {
            let url = format!("{}/api/health", self.base_url);
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| SinkError::not_reachable(&url, e))?;

            let status = response.status();
            if status.is_success() {
                Ok(())
            } else {
                Err(SinkError::rejected(status.as_u16(), status.to_string()))
            }
        }

        async fn submit(&self, envelope: &ReadingEnvelope) -> Result<(), SinkError> {
            let url = format!("{}/api/readings", self.base_url);
            let response = self
                .client
                .post(&url)
                .json(envelope)
                .send()
                .await
                .map_err(|e| SinkError::not_reachable(&url, e))?;

            let status = response.status();
            if status.is_success() {
                debug!(status = status.as_u16(), "Reading accepted");
                return Ok(());
            }

            let message = response
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
                .unwrap_or_else(|| status.to_string());
            Err(SinkError::rejected(status.as_u16(), message))
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_error_display() {
        let err = SinkError::rejected(503, "Service Unavailable");
        assert_eq!(
            err.to_string(),
            "Collector rejected the request: HTTP 503: Service Unavailable"
        );

        let err = SinkError::invalid_url("no scheme");
        assert_eq!(err.to_string(), "Invalid collector URL: no scheme");

        let err = SinkError::unavailable("simulated outage");
        assert_eq!(err.to_string(), "Sink unavailable: simulated outage");
    }

    #[test]
    fn test_not_reachable_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = SinkError::not_reachable("http://localhost:8080/api/health", io);
        assert!(err.to_string().contains("http://localhost:8080/api/health"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
