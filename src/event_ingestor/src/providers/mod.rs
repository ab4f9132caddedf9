//! Source abstraction for analytics event feeds.
//!
//! This module defines the [`EventSource`] trait, the single interface the ingestion
//! pipeline needs from an analytics vendor: "give me every event newer than X".
//!
//! Each concrete source (the paginated HTTP feed, an in-memory replay) implements
//! [`EventSource`] and owns its vendor-specific transport and validation. The trait is
//! async and object safe, so the runtime can pick a source dynamically.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use event_ingestor::models::{event::AnalyticsEvent, request_params::FetchParams};
//! use event_ingestor::providers::{EventSource, SourceError};
//!
//! struct Nothing;
//!
//! #[async_trait]
//! impl EventSource for Nothing {
//!     async fn fetch(&self, _params: FetchParams) -> Result<Vec<AnalyticsEvent>, SourceError> {
//!         Ok(vec![])
//!     }
//! }
//! ```

pub mod http_feed;
pub mod memory;

use async_trait::async_trait;
use shared_utils::env::MissingEnvVarError;
use snafu::{Backtrace, Snafu};

use crate::models::{event::AnalyticsEvent, request_params::FetchParams};

/// Trait for fetching raw visit events from an analytics provider.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Fetches every event strictly newer than `params.since`.
    ///
    /// Order is not guaranteed; callers sort.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<AnalyticsEvent>)` - All pages, flattened.
    /// * `Err(SourceError)` - Transport, vendor or decoding failure.
    async fn fetch(&self, params: FetchParams) -> Result<Vec<AnalyticsEvent>, SourceError>;
}

/// Errors that can occur during the creation of a source instance.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SourceInitError {
    /// missed environment variable.
    #[snafu(display("Missing environment variable: {source}"))]
    MissingEnvVar {
        source: MissingEnvVarError,
        backtrace: Backtrace,
    },

    /// failed to init reqwest client
    #[snafu(display("Failed to build HTTP client: {source}"))]
    ClientBuild {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// The configured endpoint is not an absolute http(s) URL.
    #[snafu(display("Invalid feed endpoint '{endpoint}'"))]
    InvalidEndpoint {
        endpoint: String,
        backtrace: Backtrace,
    },

    /// A numeric setting that must be positive was zero.
    #[snafu(display("Invalid source setting: {message}"))]
    InvalidSetting {
        message: String,
        backtrace: Backtrace,
    },
}

/// Errors that can occur within an `EventSource` implementation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SourceError {
    /// An error during an API request (e.g., network failure, timeout).
    #[snafu(display("API request failed: {source}"))]
    Reqwest {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// The provider answered with a non-success status.
    #[snafu(display("API error ({status}): {message}"))]
    Api {
        status: u16,
        message: String,
        backtrace: Backtrace,
    },

    /// The response body did not match the expected page shape.
    #[snafu(display("Malformed response page: {message}"))]
    Decode {
        message: String,
        backtrace: Backtrace,
    },

    /// The provider kept handing out page tokens past the configured cap.
    #[snafu(display("Pagination exceeded {max_pages} pages"))]
    PageLimit {
        max_pages: u32,
        backtrace: Backtrace,
    },
}

impl SourceError {
    /// Whether retrying the same fetch later can reasonably succeed.
    ///
    /// Network failures, timeouts, 429 and 5xx are retryable; a page that does
    /// not decode or a runaway pagination will fail the same way next time.
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::Reqwest { source, .. } => {
                source.is_timeout()
                    || source.is_connect()
                    || source.is_request()
                    || source.status().is_some_and(|s| s.is_server_error())
            }
            SourceError::Api { status, .. } => *status == 429 || *status >= 500,
            SourceError::Decode { .. } | SourceError::PageLimit { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    use super::*;

    struct FixedSource(Vec<AnalyticsEvent>);
    struct DownSource;

    #[async_trait]
    impl EventSource for FixedSource {
        async fn fetch(&self, _params: FetchParams) -> Result<Vec<AnalyticsEvent>, SourceError> {
            Ok(self.0.clone())
        }
    }

    #[async_trait]
    impl EventSource for DownSource {
        async fn fetch(&self, _params: FetchParams) -> Result<Vec<AnalyticsEvent>, SourceError> {
            ApiSnafu {
                status: 503u16,
                message: "maintenance",
            }
            .fail()
        }
    }

    // Runtime selection only works because the trait is object safe.
    fn get_source(name: &str) -> Box<dyn EventSource> {
        if name == "fixed" {
            let ts = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
            Box::new(FixedSource(vec![AnalyticsEvent::new(
                ts,
                Some("Seattle"),
                Some("United States"),
            )]))
        } else {
            Box::new(DownSource)
        }
    }

    #[tokio::test]
    async fn dynamic_source_dispatch() {
        let events = get_source("fixed")
            .fetch(FetchParams::default())
            .await
            .unwrap();
        assert_eq!(events.len(), 1);

        let err = get_source("down")
            .fetch(FetchParams::default())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn decode_and_page_limit_are_not_retryable() {
        let decode = DecodeSnafu { message: "bad" }.build();
        assert!(!decode.is_retryable());
        let limit = PageLimitSnafu { max_pages: 3u32 }.build();
        assert!(!limit.is_retryable());
        let throttled = ApiSnafu {
            status: 429u16,
            message: "slow down",
        }
        .build();
        assert!(throttled.is_retryable());
        let auth = ApiSnafu {
            status: 401u16,
            message: "nope",
        }
        .build();
        assert!(!auth.is_retryable());
    }
}
