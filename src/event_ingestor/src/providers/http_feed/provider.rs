use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::{Client, Url};
use shared_utils::env::get_env_var;
use snafu::{OptionExt, ResultExt};
use tracing::{debug, info};

use crate::{
    models::{event::AnalyticsEvent, request_params::FetchParams},
    providers::{
        ApiSnafu, ClientBuildSnafu, DecodeSnafu, EventSource, InvalidEndpointSnafu,
        InvalidSettingSnafu, MissingEnvVarSnafu, PageLimitSnafu, ReqwestSnafu, SourceError,
        SourceInitError,
        http_feed::{params::{DEFAULT_PAGE_SIZE, construct_params}, response::FeedPage},
    },
};

/// Env var read by [`HttpFeedProvider::from_env`].
pub const ENDPOINT_ENV: &str = "VISIT_MAP_ANALYTICS_ENDPOINT";

const DEFAULT_REQUESTS_PER_SECOND: NonZeroU32 = nonzero!(5u32);

/// Settings for the HTTP feed.
#[derive(Debug, Clone)]
pub struct HttpFeedConfig {
    pub endpoint: String,
    pub page_size: u32,
    /// Hard cap on pages walked in one fetch.
    pub max_pages: u32,
    /// Per-request timeout.
    pub timeout: Duration,
    pub requests_per_second: NonZeroU32,
}

impl HttpFeedConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: 100,
            timeout: Duration::from_secs(30),
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
        }
    }
}

pub struct HttpFeedProvider {
    client: Client,
    endpoint: Url,
    page_size: u32,
    max_pages: u32,
    limiter: DefaultDirectRateLimiter,
}

impl HttpFeedProvider {
    /// Creates a provider for the given feed settings.
    pub fn new(config: HttpFeedConfig) -> Result<Self, SourceInitError> {
        let endpoint = Url::parse(&config.endpoint)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .context(InvalidEndpointSnafu {
                endpoint: config.endpoint.clone(),
            })?;
        if config.page_size == 0 || config.max_pages == 0 {
            return InvalidSettingSnafu {
                message: "page_size and max_pages must be positive",
            }
            .fail();
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context(ClientBuildSnafu)?;

        Ok(Self {
            client,
            endpoint,
            page_size: config.page_size,
            max_pages: config.max_pages,
            limiter: RateLimiter::direct(Quota::per_second(config.requests_per_second)),
        })
    }

    /// Creates a provider whose endpoint is read from `VISIT_MAP_ANALYTICS_ENDPOINT`.
    pub fn from_env() -> Result<Self, SourceInitError> {
        let endpoint = get_env_var(ENDPOINT_ENV).context(MissingEnvVarSnafu)?;
        Self::new(HttpFeedConfig::new(endpoint))
    }

    async fn fetch_page(
        &self,
        params: &FetchParams,
        page_token: Option<&str>,
    ) -> Result<FeedPage, SourceError> {
        self.limiter.until_ready().await;

        let query = construct_params(params, self.page_size, page_token);
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&query)
            .send()
            .await
            .context(ReqwestSnafu)?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown API error".to_string());
            return ApiSnafu {
                status: status.as_u16(),
                message,
            }
            .fail();
        }

        let body = response.text().await.context(ReqwestSnafu)?;
        serde_json::from_str::<FeedPage>(&body).map_err(|e| {
            DecodeSnafu {
                message: e.to_string(),
            }
            .build()
        })
    }
}

#[async_trait]
impl EventSource for HttpFeedProvider {
    async fn fetch(&self, params: FetchParams) -> Result<Vec<AnalyticsEvent>, SourceError> {
        let mut events = Vec::new();
        let mut next_page_token: Option<String> = None;
        let mut pages = 0u32;

        loop {
            if pages == self.max_pages {
                return PageLimitSnafu {
                    max_pages: self.max_pages,
                }
                .fail();
            }
            let page = self.fetch_page(&params, next_page_token.as_deref()).await?;
            pages += 1;
            debug!(page = pages, events = page.events.len(), "fetched feed page");

            let token = page.next_token().map(str::to_string);
            events.extend(page.events.into_iter().map(AnalyticsEvent::from));

            // If there's a next page token, use it for the next iteration. Otherwise, we're done.
            match token {
                Some(t) => next_page_token = Some(t),
                None => break,
            }
        }

        info!(
            endpoint = %self.endpoint,
            pages,
            events = events.len(),
            "fetched analytics events"
        );
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_endpoint() {
        let err = HttpFeedProvider::new(HttpFeedConfig::new("file:///etc/passwd"))
            .err()
            .unwrap();
        assert!(matches!(err, SourceInitError::InvalidEndpoint { .. }));

        let err = HttpFeedProvider::new(HttpFeedConfig::new("not a url")).err().unwrap();
        assert!(err.to_string().contains("not a url"));
    }

    #[test]
    fn rejects_zero_page_size() {
        let mut cfg = HttpFeedConfig::new("https://analytics.example.com/v1/events");
        cfg.page_size = 0;
        let err = HttpFeedProvider::new(cfg).err().unwrap();
        assert!(matches!(err, SourceInitError::InvalidSetting { .. }));
    }

    #[test]
    fn accepts_https_endpoint() {
        let p = HttpFeedProvider::new(HttpFeedConfig::new("https://analytics.example.com/v1/events"))
            .unwrap();
        assert_eq!(p.endpoint.host_str(), Some("analytics.example.com"));
    }
}
