use std::time::Duration;

use config_loader::ApiConfig;
use data_types::Backoff;
use reqwest::{
    Client,
    header::{ACCEPT, HeaderMap, HeaderValue},
};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::RetryTransientMiddleware;

use crate::{
    RequestError, middleware,
    retry::{BackoffPolicy, BucketStrategy},
};

#[derive(Debug, Clone)]
pub struct HttpClientBuilderConfig {
    pub timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    pub max_idle_per_host: Option<usize>,
    pub default_headers: Option<HeaderMap>,
}

impl Default for HttpClientBuilderConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
            connect_timeout: Some(Duration::from_secs(5)),
            max_idle_per_host: Some(8),
            default_headers: Some({
                let mut headers = HeaderMap::new();
                headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
                headers
            }),
        }
    }
}

impl From<&ApiConfig> for HttpClientBuilderConfig {
    fn from(api: &ApiConfig) -> Self {
        Self {
            timeout: Some(api.timeout()),
            ..Self::default()
        }
    }
}

pub struct HttpClientBuilder {
    inner: ClientBuilder,
}

impl HttpClientBuilder {
    pub fn new(config: Option<HttpClientBuilderConfig>) -> Result<Self, RequestError> {
        let config = config.unwrap_or_default();
        let mut base = Client::builder();

        if let Some(timeout) = config.timeout {
            base = base.timeout(timeout);
        }

        if let Some(default_headers) = config.default_headers {
            base = base.default_headers(default_headers);
        }

        if let Some(max_idle) = config.max_idle_per_host {
            base = base.pool_max_idle_per_host(max_idle);
        }

        if let Some(connect_timeout) = config.connect_timeout {
            base = base.connect_timeout(connect_timeout);
        }

        let client = base
            .build()
            .map_err(|e| RequestError::build(format!("failed to create reqwest client: {e}")))?;
        Ok(Self {
            inner: ClientBuilder::new(client),
        })
    }

    /// Wrap every request in a `reqwest-tracing` span.
    pub fn with_tracing(mut self) -> Self {
        self.inner = self.inner.with(middleware::tracing_middleware());
        self
    }

    /// Attach an `X-Request-ID` to each attempt.
    pub fn with_request_id(mut self) -> Self {
        self.inner = self.inner.with(middleware::RequestIdMiddleware);
        self
    }

    /// Transparent retries of retryable buckets for callers that do not
    /// need per-attempt events. `ApiClient` runs its own loop instead.
    pub fn with_retry(mut self, backoff: Backoff) -> Self {
        self.inner = self.inner.with(RetryTransientMiddleware::new_with_policy_and_strategy(
            BackoffPolicy(backoff),
            BucketStrategy,
        ));
        self
    }

    /// Apply custom middleware
    pub fn with_middleware<M>(mut self, middleware: M) -> Self
    where
        M: reqwest_middleware::Middleware + Send + Sync + 'static,
    {
        self.inner = self.inner.with(middleware);
        self
    }

    pub fn build(self) -> ClientWithMiddleware {
        self.inner.build()
    }
}
