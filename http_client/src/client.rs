use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant, SystemTime},
};

use chrono::{DateTime, Utc};
use config_loader::TetrisConfig;
use data_types::{Backoff, ErrorKind};
use event_bus::{EventBus, events};
use logger::{debug, info, warn};
use recovery::{BucketPolicy, classify};
use reqwest::{Method, header::HeaderMap, multipart::Form};
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::{RetryDecision, RetryPolicy};
use serde::Serialize;
use serde_json::{Value, json};

use crate::{
    RequestError,
    builder::{HttpClientBuilder, HttpClientBuilderConfig},
    retry::{BackoffPolicy, RetryLedger},
};

/// Weight of the previous average in the response time EMA.
const EMA_DECAY: f64 = 0.9;

#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Overrides the configured request timeout.
    pub timeout: Option<Duration>,
    /// Overrides the configured retry budget.
    pub max_retries: Option<u32>,
    pub headers: HeaderMap,
}

impl RequestOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub data: Value,
    pub status: u16,
    pub elapsed: Duration,
}

/// Request counters, exposed as part of the client diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    pub request_count: u64,
    pub error_count: u64,
    pub avg_response_time_ms: f64,
    pub last_request_at: Option<DateTime<Utc>>,
    pub pending_retries: usize,
}

impl Diagnostics {
    fn observe(&mut self, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1_000.0;
        self.avg_response_time_ms = if self.avg_response_time_ms == 0.0 {
            ms
        } else {
            self.avg_response_time_ms * EMA_DECAY + ms * (1.0 - EMA_DECAY)
        };
    }
}

struct Inner {
    http: ClientWithMiddleware,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
    max_retry_delay: Duration,
    bus: Option<EventBus>,
    ledger: Mutex<RetryLedger>,
    diagnostics: Mutex<Diagnostics>,
}

/// JSON API client with per-request timeout and bounded, classified
/// retries. Cheap to clone.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.base_url)
            .field("timeout", &self.inner.timeout)
            .field("max_retries", &self.inner.max_retries)
            .finish()
    }
}

impl ApiClient {
    pub fn new(config: &TetrisConfig, bus: Option<EventBus>) -> Result<Self, RequestError> {
        let http = HttpClientBuilder::new(Some(HttpClientBuilderConfig::from(&config.api)))?
            .with_tracing()
            .with_request_id()
            .build();
        Ok(Self::with_client(http, config, bus))
    }

    /// Use a prebuilt middleware stack.
    pub fn with_client(http: ClientWithMiddleware, config: &TetrisConfig, bus: Option<EventBus>) -> Self {
        let api = &config.api;
        Self {
            inner: Arc::new(Inner {
                http,
                base_url: api.base_url.trim_end_matches('/').to_string(),
                timeout: api.timeout(),
                max_retries: api.max_retries,
                retry_delay: api.retry_delay(),
                max_retry_delay: api.max_retry_delay(),
                bus,
                ledger: Mutex::new(RetryLedger::new(config.session.retry_record_ttl())),
                diagnostics: Mutex::new(Diagnostics::default()),
            }),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.inner.base_url, path)
        }
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse, RequestError> {
        self.request(Method::GET, path, None, RequestOptions::default()).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<ApiResponse, RequestError> {
        self.request(Method::POST, path, Some(body), RequestOptions::default())
            .await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<ApiResponse, RequestError> {
        self.request(Method::PUT, path, Some(body), RequestOptions::default())
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse, RequestError> {
        self.request(Method::DELETE, path, None, RequestOptions::default())
            .await
    }

    /// Send a JSON request, retrying retryable failures with backoff.
    ///
    /// Every attempt re-sends the same method, URL, body and headers. The
    /// error returned is the one from the last attempt.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        options: RequestOptions,
    ) -> Result<ApiResponse, RequestError> {
        let url = self.url(path);
        let timeout = options.timeout.unwrap_or(self.inner.timeout);
        let max_retries = options.max_retries.unwrap_or(self.inner.max_retries);
        let started = SystemTime::now();
        let clock = Instant::now();

        {
            let mut diagnostics = self.diagnostics_lock();
            diagnostics.request_count += 1;
            diagnostics.last_request_at = Some(Utc::now());
        }
        debug!(%method, %url, "http request");

        let mut record_key: Option<String> = None;
        let mut past_retries = 0u32;

        loop {
            match self.send_once(&method, &url, body, &options.headers, timeout).await {
                Ok(response) => {
                    if let Some(key) = record_key.as_deref() {
                        self.ledger_lock().remove(key);
                    }
                    let elapsed = clock.elapsed();
                    self.diagnostics_lock().observe(elapsed);
                    debug!(%method, %url, status = response.status, ?elapsed, "http response");
                    self.emit(
                        events::REQUEST_SUCCESS,
                        json!({
                            "method": method.as_str(),
                            "url": path,
                            "status": response.status,
                            "elapsed_ms": elapsed.as_millis() as u64,
                        }),
                    );
                    return Ok(ApiResponse { elapsed, ..response });
                }
                Err(err) => {
                    self.diagnostics_lock().error_count += 1;
                    let kind = classify(&err.to_failure());
                    let (key, attempts) = self.ledger_lock().record_failure(
                        record_key.as_deref(),
                        method.as_str(),
                        &url,
                        &err.to_string(),
                        SystemTime::now(),
                    );
                    record_key = Some(key.clone());
                    warn!(
                        %method, %url, attempt = attempts, max_attempts = max_retries + 1,
                        kind = %kind, error = %err, "http request failed"
                    );

                    match self.retry_decision(kind, max_retries, started, past_retries) {
                        RetryDecision::Retry { execute_after } => {
                            self.ledger_lock().schedule(&key, execute_after);
                            let wait = execute_after
                                .duration_since(SystemTime::now())
                                .unwrap_or_default();
                            info!(%url, ?wait, "retrying request");
                            tokio::time::sleep(wait).await;
                            past_retries += 1;
                        }
                        RetryDecision::DoNotRetry => {
                            self.ledger_lock().remove(&key);
                            self.emit(
                                events::REQUEST_ERROR,
                                json!({
                                    "method": method.as_str(),
                                    "url": path,
                                    "kind": kind,
                                    "status": err.status_code(),
                                    "message": err.to_string(),
                                }),
                            );
                            return Err(err);
                        }
                    }
                }
            }
        }
    }

    fn retry_decision(&self, kind: ErrorKind, max_retries: u32, started: SystemTime, past_retries: u32) -> RetryDecision {
        let policy = BucketPolicy::for_kind(kind);
        if !policy.retryable {
            return RetryDecision::DoNotRetry;
        }
        let backoff = Backoff::new(self.inner.retry_delay, self.inner.max_retry_delay, max_retries)
            .with_multiplier(policy.backoff_multiplier);
        BackoffPolicy(backoff).should_retry(started, past_retries)
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
        headers: &HeaderMap,
        timeout: Duration,
    ) -> Result<ApiResponse, RequestError> {
        let mut builder = self
            .inner
            .http
            .request(method.clone(), url)
            .timeout(timeout)
            .headers(headers.clone());
        // `json` sets the content type unless the caller already did
        if let Some(body) = body.filter(|_| *method != Method::GET) {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| RequestError::from_middleware(e, timeout))?;
        Self::read_json(response, timeout).await
    }

    async fn read_json(response: reqwest::Response, timeout: Duration) -> Result<ApiResponse, RequestError> {
        let status = response.status();
        if !status.is_success() {
            return Err(RequestError::status(
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown"),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RequestError::from_reqwest(e, timeout))?;
        let data = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).map_err(|e| RequestError::decode(e.to_string()))?
        };

        Ok(ApiResponse {
            data,
            status: status.as_u16(),
            elapsed: Duration::ZERO,
        })
    }

    /// Multipart upload. Sent once: a consumed form cannot be replayed.
    pub async fn upload(&self, path: &str, form: Form) -> Result<ApiResponse, RequestError> {
        let url = self.url(path);
        let timeout = self.inner.timeout;
        let clock = Instant::now();

        let result = async {
            let response = self
                .inner
                .http
                .post(&url)
                .timeout(timeout)
                .multipart(form)
                .send()
                .await
                .map_err(|e| RequestError::from_middleware(e, timeout))?;
            Self::read_json(response, timeout).await
        }
        .await;

        match result {
            Ok(response) => {
                let elapsed = clock.elapsed();
                info!(%url, ?elapsed, "upload complete");
                self.emit(
                    events::UPLOAD_SUCCESS,
                    json!({ "url": path, "elapsed_ms": elapsed.as_millis() as u64 }),
                );
                Ok(ApiResponse { elapsed, ..response })
            }
            Err(err) => {
                warn!(%url, error = %err, "upload failed");
                self.diagnostics_lock().error_count += 1;
                self.emit(
                    events::UPLOAD_ERROR,
                    json!({ "url": path, "status": err.status_code(), "message": err.to_string() }),
                );
                Err(err)
            }
        }
    }

    pub fn diagnostics(&self) -> Diagnostics {
        let pending = self.ledger_lock().len();
        let mut snapshot = self.diagnostics_lock().clone();
        snapshot.pending_retries = pending;
        snapshot
    }

    /// Drop retry records past their TTL. Returns how many were removed.
    pub fn purge_retry_records(&self) -> usize {
        self.ledger_lock().purge_expired(SystemTime::now())
    }

    fn emit(&self, event: &str, payload: Value) {
        if let Some(bus) = &self.inner.bus {
            bus.emit(event, &payload);
        }
    }

    fn ledger_lock(&self) -> std::sync::MutexGuard<'_, RetryLedger> {
        self.inner.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn diagnostics_lock(&self) -> std::sync::MutexGuard<'_, Diagnostics> {
        self.inner.diagnostics.lock().unwrap_or_else(|e| e.into_inner())
    }
}
