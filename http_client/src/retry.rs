//! Retry decisions and the in-flight retry ledger.

use std::{
    collections::HashMap,
    time::{Duration, SystemTime},
};

use data_types::{Backoff, ErrorKind};
use recovery::{BucketPolicy, classify_status};
use reqwest_retry::{RetryDecision, RetryPolicy, Retryable, RetryableStrategy};

/// Exponential backoff without jitter, expressed as a `reqwest_retry`
/// policy so it plugs into `RetryTransientMiddleware` as well as the
/// client's own loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy(pub Backoff);

impl RetryPolicy for BackoffPolicy {
    fn should_retry(&self, _request_start_time: SystemTime, n_past_retries: u32) -> RetryDecision {
        if !self.0.allows(n_past_retries) {
            return RetryDecision::DoNotRetry;
        }
        RetryDecision::Retry {
            execute_after: SystemTime::now() + self.0.delay(n_past_retries + 1),
        }
    }
}

/// Bucket to `reqwest_retry` vocabulary.
pub fn retryable(kind: ErrorKind) -> Retryable {
    if BucketPolicy::for_kind(kind).retryable {
        Retryable::Transient
    } else {
        Retryable::Fatal
    }
}

/// Retries exactly what the bucket table calls retryable: connection
/// failures, timeouts and 5xx. Session and validation statuses are final.
#[derive(Debug, Clone, Copy, Default)]
pub struct BucketStrategy;

impl RetryableStrategy for BucketStrategy {
    fn handle(&self, res: &Result<reqwest::Response, reqwest_middleware::Error>) -> Option<Retryable> {
        let kind = match res {
            Ok(response) => classify_status(response.status().as_u16())?,
            Err(reqwest_middleware::Error::Reqwest(e)) if e.is_timeout() => ErrorKind::Timeout,
            Err(reqwest_middleware::Error::Reqwest(e)) if e.is_connect() || e.is_request() => ErrorKind::Network,
            Err(_) => return Some(Retryable::Fatal),
        };
        Some(retryable(kind))
    }
}

/// Bookkeeping for one failing request.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryRecord {
    pub request_key: String,
    pub attempt_count: u32,
    pub first_failure_at: SystemTime,
    pub next_attempt_at: Option<SystemTime>,
    pub last_error: String,
}

/// Retry records keyed by method, URL and time of first failure.
///
/// A record lives from the first failure until the request succeeds or
/// gives up. Anything older than the TTL is purged on the next insert, so
/// an abandoned record cannot leak.
#[derive(Debug)]
pub struct RetryLedger {
    records: HashMap<String, RetryRecord>,
    ttl: Duration,
}

impl RetryLedger {
    pub fn new(ttl: Duration) -> Self {
        Self {
            records: HashMap::new(),
            ttl,
        }
    }

    pub fn request_key(method: &str, url: &str, first_failure_at: SystemTime) -> String {
        let millis = first_failure_at
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        format!("{method} {url} {millis}")
    }

    /// Record a failed attempt. `key` is `None` for the first failure of a
    /// request and the previously returned key afterwards.
    pub fn record_failure(
        &mut self,
        key: Option<&str>,
        method: &str,
        url: &str,
        error: &str,
        now: SystemTime,
    ) -> (String, u32) {
        if let Some(record) = key.and_then(|k| self.records.get_mut(k)) {
            record.attempt_count += 1;
            record.last_error = error.to_string();
            record.next_attempt_at = None;
            return (record.request_key.clone(), record.attempt_count);
        }

        self.purge_expired(now);
        let request_key = Self::request_key(method, url, now);
        self.records.insert(
            request_key.clone(),
            RetryRecord {
                request_key: request_key.clone(),
                attempt_count: 1,
                first_failure_at: now,
                next_attempt_at: None,
                last_error: error.to_string(),
            },
        );
        (request_key, 1)
    }

    pub fn schedule(&mut self, key: &str, at: SystemTime) {
        if let Some(record) = self.records.get_mut(key) {
            record.next_attempt_at = Some(at);
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<RetryRecord> {
        self.records.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&RetryRecord> {
        self.records.get(key)
    }

    pub fn purge_expired(&mut self, now: SystemTime) -> usize {
        let before = self.records.len();
        let ttl = self.ttl;
        self.records.retain(|_, record| {
            now.duration_since(record.first_failure_at)
                .map(|age| age <= ttl)
                .unwrap_or(true)
        });
        before - self.records.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
