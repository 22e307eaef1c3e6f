//! HTTP side of the TETRIS client: a `reqwest-middleware` stack with
//! tracing and request ids, and [`ApiClient`] on top of it adding timeouts,
//! classified retries and diagnostics.

pub mod builder;
pub mod client;
pub mod error;
pub mod middleware;
pub mod retry;

pub use builder::{HttpClientBuilder, HttpClientBuilderConfig};
pub use client::{ApiClient, ApiResponse, Diagnostics, RequestOptions};
pub use error::RequestError;
pub use retry::{BackoffPolicy, BucketStrategy, RetryLedger, RetryRecord, retryable};

pub use reqwest::{Method, multipart};
