use data_types::generate_request_id;
use http::Extensions;
use reqwest::{
    Request, Response,
    header::{HeaderName, HeaderValue},
};
use reqwest_middleware::{Middleware, Next, Result};
use reqwest_tracing::{DefaultSpanBackend, TracingMiddleware};

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

pub fn tracing_middleware() -> TracingMiddleware<DefaultSpanBackend> {
    TracingMiddleware::default()
}

/// Stamps every outgoing attempt with a fresh `X-Request-ID` unless the
/// caller already set one.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestIdMiddleware;

#[async_trait::async_trait]
impl Middleware for RequestIdMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        if !req.headers().contains_key(&REQUEST_ID_HEADER) {
            if let Ok(value) = HeaderValue::from_str(&generate_request_id()) {
                req.headers_mut().insert(REQUEST_ID_HEADER, value);
            }
        }
        next.run(req, extensions).await
    }
}
