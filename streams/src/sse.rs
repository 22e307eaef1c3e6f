//! Production transport: HTTP GET with `Accept: text/event-stream`, body
//! decoded by `eventsource-stream`.
//!
//! A channel counts as alive while bytes keep arriving. The server writes
//! a frame or a keep-alive comment well inside one heartbeat interval, so a
//! longer silence means a half-open connection.

use std::{
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::{Stream, StreamExt};
use http_client::{HttpClientBuilder, HttpClientBuilderConfig};
use logger::debug;
use reqwest::header::{ACCEPT, CACHE_CONTROL, HeaderMap, HeaderValue};
use reqwest_middleware::ClientWithMiddleware;
use tokio::time::Instant;

use crate::{
    TransportError,
    transport::{EventChannel, EventTransport, Frame},
};

type EventStream = Pin<Box<dyn Stream<Item = Result<Event, EventStreamError<reqwest::Error>>> + Send>>;

pub struct SseTransport {
    http: ClientWithMiddleware,
    connection_timeout: Duration,
    idle_timeout: Duration,
}

impl std::fmt::Debug for SseTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseTransport")
            .field("connection_timeout", &self.connection_timeout)
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}

impl SseTransport {
    /// `idle_timeout` is how long an open body may stay silent before the
    /// channel reports itself dead; pass the heartbeat interval.
    pub fn new(connection_timeout: Duration, idle_timeout: Duration) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        // no overall timeout: the response body lives as long as the stream
        let config = HttpClientBuilderConfig {
            timeout: None,
            connect_timeout: Some(connection_timeout),
            max_idle_per_host: Some(1),
            default_headers: Some(headers),
        };
        let http = HttpClientBuilder::new(Some(config))
            .map_err(|e| TransportError::connect("", e.to_string()))?
            .with_tracing()
            .with_request_id()
            .build();

        Ok(Self {
            http,
            connection_timeout,
            idle_timeout,
        })
    }
}

#[async_trait::async_trait]
impl EventTransport for SseTransport {
    async fn open(&self, url: &str) -> Result<Box<dyn EventChannel>, TransportError> {
        let response = tokio::time::timeout(self.connection_timeout, self.http.get(url).send())
            .await
            .map_err(|_| TransportError::timeout(self.connection_timeout))?
            .map_err(|e| TransportError::connect(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::status(status.as_u16()));
        }
        debug!(url, "event stream open");

        let opened = Instant::now();
        let last_read = Arc::new(AtomicU64::new(0));
        let touch = Arc::clone(&last_read);
        // comments never surface as events, so activity is tracked on raw bytes
        let bytes = response.bytes_stream().inspect(move |_| {
            touch.store(elapsed_ms(opened), Ordering::Relaxed);
        });

        Ok(Box::new(SseChannel {
            events: Some(Box::pin(bytes.eventsource())),
            opened,
            last_read,
            idle_timeout: self.idle_timeout,
        }))
    }
}

struct SseChannel {
    /// `None` once the body ended or broke.
    events: Option<EventStream>,
    opened: Instant,
    /// Milliseconds after `opened` of the last chunk read.
    last_read: Arc<AtomicU64>,
    idle_timeout: Duration,
}

impl SseChannel {
    fn idle(&self) -> Duration {
        let last = self.last_read.load(Ordering::Relaxed);
        Duration::from_millis(elapsed_ms(self.opened).saturating_sub(last))
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[async_trait::async_trait]
impl EventChannel for SseChannel {
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        let events = self.events.as_mut()?;
        match events.next().await {
            Some(Ok(event)) => Some(Ok(Frame::new(event.event, event.data))),
            Some(Err(EventStreamError::Transport(e))) => {
                self.events = None;
                Some(Err(TransportError::stream(e.to_string())))
            }
            // malformed frame, the body itself is still readable
            Some(Err(e)) => Some(Err(TransportError::stream(e.to_string()))),
            None => {
                self.events = None;
                None
            }
        }
    }

    fn is_alive(&self) -> bool {
        self.events.is_some() && self.idle() <= self.idle_timeout
    }

    fn close(&mut self) {
        self.events = None;
    }
}
