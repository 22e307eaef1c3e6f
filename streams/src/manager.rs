use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use config_loader::TetrisConfig;
use data_types::{Backoff, ConnectionState, Session};
use event_bus::{EventBus, events};
use logger::{debug, error, info, trace, warn};
use serde_json::{Value, json};
use tokio::{
    sync::{Notify, watch},
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    TransportError,
    constants::{
        DEFAULT_CONNECTION_TIMEOUT_MS, DEFAULT_HEARTBEAT_INTERVAL_MS, DEFAULT_MAX_RECONNECT_ATTEMPTS,
        DEFAULT_RECONNECT_DELAY_MS, MAX_RECONNECT_DELAY_MS, SESSION_QUERY_PARAM,
    },
    dispatch::{Route, route},
    transport::{EventChannel, EventTransport},
};

#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    /// Stream endpoint without the session query.
    pub url: String,
    /// `max_retries` is the number of reconnect attempts before `Failed`.
    pub reconnect: Backoff,
    pub heartbeat_interval: Duration,
    pub connection_timeout: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            reconnect: Backoff::new(
                Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
                Duration::from_millis(MAX_RECONNECT_DELAY_MS),
                DEFAULT_MAX_RECONNECT_ATTEMPTS,
            ),
            heartbeat_interval: Duration::from_millis(DEFAULT_HEARTBEAT_INTERVAL_MS),
            connection_timeout: Duration::from_millis(DEFAULT_CONNECTION_TIMEOUT_MS),
        }
    }
}

impl StreamSettings {
    pub fn from_config(config: &TetrisConfig) -> Self {
        let stream = &config.stream;
        Self {
            url: config.url(&config.endpoints.progress_stream),
            reconnect: Backoff::new(
                stream.reconnect_delay(),
                stream.max_reconnect_delay(),
                stream.reconnect_attempts,
            )
            .with_multiplier(stream.backoff_multiplier),
            heartbeat_interval: stream.heartbeat_interval(),
            connection_timeout: stream.connection_timeout(),
        }
    }
}

/// Observable connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateSnapshot {
    pub state: ConnectionState,
    /// Reconnect attempt in progress, 0 outside `Reconnecting`/`Failed`.
    pub attempt: u32,
    /// Wait before the attempt, set while `Reconnecting`.
    pub delay: Option<Duration>,
}

struct Shared {
    session: Option<Session>,
    state: ConnectionState,
    attempts: u32,
    /// Bumped on every connect/disconnect; a driver task whose generation
    /// is stale must not touch the state.
    generation: u64,
    cancel: CancellationToken,
}

struct Inner {
    transport: Arc<dyn EventTransport>,
    bus: EventBus,
    settings: StreamSettings,
    shared: Mutex<Shared>,
    state_tx: watch::Sender<StateSnapshot>,
    wake: Notify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PumpEnd {
    Cancelled,
    Closed,
}

/// Owns the one push connection of a session.
///
/// Cheap to clone. The connection itself runs on a spawned task which is
/// cancelled by [`StreamManager::disconnect`] or a later `connect`.
#[derive(Clone)]
pub struct StreamManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for StreamManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamManager")
            .field("url", &self.inner.settings.url)
            .field("state", &self.state())
            .finish()
    }
}

impl StreamManager {
    pub fn new(transport: Arc<dyn EventTransport>, bus: EventBus, settings: StreamSettings) -> Self {
        let (state_tx, _) = watch::channel(StateSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                transport,
                bus,
                settings,
                shared: Mutex::new(Shared {
                    session: None,
                    state: ConnectionState::Disconnected,
                    attempts: 0,
                    generation: 0,
                    cancel: CancellationToken::new(),
                }),
                state_tx,
                wake: Notify::new(),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    pub fn session_id(&self) -> Option<String> {
        self.lock().session.as_ref().map(|s| s.id.clone())
    }

    pub fn session(&self) -> Option<Session> {
        self.lock().session.clone()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.lock().attempts
    }

    pub fn subscribe(&self) -> watch::Receiver<StateSnapshot> {
        self.inner.state_tx.subscribe()
    }

    /// Stream URL for a session.
    pub fn stream_url(&self, session_id: &str) -> Result<String, TransportError> {
        let base = &self.inner.settings.url;
        reqwest::Url::parse_with_params(base, &[(SESSION_QUERY_PARAM, session_id)])
            .map(String::from)
            .map_err(|e| TransportError::invalid_url(base.clone(), e.to_string()))
    }

    /// Open the stream for `session_id`, replacing any current connection.
    ///
    /// Returns once the connection task is started; progress is reported
    /// through the state channel and the bus. Connecting again to the
    /// session that is already connected does nothing.
    pub async fn connect(&self, session_id: &str) -> Result<(), TransportError> {
        let url = self.stream_url(session_id)?;

        let (generation, cancel) = {
            let mut shared = self.lock();
            let same_session = shared.session.as_ref().is_some_and(|s| s.id == session_id);
            if shared.state == ConnectionState::Connected && same_session {
                debug!(session_id, "stream already connected");
                return Ok(());
            }

            shared.cancel.cancel();
            shared.generation += 1;
            shared.cancel = CancellationToken::new();
            shared.attempts = 0;
            if !same_session {
                shared.session = Some(Session::new(session_id));
            }
            (shared.generation, shared.cancel.clone())
        };

        info!(session_id, %url, "connecting event stream");
        self.set_state(generation, ConnectionState::Connecting, 0, None);
        tokio::spawn(self.clone().drive(generation, cancel, session_id.to_string(), url));
        Ok(())
    }

    /// Tear everything down: pending reconnect, heartbeat and the open
    /// channel. Safe to call repeatedly.
    pub fn disconnect(&self) {
        let previous = {
            let mut shared = self.lock();
            shared.cancel.cancel();
            shared.generation += 1;
            shared.session = None;
            shared.attempts = 0;
            std::mem::replace(&mut shared.state, ConnectionState::Disconnected)
        };

        if previous == ConnectionState::Disconnected {
            return;
        }
        info!(from = %previous, "event stream disconnected");
        self.publish_state(StateSnapshot::default());
        self.emit(events::DISCONNECTED, json!({ "reason": "client" }));
    }

    /// Connectivity came back: skip the current backoff wait, or revive a
    /// connection that gave up.
    pub async fn network_online(&self) -> Result<(), TransportError> {
        let (state, session_id) = {
            let shared = self.lock();
            (shared.state, shared.session.as_ref().map(|s| s.id.clone()))
        };

        match (state, session_id) {
            (ConnectionState::Reconnecting, Some(_)) => {
                info!("network online, reconnecting without waiting");
                self.inner.wake.notify_waiters();
                Ok(())
            }
            (ConnectionState::Failed | ConnectionState::Disconnected, Some(id)) => {
                info!(session_id = %id, "network online, restarting event stream");
                self.connect(&id).await
            }
            _ => Ok(()),
        }
    }

    async fn drive(self, generation: u64, cancel: CancellationToken, session_id: String, url: String) {
        let settings = &self.inner.settings;
        let mut was_connected = false;

        loop {
            let opened = tokio::select! {
                _ = cancel.cancelled() => return,
                opened = self.inner.transport.open(&url) => opened,
            };

            match opened {
                Ok(mut channel) => {
                    if !self.mark_connected(generation) {
                        channel.close();
                        return;
                    }
                    info!(session_id, "event stream connected");
                    self.emit(events::CONNECTED, json!({ "session_id": session_id }));
                    if was_connected {
                        self.emit(events::CONNECTION_RESTORED, json!({ "session_id": session_id }));
                    }
                    was_connected = true;

                    let end = self.pump(channel.as_mut(), &cancel).await;
                    channel.close();
                    if end == PumpEnd::Cancelled {
                        return;
                    }
                    warn!(session_id, "event stream lost");
                    self.emit(events::DISCONNECTED, json!({ "session_id": session_id }));
                }
                Err(e) => {
                    warn!(session_id, error = %e, "event stream connect failed");
                }
            }

            let Some(attempt) = self.next_attempt(generation) else {
                return;
            };

            if !settings.reconnect.allows(attempt - 1) {
                error!(session_id, attempts = attempt - 1, "giving up on event stream");
                if self.set_state(generation, ConnectionState::Failed, attempt - 1, None) {
                    self.emit(
                        events::MAX_RECONNECT_ATTEMPTS_REACHED,
                        json!({ "session_id": session_id, "attempts": attempt - 1 }),
                    );
                }
                return;
            }

            let delay = settings.reconnect.delay(attempt);
            // armed before Reconnecting is visible to `network_online`
            let wake = self.inner.wake.notified();
            tokio::pin!(wake);
            wake.as_mut().enable();
            if !self.set_state(generation, ConnectionState::Reconnecting, attempt, Some(delay)) {
                return;
            }
            info!(session_id, attempt, ?delay, "reconnecting event stream");
            self.emit(
                events::RECONNECTING,
                json!({ "attempt": attempt, "delay_ms": millis(delay) }),
            );

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
                _ = &mut wake => debug!(session_id, "backoff wait skipped"),
            }
        }
    }

    /// Read frames until the channel dies or the task is cancelled,
    /// checking liveness every heartbeat interval.
    async fn pump(&self, channel: &mut dyn EventChannel, cancel: &CancellationToken) -> PumpEnd {
        let interval = self.inner.settings.heartbeat_interval;
        let mut heartbeat = tokio::time::interval_at(Instant::now() + interval, interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return PumpEnd::Cancelled,
                _ = heartbeat.tick() => {
                    if !channel.is_alive() {
                        warn!("heartbeat found event stream dead");
                        return PumpEnd::Closed;
                    }
                    trace!("heartbeat ok");
                }
                frame = channel.next_frame() => match frame {
                    Some(Ok(frame)) => self.dispatch(&frame),
                    Some(Err(e)) => {
                        warn!(error = %e, "event stream read error");
                        self.emit(
                            events::ERROR,
                            json!({ "type": "sse_connection_error", "message": e.to_string() }),
                        );
                        if !channel.is_alive() {
                            return PumpEnd::Closed;
                        }
                    }
                    None => return PumpEnd::Closed,
                },
            }
        }
    }

    fn dispatch(&self, frame: &crate::transport::Frame) {
        match route(frame) {
            Route::Publish { event, payload } => {
                debug!(event = %event, "stream frame");
                self.emit(&event, payload.clone());
                self.emit(
                    events::SSE_MESSAGE,
                    json!({ "event_type": event, "data": payload }),
                );
            }
            Route::Ack => debug!("stream handshake acknowledged"),
            Route::Ignore => trace!("empty stream frame"),
            Route::Malformed { message } => {
                warn!(error = %message, "unparseable stream frame");
                self.emit(
                    events::ERROR,
                    json!({ "type": "sse_parse_error", "message": message }),
                );
            }
        }
    }

    fn mark_connected(&self, generation: u64) -> bool {
        {
            let mut shared = self.lock();
            if shared.generation != generation {
                return false;
            }
            shared.attempts = 0;
        }
        self.set_state(generation, ConnectionState::Connected, 0, None)
    }

    /// Count a failed connection; `None` if this task is stale.
    fn next_attempt(&self, generation: u64) -> Option<u32> {
        let mut shared = self.lock();
        if shared.generation != generation {
            return None;
        }
        shared.attempts += 1;
        Some(shared.attempts)
    }

    /// Apply a transition unless `generation` was superseded.
    fn set_state(&self, generation: u64, state: ConnectionState, attempt: u32, delay: Option<Duration>) -> bool {
        {
            let mut shared = self.lock();
            if shared.generation != generation {
                return false;
            }
            shared.state = state;
        }
        self.publish_state(StateSnapshot { state, attempt, delay });
        true
    }

    fn publish_state(&self, snapshot: StateSnapshot) {
        self.inner.state_tx.send_replace(snapshot);
        self.emit(
            events::STATE_CHANGED,
            json!({
                "state": snapshot.state,
                "attempt": snapshot.attempt,
                "delay_ms": snapshot.delay.map(millis),
            }),
        );
    }

    fn emit(&self, event: &str, payload: Value) {
        self.inner.bus.emit(event, &payload);
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.inner.shared.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
