use std::sync::{Arc, Mutex, MutexGuard, Weak};

use config_loader::TetrisConfig;
use data_types::{ConnectionState, generate_session_id};
use event_bus::{EventBus, events};
use http_client::{ApiClient, ApiResponse, Diagnostics, Method, RequestError, RequestOptions, multipart};
use logger::{debug, info, warn};
use poller::{AdaptivePoller, CallbackId, PollState};
use recovery::{ActionOutcome, HandleOptions, NotificationCenter, RecoveryCoordinator, templates};
use reqwest_middleware::ClientWithMiddleware;
use serde::Serialize;
use serde_json::{Value, json};
use streams::{EventTransport, SseTransport, StateSnapshot, StreamManager, StreamSettings};
use tokio_util::sync::CancellationToken;

use crate::{
    ClientError,
    envelope::{ensure_success, succeeded},
    monitor, session,
};

/// Mutable facade state. Never held across an await.
#[derive(Debug, Default)]
struct FacadeState {
    session_id: Option<String>,
    session_kind: Option<String>,
    initialized: bool,
    monitor: Option<CancellationToken>,
}

pub(crate) struct Inner {
    pub(crate) config: TetrisConfig,
    pub(crate) bus: EventBus,
    pub(crate) api: ApiClient,
    pub(crate) stream: StreamManager,
    pub(crate) poller: AdaptivePoller,
    pub(crate) notifications: NotificationCenter,
    pub(crate) coordinator: Arc<RecoveryCoordinator>,
    state: Mutex<FacadeState>,
}

/// Everything a UI needs to render the connection badge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionSnapshot {
    pub session_id: Option<String>,
    pub initialized: bool,
    pub online: bool,
    pub state: ConnectionState,
    pub reconnect_attempts: u32,
    pub diagnostics: Diagnostics,
}

pub struct CommunicationManagerBuilder {
    config: TetrisConfig,
    bus: Option<EventBus>,
    transport: Option<Arc<dyn EventTransport>>,
    http: Option<ClientWithMiddleware>,
}

impl CommunicationManagerBuilder {
    pub fn new(config: TetrisConfig) -> Self {
        Self {
            config,
            bus: None,
            transport: None,
            http: None,
        }
    }

    /// Publish on an existing bus instead of a private one.
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Replace the SSE transport, e.g. with a scripted one in tests.
    pub fn with_transport(mut self, transport: Arc<dyn EventTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_http_client(mut self, http: ClientWithMiddleware) -> Self {
        self.http = Some(http);
        self
    }

    pub fn build(self) -> Result<CommunicationManager, ClientError> {
        let config = self.config;
        let bus = self.bus.unwrap_or_default();

        let api = match self.http {
            Some(http) => ApiClient::with_client(http, &config, Some(bus.clone())),
            None => ApiClient::new(&config, Some(bus.clone()))?,
        };
        let transport: Arc<dyn EventTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(SseTransport::new(
                config.stream.connection_timeout(),
                config.stream.heartbeat_interval(),
            )?),
        };
        let stream = StreamManager::new(transport, bus.clone(), StreamSettings::from_config(&config));
        let notifications = NotificationCenter::new(bus.clone());
        let coordinator = Arc::new(
            RecoveryCoordinator::new(config.messages.clone()).with_notifications(notifications.clone()),
        );
        let poller = AdaptivePoller::new(config.polling);

        let inner = Arc::new(Inner {
            config,
            bus,
            api,
            stream,
            poller,
            notifications,
            coordinator,
            state: Mutex::new(FacadeState::default()),
        });
        inner
            .coordinator
            .set_session_recovery(Arc::new(session::Rejoiner::new(Arc::downgrade(&inner))));
        watch_stream(&inner);

        Ok(CommunicationManager { inner })
    }
}

/// The one object a page holds: session lifecycle, TETRIS API calls, the
/// progress stream and failure handling behind a single handle.
///
/// Cheap to clone. Requires a Tokio runtime.
#[derive(Clone)]
pub struct CommunicationManager {
    pub(crate) inner: Arc<Inner>,
}

impl std::fmt::Debug for CommunicationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommunicationManager")
            .field("base_url", &self.inner.api.base_url())
            .field("session_id", &self.session_id())
            .field("stream", &self.inner.stream.state())
            .finish()
    }
}

impl CommunicationManager {
    pub fn builder(config: TetrisConfig) -> CommunicationManagerBuilder {
        CommunicationManagerBuilder::new(config)
    }

    pub fn new(config: TetrisConfig) -> Result<Self, ClientError> {
        Self::builder(config).build()
    }

    pub(crate) fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    pub fn config(&self) -> &TetrisConfig {
        &self.inner.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    pub fn stream(&self) -> &StreamManager {
        &self.inner.stream
    }

    pub fn poller(&self) -> &AdaptivePoller {
        &self.inner.poller
    }

    pub fn notifications(&self) -> &NotificationCenter {
        &self.inner.notifications
    }

    pub fn coordinator(&self) -> &RecoveryCoordinator {
        &self.inner.coordinator
    }

    pub fn session_id(&self) -> Option<String> {
        self.state().session_id.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.state().initialized
    }

    /// Start background diagnostics and housekeeping. Idempotent.
    pub fn initialize(&self) {
        {
            let mut state = self.state();
            if state.initialized {
                debug!("communication manager already initialized");
                return;
            }
            state.initialized = true;
            state.monitor = Some(monitor::spawn(Arc::downgrade(&self.inner)));
        }
        info!(base_url = self.inner.api.base_url(), "communication manager initialized");
        self.emit(events::INITIALIZED, Value::Null);
    }

    /// Join a new server session and open its progress stream.
    ///
    /// `kind` defaults to the configured session kind. Returns the new
    /// session id; on failure no session is kept.
    pub async fn start_session(&self, kind: Option<&str>) -> Result<String, ClientError> {
        self.initialize();

        let kind = kind.unwrap_or(&self.inner.config.session.kind).to_string();
        let session_id = generate_session_id(self.inner.config.session.id_length);
        {
            let mut state = self.state();
            state.session_id = Some(session_id.clone());
            state.session_kind = Some(kind.clone());
        }
        info!(session_id, kind, "starting session");

        if let Err(e) = self.join(&session_id, &kind).await {
            warn!(session_id, error = %e, "session start failed");
            self.clear_session(&session_id);
            if let ClientError::Request(request) = &e {
                // nothing to re-join yet
                let options = HandleOptions {
                    recover_session: false,
                    ..HandleOptions::default()
                };
                self.inner
                    .coordinator
                    .handle(&request.to_failure(), "start_session", options)
                    .await;
            }
            return Err(e);
        }

        if let Err(e) = self.inner.stream.connect(&session_id).await {
            self.clear_session(&session_id);
            return Err(e.into());
        }

        self.emit(
            events::SESSION_STARTED,
            json!({ "session_id": session_id, "type": kind }),
        );
        Ok(session_id)
    }

    /// Upload a photo with the people count for the current session.
    pub async fn upload_file(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        people_count: u32,
    ) -> Result<ApiResponse, ClientError> {
        let session_id = self.require_session()?;
        let photo = multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = multipart::Form::new()
            .part("photo", photo)
            .text("people_count", people_count.to_string())
            .text("session_id", session_id);

        info!(file_name, people_count, "uploading photo");
        let response = match self.inner.api.upload(&self.inner.config.endpoints.upload, form).await {
            Ok(response) => response,
            Err(e) => return Err(self.fail("upload_file", e).await),
        };

        self.emit(
            events::FILE_UPLOADED,
            json!({ "file": file_name, "people_count": people_count, "result": response.data }),
        );
        Ok(response)
    }

    pub async fn start_step_analysis(
        &self,
        people_count: u32,
        image_data_url: &str,
        scenario: Option<&str>,
    ) -> Result<ApiResponse, ClientError> {
        let mut body = json!({
            "people_count": people_count,
            "image_data_url": image_data_url,
        });
        if let Some(scenario) = scenario {
            body["scenario"] = json!(scenario);
        }

        info!(people_count, ?scenario, "starting step analysis");
        let endpoint = &self.inner.config.endpoints.step_analysis;
        let response = self.call("start_step_analysis", Method::POST, endpoint, Some(&body)).await?;
        if succeeded(&response) {
            self.emit(events::STEP_ANALYSIS_STARTED, response.data.clone());
        }
        Ok(response)
    }

    pub async fn reset_system(&self) -> Result<ApiResponse, ClientError> {
        info!("requesting system reset");
        let endpoint = &self.inner.config.endpoints.reset;
        let response = self.call("reset_system", Method::POST, endpoint, None).await?;
        if succeeded(&response) {
            self.emit(events::SYSTEM_RESET, response.data.clone());
        }
        Ok(response)
    }

    pub async fn get_status(&self) -> Result<ApiResponse, ClientError> {
        let endpoint = &self.inner.config.endpoints.status;
        let response = self.call("get_status", Method::GET, endpoint, None).await?;
        self.emit(events::STATUS_RECEIVED, response.data.clone());
        Ok(response)
    }

    pub async fn get_sessions(&self) -> Result<ApiResponse, ClientError> {
        let endpoint = &self.inner.config.endpoints.sessions;
        self.call("get_sessions", Method::GET, endpoint, None).await
    }

    pub async fn trigger_hardware(&self, command: &str) -> Result<ApiResponse, ClientError> {
        let session_id = self.require_session()?;
        info!(command, "triggering hardware");

        let body = json!({ "session_id": session_id, "command": command });
        let endpoint = &self.inner.config.endpoints.trigger_hardware;
        let response = self.call("trigger_hardware", Method::POST, endpoint, Some(&body)).await?;
        if succeeded(&response) {
            self.emit(
                events::HARDWARE_TRIGGERED,
                json!({ "command": command, "result": response.data }),
            );
        }
        Ok(response)
    }

    /// Poll the status endpoint on the adaptive poller. The returned id
    /// removes the callback again.
    pub fn start_status_polling(&self) -> CallbackId {
        let weak = Arc::downgrade(&self.inner);
        self.inner.poller.start(move || {
            let weak = Weak::clone(&weak);
            async move {
                let Some(inner) = weak.upgrade() else {
                    return Ok(());
                };
                CommunicationManager::from_inner(inner).get_status().await?;
                Ok(())
            }
        })
    }

    pub fn stop_status_polling(&self) {
        self.inner.poller.stop();
    }

    /// Report what the kiosk is doing so polling speeds up or slows down.
    pub fn set_poll_state(&self, state: PollState) {
        self.inner.poller.set_state(state);
    }

    /// Connectivity came back: restart the stream if a session exists.
    pub async fn network_online(&self) {
        let was_offline = !self.inner.coordinator.is_online();
        self.inner.coordinator.set_online(true);
        info!("network online");
        self.emit(events::NETWORK_ONLINE, Value::Null);

        if was_offline {
            self.inner
                .notifications
                .show(templates::connection_restored(&self.inner.config.messages));
        }
        if let Err(e) = self.inner.stream.network_online().await {
            warn!(error = %e, "stream restart after network recovery failed");
        }
    }

    pub fn network_offline(&self) {
        if !self.inner.coordinator.is_online() {
            return;
        }
        self.inner.coordinator.set_online(false);
        warn!("network offline");
        self.emit(events::NETWORK_OFFLINE, Value::Null);
        self.inner
            .notifications
            .show(templates::network_offline(&self.inner.config.messages));
    }

    /// Forward a notification button press.
    pub fn handle_notification_action(&self, id: &str, action: &str) -> ActionOutcome {
        self.inner.notifications.handle_action(id, action)
    }

    pub fn stream_state(&self) -> StateSnapshot {
        let rx = self.inner.stream.subscribe();
        let snapshot = *rx.borrow();
        snapshot
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.inner.api.diagnostics()
    }

    pub fn connection_state(&self) -> ConnectionSnapshot {
        let (session_id, initialized) = {
            let state = self.state();
            (state.session_id.clone(), state.initialized)
        };
        ConnectionSnapshot {
            session_id,
            initialized,
            online: self.inner.coordinator.is_online(),
            state: self.inner.stream.state(),
            reconnect_attempts: self.inner.stream.reconnect_attempts(),
            diagnostics: self.diagnostics(),
        }
    }

    /// Close the stream, stop polling and background tasks and forget the
    /// session. Safe to call repeatedly.
    pub fn disconnect(&self) {
        let (had_session, was_initialized, monitor) = {
            let mut state = self.state();
            let had_session = state.session_id.take().is_some();
            state.session_kind = None;
            let was_initialized = std::mem::take(&mut state.initialized);
            (had_session, was_initialized, state.monitor.take())
        };
        if let Some(monitor) = monitor {
            monitor.cancel();
        }
        self.inner.poller.stop();

        let stream_was = self.inner.stream.state();
        self.inner.stream.disconnect();
        if !(had_session || was_initialized) {
            return;
        }
        info!("communication manager disconnected");
        // the stream reports its own disconnect when it was open
        if stream_was == ConnectionState::Disconnected {
            self.emit(events::DISCONNECTED, json!({ "reason": "client" }));
        }
    }

    /// Re-join the current session and reopen its stream. Used by the
    /// recovery coordinator; failures are not routed back through it.
    pub(crate) async fn rejoin(&self) -> anyhow::Result<()> {
        let (session_id, kind) = {
            let state = self.state();
            let Some(session_id) = state.session_id.clone() else {
                anyhow::bail!("no session to rejoin");
            };
            let kind = state
                .session_kind
                .clone()
                .unwrap_or_else(|| self.inner.config.session.kind.clone());
            (session_id, kind)
        };

        info!(session_id, "re-joining session");
        self.join(&session_id, &kind).await?;
        self.inner.stream.connect(&session_id).await?;
        Ok(())
    }

    async fn join(&self, session_id: &str, kind: &str) -> Result<(), ClientError> {
        let body = json!({ "session_id": session_id, "type": kind });
        let endpoint = &self.inner.config.endpoints.join_session;
        let response = self.inner.api.post(endpoint, &body).await.map_err(ClientError::from)?;
        ensure_success("join_session", &response)
    }

    /// Send a request and route a terminal failure through the coordinator.
    async fn call(
        &self,
        context: &'static str,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse, ClientError> {
        match self
            .inner
            .api
            .request(method, path, body, RequestOptions::default())
            .await
        {
            Ok(response) => Ok(response),
            Err(e) => Err(self.fail(context, e).await),
        }
    }

    async fn fail(&self, context: &'static str, error: RequestError) -> ClientError {
        let outcome = self
            .inner
            .coordinator
            .handle(&error.to_failure(), context, HandleOptions::default())
            .await;
        debug!(context, kind = %outcome.kind, recovered = outcome.recovered, "failure handled");
        ClientError::Request(error)
    }

    fn require_session(&self) -> Result<String, ClientError> {
        self.session_id().ok_or(ClientError::NoSession)
    }

    fn clear_session(&self, session_id: &str) {
        let mut state = self.state();
        if state.session_id.as_deref() == Some(session_id) {
            state.session_id = None;
            state.session_kind = None;
        }
    }

    fn emit(&self, event: &str, payload: Value) {
        self.inner.bus.emit(event, &payload);
    }

    fn state(&self) -> MutexGuard<'_, FacadeState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Toasts for stream outages the user should know about.
fn watch_stream(inner: &Arc<Inner>) {
    let weak = Arc::downgrade(inner);
    inner.bus.on(events::MAX_RECONNECT_ATTEMPTS_REACHED, move |_| {
        if let Some(inner) = weak.upgrade() {
            inner
                .notifications
                .show(templates::connection_lost(&inner.config.messages));
        }
        Ok(())
    });

    let weak = Arc::downgrade(inner);
    inner.bus.on(events::CONNECTION_RESTORED, move |_| {
        if let Some(inner) = weak.upgrade() {
            inner
                .notifications
                .show(templates::connection_restored(&inner.config.messages));
        }
        Ok(())
    });
}
