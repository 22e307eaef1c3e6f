#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use config_loader::TetrisConfig;
use data_types::{Backoff, ConnectionState};
use event_bus::EventBus;
use serde_json::Value;
use streams::{EventChannel, EventTransport, Frame, StateSnapshot, StreamManager, StreamSettings, TransportError};
use tokio::sync::{mpsc, watch};

enum Script {
    Refuse,
    Accept(MockChannel),
}

/// Transport that plays back a queue of connection outcomes. Once the
/// queue is empty every open is refused.
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<Script>>,
    opens: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refuse(&self, times: usize) {
        let mut script = self.script.lock().unwrap();
        for _ in 0..times {
            script.push_back(Script::Refuse);
        }
    }

    /// Queue a successful open and return the server side of it.
    pub fn accept(&self) -> ServerHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let alive = Arc::new(AtomicBool::new(true));
        self.script.lock().unwrap().push_back(Script::Accept(MockChannel {
            rx,
            alive: Arc::clone(&alive),
        }));
        ServerHandle { tx, alive }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl EventTransport for MockTransport {
    async fn open(&self, url: &str) -> Result<Box<dyn EventChannel>, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Script::Accept(channel)) => Ok(Box::new(channel)),
            Some(Script::Refuse) | None => Err(TransportError::connect(url, "connection refused")),
        }
    }
}

struct MockChannel {
    rx: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
    alive: Arc<AtomicBool>,
}

#[async_trait::async_trait]
impl EventChannel for MockChannel {
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        let next = self.rx.recv().await;
        if next.is_none() {
            self.alive.store(false, Ordering::SeqCst);
        }
        next
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn close(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
        self.rx.close();
    }
}

/// Server end of an accepted mock connection.
pub struct ServerHandle {
    tx: mpsc::UnboundedSender<Result<Frame, TransportError>>,
    alive: Arc<AtomicBool>,
}

impl ServerHandle {
    pub fn send(&self, frame: Frame) {
        let _ = self.tx.send(Ok(frame));
    }

    pub fn send_json(&self, value: Value) {
        self.send(Frame::message(value.to_string()));
    }

    pub fn send_error(&self, message: &str) {
        let _ = self.tx.send(Err(TransportError::stream(message.to_string())));
    }

    /// Mark the connection dead without closing it, as a half-open socket.
    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn close(self) {
        drop(self.tx);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

pub fn settings(base_ms: u64, attempts: u32) -> StreamSettings {
    StreamSettings {
        url: "http://kiosk.test/desktop/api/progress_stream".to_string(),
        reconnect: Backoff::new(Duration::from_millis(base_ms), Duration::from_millis(30_000), attempts),
        heartbeat_interval: Duration::from_secs(30),
        connection_timeout: Duration::from_secs(15),
    }
}

pub fn manager(transport: &Arc<MockTransport>, bus: &EventBus, settings: StreamSettings) -> StreamManager {
    StreamManager::new(transport.clone(), bus.clone(), settings)
}

pub fn default_settings() -> StreamSettings {
    StreamSettings::from_config(&TetrisConfig::default())
}

/// Every payload emitted under `names`, in order.
pub fn record(bus: &EventBus, names: &[&'static str]) -> Arc<Mutex<Vec<(String, Value)>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    for &name in names {
        let sink = Arc::clone(&seen);
        bus.on(name, move |v| {
            sink.lock().unwrap().push((name.to_string(), v.clone()));
            Ok(())
        });
    }
    seen
}

pub fn count(seen: &Arc<Mutex<Vec<(String, Value)>>>, name: &str) -> usize {
    seen.lock().unwrap().iter().filter(|(n, _)| n == name).count()
}

pub async fn wait_for_state(rx: &mut watch::Receiver<StateSnapshot>, state: ConnectionState) -> StateSnapshot {
    let snapshot = *rx.wait_for(|s| s.state == state).await.unwrap();
    snapshot
}
