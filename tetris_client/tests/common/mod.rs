#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use serde_json::Value;
use streams::{EventChannel, EventTransport, Frame, TransportError};
use tetris_client::{CommunicationManager, EventBus, TetrisConfig};
use tokio::sync::mpsc;
use wiremock::MockServer;

/// Stream transport fed by the test instead of a server. Opens are refused
/// unless an accept is queued.
#[derive(Default)]
pub struct ScriptedTransport {
    accepts: Mutex<VecDeque<ScriptedChannel>>,
    opens: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn accept(&self) -> StreamFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        let alive = Arc::new(AtomicBool::new(true));
        self.accepts.lock().unwrap().push_back(ScriptedChannel {
            rx,
            alive: Arc::clone(&alive),
        });
        StreamFeed { tx, alive }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl EventTransport for ScriptedTransport {
    async fn open(&self, url: &str) -> Result<Box<dyn EventChannel>, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());
        let next = self.accepts.lock().unwrap().pop_front();
        match next {
            Some(channel) => Ok(Box::new(channel)),
            None => Err(TransportError::connect(url, "connection refused")),
        }
    }
}

struct ScriptedChannel {
    rx: mpsc::UnboundedReceiver<Frame>,
    alive: Arc<AtomicBool>,
}

#[async_trait::async_trait]
impl EventChannel for ScriptedChannel {
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        match self.rx.recv().await {
            Some(frame) => Some(Ok(frame)),
            None => {
                self.alive.store(false, Ordering::SeqCst);
                None
            }
        }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn close(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
        self.rx.close();
    }
}

pub struct StreamFeed {
    tx: mpsc::UnboundedSender<Frame>,
    alive: Arc<AtomicBool>,
}

impl StreamFeed {
    pub fn send_json(&self, value: Value) {
        let _ = self.tx.send(Frame::message(value.to_string()));
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

/// Defaults pointed at `server`, with delays short enough for real time.
pub fn config(server: &MockServer) -> TetrisConfig {
    let mut config = TetrisConfig::default();
    config.api.base_url = server.uri();
    config.api.retry_delay_ms = 10;
    config.api.max_retry_delay_ms = 40;
    config.stream.reconnect_delay_ms = 10;
    config.stream.max_reconnect_delay_ms = 40;
    config
}

pub fn manager(config: TetrisConfig, transport: &Arc<ScriptedTransport>, bus: &EventBus) -> CommunicationManager {
    CommunicationManager::builder(config)
        .with_bus(bus.clone())
        .with_transport(transport.clone())
        .build()
        .unwrap()
}

pub type Seen = Arc<Mutex<Vec<(String, Value)>>>;

pub fn record(bus: &EventBus, names: &[&'static str]) -> Seen {
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

pub fn payloads(seen: &Seen, name: &str) -> Vec<Value> {
    seen.lock()
        .unwrap()
        .iter()
        .filter(|(n, _)| n == name)
        .map(|(_, v)| v.clone())
        .collect()
}

/// Poll `check` every few milliseconds for up to two seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}
