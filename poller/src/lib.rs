//! Interval polling whose pace follows what the system is doing.
//!
//! The poller is the fallback for status that is not pushed over the event
//! stream. Its interval is picked from [`PollingIntervals`] by the current
//! [`PollState`]; a round runs every registered callback concurrently and
//! the next wait starts when the slowest one finishes.

use std::{
    fmt,
    future::Future,
    panic::AssertUnwindSafe,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use config_loader::PollingIntervals;
use futures::{
    FutureExt,
    future::{BoxFuture, join_all},
};
use logger::{debug, info, warn};
use tokio::{sync::watch, task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;

/// Error a poll callback may return. It only widens the interval.
pub type PollError = anyhow::Error;

pub type PollFuture = BoxFuture<'static, Result<(), PollError>>;

type Callback = Arc<dyn Fn() -> PollFuture + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PollState {
    /// Work in progress, poll fast.
    Active,
    #[default]
    Idle,
    /// Last round failed, back off.
    Error,
}

impl PollState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollState::Active => "ACTIVE",
            PollState::Idle => "IDLE",
            PollState::Error => "ERROR",
        }
    }

    pub fn interval(&self, intervals: &PollingIntervals) -> Duration {
        let ms = match self {
            PollState::Active => intervals.active_ms,
            PollState::Idle => intervals.idle_ms,
            PollState::Error => intervals.error_ms,
        };
        Duration::from_millis(ms)
    }
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(u64);

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct Inner {
    intervals: PollingIntervals,
    callbacks: Mutex<Vec<(CallbackId, Callback)>>,
    next_id: AtomicU64,
    state_tx: watch::Sender<PollState>,
    running: Mutex<Option<Running>>,
}

/// Cheap to clone; clones drive the same loop.
#[derive(Clone)]
pub struct AdaptivePoller {
    inner: Arc<Inner>,
}

impl fmt::Debug for AdaptivePoller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptivePoller")
            .field("state", &self.state())
            .field("callbacks", &self.callback_count())
            .field("running", &self.is_running())
            .finish()
    }
}

impl AdaptivePoller {
    pub fn new(intervals: PollingIntervals) -> Self {
        let (state_tx, _) = watch::channel(PollState::default());
        Self {
            inner: Arc::new(Inner {
                intervals,
                callbacks: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                state_tx,
                running: Mutex::new(None),
            }),
        }
    }

    /// Register `callback` and start the loop unless it already runs.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start<F, Fut>(&self, callback: F) -> CallbackId
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), PollError>> + Send + 'static,
    {
        let id = self.add_callback(callback);
        self.ensure_running();
        id
    }

    /// Register `callback` without touching the loop.
    pub fn add_callback<F, Fut>(&self, callback: F) -> CallbackId
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), PollError>> + Send + 'static,
    {
        let id = CallbackId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let callback: Callback = Arc::new(move || callback().boxed());
        lock(&self.inner.callbacks).push((id, callback));
        id
    }

    pub fn remove_callback(&self, id: CallbackId) -> bool {
        let mut callbacks = lock(&self.inner.callbacks);
        let before = callbacks.len();
        callbacks.retain(|(cid, _)| *cid != id);
        callbacks.len() != before
    }

    pub fn callback_count(&self) -> usize {
        lock(&self.inner.callbacks).len()
    }

    /// Stop the loop. Registered callbacks are kept for a later `start`.
    pub fn stop(&self) {
        if let Some(running) = lock(&self.inner.running).take() {
            running.cancel.cancel();
            running.handle.abort();
            info!("poller stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner.running)
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    pub fn state(&self) -> PollState {
        *self.inner.state_tx.borrow()
    }

    pub fn interval(&self) -> Duration {
        self.state().interval(&self.inner.intervals)
    }

    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.inner.state_tx.subscribe()
    }

    /// Switch state. A pending wait is restarted with the new interval if
    /// the interval changes; time already waited is not credited.
    pub fn set_state(&self, state: PollState) {
        let changed = self.inner.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
        if changed {
            debug!(%state, "poll state changed");
        }
    }

    fn ensure_running(&self) {
        let mut running = lock(&self.inner.running);
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return;
        }

        let cancel = CancellationToken::new();
        let state_rx = self.inner.state_tx.subscribe();
        let handle = tokio::spawn(run(Arc::clone(&self.inner), state_rx, cancel.clone()));
        *running = Some(Running { cancel, handle });
        info!(state = %self.state(), "poller started");
    }
}

async fn run(inner: Arc<Inner>, mut state_rx: watch::Receiver<PollState>, cancel: CancellationToken) {
    let mut delay = state_rx.borrow_and_update().interval(&inner.intervals);
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            changed = state_rx.changed() => {
                if changed.is_err() {
                    return;
                }
                let next = state_rx.borrow_and_update().interval(&inner.intervals);
                if next != delay {
                    debug!(?delay, ?next, "rescheduling poll");
                    delay = next;
                    sleep.as_mut().reset(Instant::now() + delay);
                }
            }
            _ = &mut sleep => {
                let failures = tokio::select! {
                    _ = cancel.cancelled() => return,
                    failures = poll_round(&inner) => failures,
                };
                if failures > 0 {
                    inner.state_tx.send_if_modified(|state| {
                        let changed = *state != PollState::Error;
                        *state = PollState::Error;
                        changed
                    });
                }
                delay = state_rx.borrow_and_update().interval(&inner.intervals);
                sleep.as_mut().reset(Instant::now() + delay);
            }
        }
    }
}

/// Run every callback concurrently and count the failed ones.
async fn poll_round(inner: &Inner) -> usize {
    let callbacks: Vec<Callback> = lock(&inner.callbacks)
        .iter()
        .map(|(_, cb)| Arc::clone(cb))
        .collect();
    if callbacks.is_empty() {
        return 0;
    }

    let results = join_all(
        callbacks
            .iter()
            .map(|cb| AssertUnwindSafe(cb()).catch_unwind()),
    )
    .await;

    results
        .into_iter()
        .filter(|result| match result {
            Ok(Ok(())) => false,
            Ok(Err(e)) => {
                warn!(error = %e, "poll callback failed");
                true
            }
            Err(_) => {
                warn!("poll callback panicked");
                true
            }
        })
        .count()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(PollState::Active, 2_000)]
    #[case(PollState::Idle, 10_000)]
    #[case(PollState::Error, 30_000)]
    fn test_interval_by_state(#[case] state: PollState, #[case] ms: u64) {
        assert_eq!(state.interval(&PollingIntervals::default()), Duration::from_millis(ms));
    }

    #[test]
    fn test_starts_idle() {
        let poller = AdaptivePoller::new(PollingIntervals::default());
        assert_eq!(poller.state(), PollState::Idle);
        assert!(!poller.is_running());
    }

    #[test]
    fn test_remove_callback() {
        let poller = AdaptivePoller::new(PollingIntervals::default());
        let id = poller.add_callback(|| async { Ok(()) });
        poller.add_callback(|| async { Ok(()) });

        assert!(poller.remove_callback(id));
        assert!(!poller.remove_callback(id));
        assert_eq!(poller.callback_count(), 1);
    }
}
