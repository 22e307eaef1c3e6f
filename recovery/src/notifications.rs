//! Active notification bookkeeping.
//!
//! The center never renders anything: `show` publishes the notification on
//! the bus and the UI decides how to present it. Non-sticky notifications
//! are dismissed by a timer on the current tokio runtime.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, Weak},
    time::Duration,
};

use data_types::{Notification, notification::actions};
use event_bus::{EventBus, events};
use logger::{debug, warn};
use serde_json::json;
use tokio::{runtime::Handle, task::JoinHandle, time::Instant};

/// Age after which `cleanup_stale` drops a notification regardless of its
/// own duration.
pub const STALE_NOTIFICATION_AGE: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Dismissed,
    RetryRequested,
    ReloadRequested,
    /// No active notification with that id.
    NotFound,
}

struct Active {
    notification: Notification,
    shown_at: Instant,
    expiry: Option<JoinHandle<()>>,
}

struct Inner {
    bus: EventBus,
    active: Mutex<HashMap<String, Active>>,
}

#[derive(Clone)]
pub struct NotificationCenter {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for NotificationCenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationCenter")
            .field("active", &self.len())
            .finish()
    }
}

impl NotificationCenter {
    pub fn new(bus: EventBus) -> Self {
        Self {
            inner: Arc::new(Inner {
                bus,
                active: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Publish a notification and track it until dismissed or expired.
    pub fn show(&self, notification: Notification) -> String {
        let id = notification.id.clone();
        let expiry = if notification.is_sticky() {
            None
        } else {
            self.schedule_expiry(id.clone(), notification.duration())
        };

        let payload = serde_json::to_value(&notification).unwrap_or_else(|_| json!({ "id": id }));
        debug!(id = %id, title = %notification.title, "showing notification");

        let previous = self.lock().insert(
            id.clone(),
            Active {
                notification,
                shown_at: Instant::now(),
                expiry,
            },
        );
        if let Some(Active { expiry: Some(handle), .. }) = previous {
            handle.abort();
        }

        self.inner.bus.emit(events::NOTIFICATION, &payload);
        id
    }

    fn schedule_expiry(&self, id: String, after: Duration) -> Option<JoinHandle<()>> {
        let Ok(runtime) = Handle::try_current() else {
            warn!(id = %id, "no runtime, notification will not expire on its own");
            return None;
        };
        let center: Weak<Inner> = Arc::downgrade(&self.inner);
        Some(runtime.spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(inner) = center.upgrade() {
                NotificationCenter { inner }.remove(&id, false);
            }
        }))
    }

    /// Returns whether the notification was active.
    pub fn dismiss(&self, id: &str) -> bool {
        self.remove(id, true)
    }

    fn remove(&self, id: &str, abort_timer: bool) -> bool {
        let Some(active) = self.lock().remove(id) else {
            return false;
        };
        if abort_timer {
            if let Some(handle) = active.expiry {
                handle.abort();
            }
        }
        self.inner
            .bus
            .emit(events::NOTIFICATION_DISMISSED, &json!({ "id": id }));
        true
    }

    /// Apply a button press on an active notification.
    pub fn handle_action(&self, id: &str, action: &str) -> ActionOutcome {
        if !self.lock().contains_key(id) {
            return ActionOutcome::NotFound;
        }

        match action {
            actions::RELOAD => {
                self.inner
                    .bus
                    .emit(events::RELOAD_REQUESTED, &json!({ "id": id }));
                ActionOutcome::ReloadRequested
            }
            actions::RETRY => {
                self.dismiss(id);
                self.inner
                    .bus
                    .emit(events::RETRY_REQUESTED, &json!({ "id": id }));
                ActionOutcome::RetryRequested
            }
            actions::CLOSE | actions::OK => {
                self.dismiss(id);
                ActionOutcome::Dismissed
            }
            other => {
                warn!(action = other, "unknown notification action");
                self.dismiss(id);
                ActionOutcome::Dismissed
            }
        }
    }

    /// Dismiss everything shown more than `max_age` ago.
    pub fn cleanup_stale(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let stale: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, active)| now.duration_since(active.shown_at) > max_age)
            .map(|(id, _)| id.clone())
            .collect();

        stale.iter().filter(|id| self.dismiss(id)).count()
    }

    pub fn active(&self) -> Vec<Notification> {
        self.lock()
            .values()
            .map(|active| active.notification.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Active>> {
        self.inner.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_types::NotificationKind;
    use std::sync::Mutex as StdMutex;

    fn capture(bus: &EventBus, event: &'static str) -> Arc<StdMutex<Vec<serde_json::Value>>> {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.on(event, move |v| {
            sink.lock().unwrap().push(v.clone());
            Ok(())
        });
        seen
    }

    #[tokio::test(start_paused = true)]
    async fn test_toast_expires() {
        let bus = EventBus::new();
        let dismissed = capture(&bus, events::NOTIFICATION_DISMISSED);
        let center = NotificationCenter::new(bus);

        let id = center.show(
            Notification::new(NotificationKind::Warning, "Request timed out", "retry later")
                .with_duration(Duration::from_secs(5)),
        );
        assert_eq!(center.len(), 1);

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(center.len(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(center.is_empty());
        assert_eq!(dismissed.lock().unwrap()[0]["id"], id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sticky_survives_until_dismissed() {
        let bus = EventBus::new();
        let shown = capture(&bus, events::NOTIFICATION);
        let center = NotificationCenter::new(bus);

        let id = center.show(Notification::new(NotificationKind::Error, "Session expired", "reload"));
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(center.len(), 1);
        assert_eq!(shown.lock().unwrap()[0]["title"], "Session expired");
        assert!(center.dismiss(&id));
        assert!(!center.dismiss(&id));
    }

    #[tokio::test]
    async fn test_actions() {
        let bus = EventBus::new();
        let retries = capture(&bus, events::RETRY_REQUESTED);
        let reloads = capture(&bus, events::RELOAD_REQUESTED);
        let center = NotificationCenter::new(bus);

        let retry = center.show(Notification::new(NotificationKind::Error, "Network", "offline"));
        let reload = center.show(Notification::new(NotificationKind::Error, "Session", "expired"));

        assert_eq!(center.handle_action(&retry, actions::RETRY), ActionOutcome::RetryRequested);
        assert_eq!(center.handle_action(&reload, actions::RELOAD), ActionOutcome::ReloadRequested);
        assert_eq!(center.handle_action(&retry, actions::CLOSE), ActionOutcome::NotFound);

        assert_eq!(retries.lock().unwrap().len(), 1);
        assert_eq!(reloads.lock().unwrap().len(), 1);
        // reload leaves the notification up until the page goes away
        assert_eq!(center.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_stale() {
        let center = NotificationCenter::new(EventBus::new());
        center.show(Notification::new(NotificationKind::Error, "old", "sticky"));
        tokio::time::sleep(Duration::from_secs(301)).await;
        center.show(Notification::new(NotificationKind::Error, "new", "sticky"));

        assert_eq!(center.cleanup_stale(STALE_NOTIFICATION_AGE), 1);
        assert_eq!(center.active()[0].title, "new");
    }
}
