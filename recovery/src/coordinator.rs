use std::sync::{
    Arc, Mutex, RwLock,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use config_loader::Messages;
use data_types::{ErrorKind, Failure, Notification};
use logger::{error, info, warn};

use crate::{
    notifications::NotificationCenter,
    policy::{BucketPolicy, describe},
    stats::ErrorStats,
    templates,
};

/// Re-establishes a server session after a SESSION failure.
#[async_trait]
pub trait SessionRecovery: Send + Sync {
    async fn rejoin(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleOptions {
    /// Publish the resulting notification through the notification center.
    pub notify: bool,
    /// Run session recovery for SESSION failures.
    pub recover_session: bool,
}

impl Default for HandleOptions {
    fn default() -> Self {
        Self {
            notify: true,
            recover_session: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HandleOutcome {
    pub handled: bool,
    pub kind: ErrorKind,
    pub retryable: bool,
    /// Session re-join ran and succeeded.
    pub recovered: bool,
    pub notification: Option<Notification>,
}

/// Central failure handler shared by the HTTP client, stream and facade.
pub struct RecoveryCoordinator {
    messages: Messages,
    session: RwLock<Option<Arc<dyn SessionRecovery>>>,
    notifications: Option<NotificationCenter>,
    online: AtomicBool,
    recovering: AtomicBool,
    stats: Mutex<ErrorStats>,
}

impl std::fmt::Debug for RecoveryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryCoordinator")
            .field("online", &self.is_online())
            .field("recovering", &self.recovering.load(Ordering::Relaxed))
            .finish()
    }
}

/// Clears the recovery flag even when the handling future is dropped.
struct RecoveryGuard<'a>(&'a AtomicBool);

impl Drop for RecoveryGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RecoveryCoordinator {
    pub fn new(messages: Messages) -> Self {
        Self {
            messages,
            session: RwLock::new(None),
            notifications: None,
            online: AtomicBool::new(true),
            recovering: AtomicBool::new(false),
            stats: Mutex::new(ErrorStats::default()),
        }
    }

    pub fn with_session_recovery(self, session: Arc<dyn SessionRecovery>) -> Self {
        self.set_session_recovery(session);
        self
    }

    pub fn with_notifications(mut self, center: NotificationCenter) -> Self {
        self.notifications = Some(center);
        self
    }

    /// Install the re-join hook after construction, for owners that need
    /// the coordinator before they can build their recovery handle.
    pub fn set_session_recovery(&self, session: Arc<dyn SessionRecovery>) {
        *self.session.write().unwrap_or_else(|e| e.into_inner()) = Some(session);
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Relaxed);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }

    pub fn is_recovering(&self) -> bool {
        self.recovering.load(Ordering::Acquire)
    }

    pub fn messages(&self) -> &Messages {
        &self.messages
    }

    pub fn notifications(&self) -> Option<&NotificationCenter> {
        self.notifications.as_ref()
    }

    pub fn stats(&self) -> ErrorStats {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Classify `failure`, record it, run recovery where one exists and
    /// produce the notification for the user.
    pub async fn handle(&self, failure: &Failure, context: &str, options: HandleOptions) -> HandleOutcome {
        let descriptor = describe(failure, &self.messages);
        let policy = BucketPolicy::for_kind(descriptor.kind);
        self.stats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(descriptor.kind, context, failure);

        warn!(
            context,
            kind = %descriptor.kind,
            severity = ?descriptor.severity,
            error = %failure,
            "handling failure"
        );

        let mut outcome = HandleOutcome {
            handled: true,
            kind: descriptor.kind,
            retryable: policy.retryable,
            recovered: false,
            notification: None,
        };

        let notification = match descriptor.kind {
            ErrorKind::Network if !self.is_online() => Some(templates::network_offline(&self.messages)),
            ErrorKind::Session if options.recover_session => match self.recover_session(context).await {
                // a recovery is already running and will report its own result
                None => None,
                Some(true) => {
                    outcome.recovered = true;
                    Some(templates::session_restored(&self.messages))
                }
                Some(false) => Some(templates::session_expired(&self.messages)),
            },
            _ => Some(templates::for_descriptor(&descriptor)),
        };

        if options.notify {
            if let (Some(center), Some(notification)) = (&self.notifications, &notification) {
                center.show(notification.clone());
            }
        }
        outcome.notification = notification;
        outcome
    }

    /// `None` when another recovery holds the guard.
    async fn recover_session(&self, context: &str) -> Option<bool> {
        let session = self.session.read().unwrap_or_else(|e| e.into_inner()).clone();
        let Some(session) = session else {
            return Some(false);
        };
        if self
            .recovering
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!(context, "session recovery already in progress");
            return None;
        }
        let _guard = RecoveryGuard(&self.recovering);

        info!(context, "attempting session re-join");
        match session.rejoin().await {
            Ok(()) => {
                info!("session recovered");
                Some(true)
            }
            Err(e) => {
                error!(error = %e, "session recovery failed");
                Some(false)
            }
        }
    }
}
