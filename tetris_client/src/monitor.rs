//! Background task of an initialized manager: periodic
//! `performance_update` events plus retry-ledger and notification cleanup.

use std::{sync::Weak, time::Duration};

use event_bus::events;
use logger::{debug, warn};
use recovery::STALE_NOTIFICATION_AGE;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

use crate::manager::Inner;

/// Spawn the monitor; cancelling the token stops it. It also ends on its
/// own once the manager is dropped.
pub(crate) fn spawn(inner: Weak<Inner>) -> CancellationToken {
    let cancel = CancellationToken::new();
    tokio::spawn(run(inner, cancel.clone()));
    cancel
}

async fn run(inner: Weak<Inner>, cancel: CancellationToken) {
    let Some(diagnostics) = inner.upgrade().map(|i| i.config.diagnostics.clone()) else {
        return;
    };
    let period = diagnostics.interval().max(Duration::from_millis(1));
    let mut report = interval_at(Instant::now() + period, period);
    report.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut housekeeping = interval_at(Instant::now() + STALE_NOTIFICATION_AGE, STALE_NOTIFICATION_AGE);
    housekeeping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = report.tick(), if diagnostics.enabled => {
                let Some(inner) = inner.upgrade() else { return };
                match serde_json::to_value(inner.api.diagnostics()) {
                    Ok(payload) => {
                        inner.bus.emit(events::PERFORMANCE_UPDATE, &payload);
                    }
                    Err(e) => warn!(error = %e, "diagnostics not serializable"),
                }
            }
            _ = housekeeping.tick() => {
                let Some(inner) = inner.upgrade() else { return };
                let purged = inner.api.purge_retry_records();
                let dropped = inner.notifications.cleanup_stale(STALE_NOTIFICATION_AGE);
                debug!(purged, dropped, "housekeeping");
            }
        }
    }
}
