use std::collections::BTreeMap;

use chrono::{DateTime, Timelike, Utc};
use data_types::{ErrorKind, Failure};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub context: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Counters kept by the recovery coordinator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorStats {
    pub total: u64,
    pub by_kind: BTreeMap<ErrorKind, u64>,
    /// Keyed by UTC hour of day.
    pub by_hour: BTreeMap<u32, u64>,
    pub last_error: Option<ErrorRecord>,
}

impl ErrorStats {
    pub fn record(&mut self, kind: ErrorKind, context: &str, failure: &Failure) {
        self.record_at(kind, context, failure, Utc::now());
    }

    pub(crate) fn record_at(&mut self, kind: ErrorKind, context: &str, failure: &Failure, at: DateTime<Utc>) {
        self.total += 1;
        *self.by_kind.entry(kind).or_default() += 1;
        *self.by_hour.entry(at.hour()).or_default() += 1;
        self.last_error = Some(ErrorRecord {
            kind,
            context: context.to_string(),
            message: failure.message.clone(),
            at,
        });
    }

    pub fn count(&self, kind: ErrorKind) -> u64 {
        self.by_kind.get(&kind).copied().unwrap_or_default()
    }
}
