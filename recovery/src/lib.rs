//! Turns raw failures into error descriptors, runs the one recovery path
//! that exists (session re-join) and produces user notifications.

pub mod classify;
pub mod coordinator;
pub mod notifications;
pub mod policy;
pub mod stats;
pub mod templates;

pub use classify::{classify, classify_status};
pub use coordinator::{HandleOptions, HandleOutcome, RecoveryCoordinator, SessionRecovery};
pub use notifications::{ActionOutcome, NotificationCenter, STALE_NOTIFICATION_AGE};
pub use policy::{BucketPolicy, describe};
pub use stats::{ErrorRecord, ErrorStats};
