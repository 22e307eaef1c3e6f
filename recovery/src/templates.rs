//! Notification wording and timing per outcome.

use std::time::Duration;

use config_loader::Messages;
use data_types::{
    ErrorDescriptor, ErrorKind, Notification, NotificationKind,
    notification::actions::{CLOSE, OK, RELOAD, RETRY},
};

const TOAST: Duration = Duration::from_secs(5);
const SERVER_TOAST: Duration = Duration::from_secs(8);
const SUCCESS_TOAST: Duration = Duration::from_secs(3);

pub fn network_offline(messages: &Messages) -> Notification {
    Notification::new(
        NotificationKind::Error,
        "Network disconnected",
        &messages.network_offline,
    )
    .with_actions([RETRY, CLOSE])
}

pub fn session_restored(messages: &Messages) -> Notification {
    Notification::new(
        NotificationKind::Success,
        "Session restored",
        &messages.session_restored,
    )
    .with_duration(SUCCESS_TOAST)
}

pub fn session_expired(messages: &Messages) -> Notification {
    Notification::new(
        NotificationKind::Error,
        "Session expired",
        &messages.session_expired,
    )
    .with_actions([RELOAD, CLOSE])
}

pub fn connection_lost(messages: &Messages) -> Notification {
    Notification::new(
        NotificationKind::Error,
        "Connection lost",
        &messages.connection_lost,
    )
    .with_actions([RETRY, CLOSE])
}

pub fn connection_restored(messages: &Messages) -> Notification {
    Notification::new(
        NotificationKind::Success,
        "Connection restored",
        &messages.connection_restored,
    )
    .with_duration(SUCCESS_TOAST)
}

/// Template for every bucket except `Session`, whose notification depends
/// on the recovery result.
pub fn for_descriptor(descriptor: &ErrorDescriptor) -> Notification {
    let message = descriptor.user_message.as_str();
    match descriptor.kind {
        ErrorKind::Network => Notification::new(NotificationKind::Error, "Network error", message)
            .with_duration(TOAST)
            .with_actions([RETRY, CLOSE]),
        ErrorKind::Timeout => {
            Notification::new(NotificationKind::Warning, "Request timed out", message)
                .with_duration(TOAST)
                .with_actions([RETRY, CLOSE])
        }
        ErrorKind::Validation => Notification::new(NotificationKind::Warning, "Invalid input", message)
            .with_duration(TOAST)
            .with_actions([OK]),
        ErrorKind::Server => Notification::new(NotificationKind::Error, "Server error", message)
            .with_duration(SERVER_TOAST)
            .with_actions([RETRY, CLOSE]),
        ErrorKind::Session => Notification::new(NotificationKind::Error, "Session expired", message)
            .with_actions([RELOAD, CLOSE]),
        ErrorKind::Unknown => Notification::new(NotificationKind::Error, "Error", message)
            .with_duration(TOAST)
            .with_actions([OK]),
    }
}
