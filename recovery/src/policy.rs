use config_loader::Messages;
use data_types::{ErrorDescriptor, ErrorKind, Failure, Severity};

use crate::classify::classify;

/// Fixed handling rules per bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketPolicy {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub retryable: bool,
    pub max_retries: u32,
    pub backoff_multiplier: f64,
    /// Only a page reload gets the user out of this state.
    pub requires_reload: bool,
}

impl BucketPolicy {
    pub const fn for_kind(kind: ErrorKind) -> Self {
        let (severity, retryable, max_retries, backoff_multiplier, requires_reload) = match kind {
            ErrorKind::Network => (Severity::High, true, 3, 2.0, false),
            ErrorKind::Session => (Severity::Medium, false, 0, 1.0, true),
            ErrorKind::Validation => (Severity::Low, false, 0, 1.0, false),
            ErrorKind::Server => (Severity::High, true, 2, 1.5, false),
            ErrorKind::Timeout => (Severity::Medium, true, 2, 2.0, false),
            ErrorKind::Unknown => (Severity::Medium, false, 0, 1.0, false),
        };
        Self {
            kind,
            severity,
            retryable,
            max_retries,
            backoff_multiplier,
            requires_reload,
        }
    }

    pub fn user_message<'a>(&self, messages: &'a Messages) -> &'a str {
        match self.kind {
            ErrorKind::Network => &messages.network,
            ErrorKind::Session => &messages.session_expired,
            ErrorKind::Validation => &messages.validation_error,
            ErrorKind::Server => &messages.server_error,
            ErrorKind::Timeout => &messages.timeout,
            ErrorKind::Unknown => &messages.generic,
        }
    }
}

/// Classify a failure and attach its bucket policy.
pub fn describe(failure: &Failure, messages: &Messages) -> ErrorDescriptor {
    let policy = BucketPolicy::for_kind(classify(failure));
    ErrorDescriptor {
        kind: policy.kind,
        severity: policy.severity,
        retryable: policy.retryable,
        user_message: policy.user_message(messages).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_table() {
        let network = BucketPolicy::for_kind(ErrorKind::Network);
        assert_eq!((network.severity, network.retryable, network.max_retries), (Severity::High, true, 3));
        assert_eq!(network.backoff_multiplier, 2.0);

        let server = BucketPolicy::for_kind(ErrorKind::Server);
        assert_eq!((server.max_retries, server.backoff_multiplier), (2, 1.5));

        let session = BucketPolicy::for_kind(ErrorKind::Session);
        assert!(!session.retryable);
        assert!(session.requires_reload);

        for kind in [ErrorKind::Validation, ErrorKind::Unknown] {
            assert!(!BucketPolicy::for_kind(kind).retryable, "{kind}");
        }
    }

    #[test]
    fn test_describe_uses_configured_copy() {
        let mut messages = Messages::default();
        messages.timeout = "too slow".to_string();

        let descriptor = describe(&Failure::new("TimeoutError", "request timed out"), &messages);

        assert_eq!(descriptor.kind, ErrorKind::Timeout);
        assert_eq!(descriptor.severity, Severity::Medium);
        assert!(descriptor.retryable);
        assert_eq!(descriptor.user_message, "too slow");
    }
}
