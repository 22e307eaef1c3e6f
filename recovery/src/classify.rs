use data_types::{ErrorKind, Failure};

/// Bucket implied by an HTTP status alone.
pub fn classify_status(status: u16) -> Option<ErrorKind> {
    match status {
        401 | 403 => Some(ErrorKind::Session),
        408 => Some(ErrorKind::Timeout),
        400..=499 => Some(ErrorKind::Validation),
        500..=599 => Some(ErrorKind::Server),
        _ => None,
    }
}

/// Assign a failure to exactly one bucket.
///
/// A known status wins. Otherwise the lowercased name and message are
/// matched against keyword lists in a fixed order, falling back to
/// `Server`. A failure with no text and no status is `Unknown`.
pub fn classify(failure: &Failure) -> ErrorKind {
    if let Some(kind) = failure.status.and_then(classify_status) {
        return kind;
    }

    let message = failure.message.to_lowercase();
    let name = failure.name.to_lowercase();
    if message.trim().is_empty() && (name.is_empty() || name == "error") {
        return ErrorKind::Unknown;
    }

    let mentions = |needles: &[&str]| needles.iter().any(|n| message.contains(n));

    if name.contains("network") || mentions(&["network", "fetch", "connection"]) {
        ErrorKind::Network
    } else if mentions(&["session", "unauthorized", "401"]) {
        ErrorKind::Session
    } else if name.contains("timeout") || mentions(&["timeout", "timed out", "aborted"]) {
        ErrorKind::Timeout
    } else if mentions(&["validation", "invalid", "400"]) {
        ErrorKind::Validation
    } else {
        // covers "500", "503", "server" and anything unrecognised
        ErrorKind::Server
    }
}
