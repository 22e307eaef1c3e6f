//! Frame routing: which bus event a frame is published under.

use event_bus::events;
use serde_json::Value;

use crate::{
    constants::{DEFAULT_SSE_EVENT, HANDSHAKE_EVENT, SERVER_ERROR_EVENT},
    transport::Frame,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Publish `payload` under `event`.
    Publish { event: String, payload: Value },
    /// Handshake ack, not forwarded.
    Ack,
    /// Keep-alive with no data.
    Ignore,
    /// `data` was not JSON.
    Malformed { message: String },
}

/// Decide where a frame goes.
///
/// The key is the JSON body's `event` field, else a named SSE event, else
/// `progress_update`.
pub fn route(frame: &Frame) -> Route {
    if frame.data.trim().is_empty() {
        return Route::Ignore;
    }

    let payload: Value = match serde_json::from_str(&frame.data) {
        Ok(payload) => payload,
        Err(e) => {
            return Route::Malformed {
                message: e.to_string(),
            };
        }
    };

    let key = payload
        .get("event")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .or_else(|| {
            (!frame.event.is_empty() && frame.event != DEFAULT_SSE_EVENT).then(|| frame.event.clone())
        })
        .unwrap_or_else(|| events::PROGRESS_UPDATE.to_string());

    match key.as_str() {
        HANDSHAKE_EVENT => Route::Ack,
        SERVER_ERROR_EVENT => Route::Publish {
            event: events::SSE_ERROR.to_string(),
            payload,
        },
        _ => Route::Publish { event: key, payload },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn publish_key(frame: Frame) -> String {
        match route(&frame) {
            Route::Publish { event, .. } => event,
            other => panic!("expected publish, got {other:?}"),
        }
    }

    #[rstest]
    #[case(Frame::message(r#"{"step": 1, "progress": 40}"#), "progress_update")]
    #[case(Frame::message(r#"{"event": "hardware_start"}"#), "hardware_start")]
    #[case(Frame::new("upload_complete", r#"{"filename": "a.jpg"}"#), "upload_complete")]
    #[case(Frame::new("upload_complete", r#"{"event": "hardware_complete"}"#), "hardware_complete")]
    #[case(Frame::message(r#"{"event": "error", "message": "camera offline"}"#), "sse_error")]
    fn test_routing_key(#[case] frame: Frame, #[case] expected: &str) {
        assert_eq!(publish_key(frame), expected);
    }

    #[test]
    fn test_handshake_is_swallowed() {
        assert_eq!(route(&Frame::message(r#"{"event": "connected"}"#)), Route::Ack);
        assert_eq!(route(&Frame::new("connected", r#"{"session_id": "s"}"#)), Route::Ack);
    }

    #[test]
    fn test_malformed_and_empty() {
        assert!(matches!(route(&Frame::message("{not json")), Route::Malformed { .. }));
        assert_eq!(route(&Frame::message("  ")), Route::Ignore);
    }

    #[test]
    fn test_payload_passed_through() {
        let Route::Publish { payload, .. } = route(&Frame::message(r#"{"step": 3}"#)) else {
            panic!("expected publish");
        };
        assert_eq!(payload, json!({"step": 3}));
    }
}
