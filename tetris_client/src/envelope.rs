//! The `{success, error?, data?}` envelope every TETRIS endpoint answers with.

use http_client::ApiResponse;
use serde_json::Value;

use crate::ClientError;

const DEFAULT_REJECTION: &str = "request rejected";

/// `true` only for an explicit `"success": true`.
pub fn succeeded(response: &ApiResponse) -> bool {
    response
        .data
        .get("success")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

pub fn rejection_message(response: &ApiResponse) -> String {
    response
        .data
        .get("error")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .unwrap_or(DEFAULT_REJECTION)
        .to_string()
}

/// Turn a `{"success": false}` answer into [`ClientError::Rejected`].
pub fn ensure_success(operation: &'static str, response: &ApiResponse) -> Result<(), ClientError> {
    if succeeded(response) {
        Ok(())
    } else {
        Err(ClientError::rejected(operation, rejection_message(response)))
    }
}
