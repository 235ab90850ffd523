//! HTTP failure classification
//!
//! Turns a status code and response body into a [`ClassifiedError`]. The
//! mapping is pure: the same `(status, body)` pair always yields the same
//! result, and nothing here performs I/O.
//!
//! Authorization servers disagree on how they shape error bodies, so the
//! message is extracted by trying a fixed list of field strategies in order:
//!
//! 1. `message`
//! 2. `error` (a string, or an object with its own `message`)
//! 3. `error_description`
//! 4. `detail`
//! 5. the whole JSON document rendered as text
//!
//! Bodies that are not JSON are used verbatim.

use crate::error::{ClassifiedError, ErrorKind};
use serde_json::Value;

/// Message used when the server sent no body at all
pub const NO_BODY_MESSAGE: &str = "no error details provided by the server";

type MessageStrategy = fn(&Value) -> Option<String>;

const MESSAGE_STRATEGIES: &[MessageStrategy] = &[
    message_field,
    error_field,
    error_description_field,
    detail_field,
];

/// Classify a failed response
///
/// An empty or whitespace-only body counts as no body.
///
/// # Example
///
/// ```rust
/// use keygate_http::{ErrorKind, classify};
///
/// let err = classify(404, Some(r#"{"error":"Realm does not exist"}"#));
/// assert_eq!(err.kind, ErrorKind::RealmNotFound);
/// assert_eq!(err.message, "Realm does not exist");
/// ```
pub fn classify(status: u16, body: Option<&str>) -> ClassifiedError {
    let raw_body = body.filter(|b| !b.trim().is_empty());
    let message = extract_message(raw_body);
    let kind = kind_for(status, &message);

    ClassifiedError {
        kind,
        http_status: status,
        message,
        raw_body: raw_body.map(str::to_owned),
    }
}

/// Extract a human-readable message from an error body
pub fn extract_message(body: Option<&str>) -> String {
    let Some(body) = body.filter(|b| !b.trim().is_empty()) else {
        return NO_BODY_MESSAGE.to_string();
    };

    match serde_json::from_str::<Value>(body) {
        Ok(Value::String(text)) => text,
        Ok(value) => MESSAGE_STRATEGIES
            .iter()
            .find_map(|strategy| strategy(&value))
            .unwrap_or_else(|| value.to_string()),
        Err(_) => body.to_string(),
    }
}

fn kind_for(status: u16, message: &str) -> ErrorKind {
    match status {
        401 => ErrorKind::CredentialsInvalid,
        404 if message.to_lowercase().contains("realm") => ErrorKind::RealmNotFound,
        404 => ErrorKind::NotFound,
        409 => ErrorKind::Conflict,
        400 => ErrorKind::InvalidOperation,
        403 => ErrorKind::Forbidden,
        503 => ErrorKind::ServiceUnavailable,
        500 | 502 | 504 => ErrorKind::ServerError,
        other => ErrorKind::Unclassified(other),
    }
}

fn string_field(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_owned)
}

fn message_field(value: &Value) -> Option<String> {
    string_field(value, "message")
}

fn error_field(value: &Value) -> Option<String> {
    match value.get("error")? {
        Value::String(s) => Some(s.clone()),
        Value::Object(nested) => nested
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_owned),
        _ => None,
    }
}

fn error_description_field(value: &Value) -> Option<String> {
    string_field(value, "error_description")
}

fn detail_field(value: &Value) -> Option<String> {
    string_field(value, "detail")
}
