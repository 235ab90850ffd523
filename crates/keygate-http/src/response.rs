//! Response checking for `reqwest`
//!
//! Bridges raw HTTP responses into the classified error model so that every
//! caller turns a non-success status into a [`CallError`] the same way.

use crate::classify::classify;
use crate::error::CallError;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Pass success responses through, classify everything else
///
/// A body that cannot be read is treated as absent.
///
/// # Errors
///
/// Returns [`CallError::Status`] for any non-2xx status.
pub async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, CallError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = match response.text().await {
        Ok(body) => Some(body),
        Err(e) => {
            debug!(status = %status, error = %e, "Failed to read error response body");
            None
        }
    };

    Err(CallError::Status(classify(status.as_u16(), body.as_deref())))
}

/// GET `url` and decode a JSON success body
///
/// # Errors
///
/// Returns [`CallError::Transport`] when no response arrives,
/// [`CallError::Status`] for non-success statuses and [`CallError::Decode`]
/// when the body is not the expected JSON.
pub async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
) -> Result<T, CallError> {
    let response = client.get(url).send().await?;
    let response = check_response(response).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| CallError::Decode(e.to_string()))
}
