//! HTTP plumbing shared by the provider clients.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};

use super::envelope::ErrorEnvelope;
use crate::{MimirError, Result};

/// Default per-request timeout for upstream calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Build the reqwest client used by a provider.
pub(crate) fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(crate::version::user_agent())
        .build()
        .map_err(|e| MimirError::Configuration(format!("failed to build HTTP client: {e}")))
}

/// Check response status and decode the body, mapping failures to the
/// crate taxonomy.
///
/// - 429 → `RateLimited` (with `Retry-After` seconds when present)
/// - 413 → `PayloadTooLarge`
/// - other non-success → classified from the error body, else `Api`
/// - success with an `error` object in the body → classified the same way
/// - success with a non-JSON body → `MalformedResponse`
pub(crate) async fn read_json(response: Response) -> Result<serde_json::Value> {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(MimirError::RateLimited { retry_after });
    }
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        return Err(MimirError::PayloadTooLarge(format!(
            "upstream rejected request ({status})"
        )));
    }

    let body = response.text().await?;

    if !status.is_success() {
        return Err(match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(env) => env.error.into_error(status.as_u16()),
            Err(_) => MimirError::Api {
                status: status.as_u16(),
                message: snippet(&body),
            },
        });
    }

    let value: serde_json::Value = serde_json::from_str(&body)
        .map_err(|e| MimirError::MalformedResponse(format!("invalid JSON body: {e}")))?;
    if value.get("error").is_some_and(|e| !e.is_null())
        && let Ok(env) = serde_json::from_value::<ErrorEnvelope>(value.clone())
    {
        return Err(env.error.into_error(status.as_u16()));
    }
    Ok(value)
}

/// First 200 characters of a body, for error messages.
fn snippet(body: &str) -> String {
    let mut s: String = body.chars().take(200).collect();
    if s.len() < body.len() {
        s.push('…');
    }
    s
}
