//! Shared HTTP plumbing for strategies that consult remote systems.

use std::time::Duration;

use once_cell::sync::OnceCell;
use reqwest::{Client, StatusCode};
use serde::{Serialize, de::DeserializeOwned};

use super::AccessStrategyError;

/// Outbound request timeout when a strategy does not configure one.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

pub(crate) fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

static CLIENT: OnceCell<Client> = OnceCell::new();

/// Process-wide client; built on first use and reused for connection pooling.
fn client() -> Result<&'static Client, AccessStrategyError> {
    CLIENT.get_or_try_init(|| {
        Client::builder()
            .user_agent(concat!("portcullis/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AccessStrategyError::configuration(format!("Failed to build HTTP client: {e}")))
    })
}

/// Join a base URL and a path without doubling or dropping slashes.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// POST `body` as JSON and decode a JSON response.
///
/// Non-2xx statuses and undecodable bodies are errors.
pub(crate) async fn post_json<B, R>(
    url: &str,
    token: Option<&str>,
    timeout_ms: u64,
    body: &B,
) -> Result<R, AccessStrategyError>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let mut req_builder = client()?
        .post(url)
        .header("Content-Type", "application/json")
        .header("Accept", "application/json")
        .timeout(Duration::from_millis(timeout_ms))
        .json(body);

    if let Some(token) = token.filter(|t| !t.is_empty()) {
        req_builder = req_builder.header("Authorization", format!("Bearer {}", token));
    }

    let response = req_builder
        .send()
        .await
        .map_err(|e| AccessStrategyError::from_reqwest(url, timeout_ms, e))?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(AccessStrategyError::invalid_response(
            url,
            format!("API returned {}: {}", status, error_text),
        ));
    }

    response.json::<R>().await.map_err(|e| {
        AccessStrategyError::invalid_response(url, format!("Failed to parse response: {}", e))
    })
}

/// GET `url` with `query` parameters and return the response status.
pub(crate) async fn get_status(
    url: &str,
    query: &[(&str, &str)],
    timeout_ms: u64,
) -> Result<StatusCode, AccessStrategyError> {
    let url = url::Url::parse_with_params(url, query)
        .map_err(|e| AccessStrategyError::configuration(format!("Invalid endpoint URL '{url}': {e}")))?;

    let response = client()?
        .get(url.clone())
        .timeout(Duration::from_millis(timeout_ms))
        .send()
        .await
        .map_err(|e| AccessStrategyError::from_reqwest(url.as_str(), timeout_ms, e))?;

    Ok(response.status())
}
