//! # HTTP transport for a PDC-style store
//!
//! Implements [`Transport`] over reqwest. Resources map to
//! `<base_url>/<resource>/`; query objects become query strings (list values
//! repeat their key); bodies are sent as JSON.
//!
//! Answers are classified into [`RemoteError`] so the engine can tell
//! retryable failures (timeouts, connection errors, 5xx, 429) from permanent
//! ones. Unique-constraint rejections are reported as conflicts.

use std::time::Duration;

use async_trait::async_trait;
use depchain_core::contract::Transport;
use depchain_core::RemoteError;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpTransport {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| RemoteError::Permanent(format!("Failed to create HTTP client: {e}")))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        tracing::info!(
            base_url = %base_url,
            token_set = token.is_some(),
            "Initialized store HTTP transport"
        );
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    pub fn url(&self, resource: &str) -> String {
        format!("{}/{}/", self.base_url, resource.trim_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header("Authorization", format!("Token {token}")),
            None => request,
        }
    }

    async fn send(&self, resource: &str, request: RequestBuilder) -> Result<Value, RemoteError> {
        let response = self
            .authorize(request)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::error!(resource, error = %e, "Store request failed");
                classify_transport_error(&e)
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RemoteError::Transient(format!("Failed to read response body: {e}")))?;
        if !status.is_success() {
            tracing::warn!(resource, status = %status, body = %text, "Store answered with an error");
            return Err(classify_status(status, &text));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| RemoteError::Permanent(format!("Invalid JSON from {resource}: {e}")))
    }
}

/// Flattens a JSON query object into query-string pairs.
pub fn query_pairs(params: &Value) -> Vec<(String, String)> {
    fn scalar(value: &Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    let Some(object) = params.as_object() else {
        return Vec::new();
    };
    object
        .iter()
        .flat_map(|(key, value)| match value {
            Value::Array(items) => items
                .iter()
                .filter_map(scalar)
                .map(|v| (key.clone(), v))
                .collect::<Vec<_>>(),
            other => scalar(other).map(|v| (key.clone(), v)).into_iter().collect(),
        })
        .collect()
}

/// Maps an HTTP error answer onto a [`RemoteError`].
pub fn classify_status(status: StatusCode, body: &str) -> RemoteError {
    let reason = format!("{status}: {body}");
    let lowered = body.to_ascii_lowercase();
    match status {
        StatusCode::NOT_FOUND => RemoteError::NotFound(reason),
        StatusCode::CONFLICT => RemoteError::Conflict(reason),
        StatusCode::BAD_REQUEST
            if lowered.contains("already exists") || lowered.contains("unique") =>
        {
            RemoteError::Conflict(reason)
        }
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => RemoteError::Transient(reason),
        s if s.is_server_error() => RemoteError::Transient(reason),
        _ => RemoteError::Permanent(reason),
    }
}

fn classify_transport_error(error: &reqwest::Error) -> RemoteError {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        RemoteError::Transient(error.to_string())
    } else {
        RemoteError::Permanent(error.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, resource: &str, params: &Value) -> Result<Value, RemoteError> {
        let url = self.url(resource);
        tracing::debug!(url = %url, params = %params, "GET");
        let request = self.client.get(&url).query(&query_pairs(params));
        self.send(resource, request).await
    }

    async fn post(&self, resource: &str, body: &Value) -> Result<Value, RemoteError> {
        if self.token.is_none() {
            return Err(RemoteError::Permanent(format!(
                "refusing to write {resource} without an API token"
            )));
        }
        let url = self.url(resource);
        tracing::debug!(url = %url, body = %body, "POST");
        let request = self.client.post(&url).json(body);
        self.send(resource, request).await
    }
}
