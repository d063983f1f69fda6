//! Outbound side-effect adapter over reqwest.
//!
//! Implements the `SideEffects` port from `flowline-core`. Every call is
//! classified for the orchestrator's retry loop: connection failures,
//! timeouts, and 5xx responses are transient; malformed requests and
//! missing configuration are config errors and never retried. Non-5xx
//! responses (including 4xx) are returned as data so workflows can branch
//! on the status themselves.

use std::collections::HashMap;
use std::time::Duration;

use flowline_core::engine::effects::SideEffects;
use flowline_core::engine::registry::ExecutorError;
use futures_util::future::BoxFuture;
use serde_json::{json, Value};

/// Per-request wall-clock budget. The orchestrator's own node timeout is
/// longer; this bound exists so a stuck connection surfaces as a transient
/// error and gets retried.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Endpoints for the effects that go through platform services instead of
/// arbitrary URLs.
#[derive(Debug, Clone, Default)]
pub struct EffectsConfig {
    /// Text-generation service endpoint (POST, JSON body).
    pub text_endpoint: Option<String>,
    /// Message-delivery service endpoint (POST, JSON body).
    pub message_endpoint: Option<String>,
}

impl EffectsConfig {
    /// Read endpoints from `FLOWLINE_TEXT_ENDPOINT` / `FLOWLINE_MESSAGE_ENDPOINT`.
    pub fn from_env() -> Self {
        Self {
            text_endpoint: std::env::var("FLOWLINE_TEXT_ENDPOINT").ok(),
            message_endpoint: std::env::var("FLOWLINE_MESSAGE_ENDPOINT").ok(),
        }
    }
}

/// reqwest-backed implementation of `SideEffects`.
pub struct LiveSideEffects {
    client: reqwest::Client,
    config: EffectsConfig,
}

impl LiveSideEffects {
    pub fn new(config: EffectsConfig) -> Result<Self, ExecutorError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ExecutorError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    async fn post_json(&self, url: &str, body: Value) -> Result<Value, ExecutorError> {
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        let text = response.text().await.map_err(map_request_error)?;
        if status.is_server_error() {
            return Err(ExecutorError::Transient(format!(
                "{url} returned {status}: {text}"
            )));
        }
        if !status.is_success() {
            return Err(ExecutorError::Fatal(format!(
                "{url} returned {status}: {text}"
            )));
        }
        Ok(parse_body_text(&text))
    }
}

impl SideEffects for LiveSideEffects {
    fn http_request<'a>(
        &'a self,
        method: &'a str,
        url: &'a str,
        headers: &'a HashMap<String, String>,
        body: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Value, ExecutorError>> {
        Box::pin(async move {
            let method = reqwest::Method::from_bytes(method.as_bytes())
                .map_err(|_| ExecutorError::Config(format!("invalid HTTP method: {method}")))?;

            let mut request = self.client.request(method, url);
            for (name, value) in headers {
                request = request.header(name, value);
            }
            if let Some(body) = body {
                request = request.body(body.to_string());
            }

            let response = request.send().await.map_err(map_request_error)?;
            let status = response.status();
            let response_headers: HashMap<String, String> = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();
            let text = response.text().await.map_err(map_request_error)?;

            if status.is_server_error() {
                return Err(ExecutorError::Transient(format!(
                    "{url} returned {status}"
                )));
            }

            tracing::debug!(%url, status = status.as_u16(), "http request completed");
            Ok(json!({
                "status": status.as_u16(),
                "headers": response_headers,
                "body": parse_body_text(&text),
            }))
        })
    }

    fn generate_text<'a>(
        &'a self,
        prompt: &'a str,
        model: Option<&'a str>,
    ) -> BoxFuture<'a, Result<String, ExecutorError>> {
        Box::pin(async move {
            let Some(endpoint) = &self.config.text_endpoint else {
                return Err(ExecutorError::Config(
                    "no text-generation endpoint configured".to_string(),
                ));
            };

            let mut body = json!({"prompt": prompt});
            if let Some(model) = model {
                body["model"] = json!(model);
            }

            let response = self.post_json(endpoint, body).await?;
            // {"text": "..."} responses unwrap to the text; anything else is
            // passed through as a string.
            match response.get("text").and_then(Value::as_str) {
                Some(text) => Ok(text.to_string()),
                None => match response {
                    Value::String(text) => Ok(text),
                    other => Ok(other.to_string()),
                },
            }
        })
    }

    fn send_message<'a>(
        &'a self,
        channel: &'a str,
        recipient: &'a str,
        body: &'a str,
    ) -> BoxFuture<'a, Result<Value, ExecutorError>> {
        Box::pin(async move {
            let Some(endpoint) = &self.config.message_endpoint else {
                return Err(ExecutorError::Config(
                    "no message-delivery endpoint configured".to_string(),
                ));
            };

            let delivery = self
                .post_json(
                    endpoint,
                    json!({"channel": channel, "recipient": recipient, "body": body}),
                )
                .await?;
            tracing::debug!(channel, recipient, "message delivered");
            Ok(delivery)
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// JSON bodies parse to their value; everything else stays a string.
fn parse_body_text(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

fn map_request_error(e: reqwest::Error) -> ExecutorError {
    if e.is_builder() {
        ExecutorError::Config(e.to_string())
    } else {
        // Connect failures, timeouts, and dropped bodies are all worth a retry.
        ExecutorError::Transient(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
