//! Side-effect capability trait for node executors.
//!
//! Core never talks to the network directly. Executors reach outbound
//! services through `SideEffects`, implemented by flowline-infra over
//! reqwest and swapped for a scripted mock in tests.

use std::collections::HashMap;

use futures_util::future::BoxFuture;
use serde_json::Value;

use super::registry::ExecutorError;

/// Outbound operations available to node executors.
///
/// Implementations classify failures for the retry loop: network and 5xx
/// failures are `ExecutorError::Transient`, malformed requests are
/// `ExecutorError::Config`.
pub trait SideEffects: Send + Sync {
    /// Perform an HTTP request. Returns a JSON object with `status`,
    /// `headers`, and `body` (parsed JSON when the response is JSON,
    /// plain text otherwise).
    fn http_request<'a>(
        &'a self,
        method: &'a str,
        url: &'a str,
        headers: &'a HashMap<String, String>,
        body: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Value, ExecutorError>>;

    /// Generate text from a prompt via the configured generation service.
    fn generate_text<'a>(
        &'a self,
        prompt: &'a str,
        model: Option<&'a str>,
    ) -> BoxFuture<'a, Result<String, ExecutorError>>;

    /// Deliver a message on a channel. Returns delivery metadata.
    fn send_message<'a>(
        &'a self,
        channel: &'a str,
        recipient: &'a str,
        body: &'a str,
    ) -> BoxFuture<'a, Result<Value, ExecutorError>>;
}
