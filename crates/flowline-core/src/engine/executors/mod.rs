//! Built-in node executors.
//!
//! One executor per action kind, plus a shared projection for all trigger
//! kinds. Each validates its configuration before doing work; side-effecting
//! executors publish `loading` then exactly one of `success`/`error`.

mod branch;
mod http;
mod message;
mod text;
mod trigger;
mod wait;

pub use branch::BranchExecutor;
pub use http::HttpRequestExecutor;
pub use message::SendMessageExecutor;
pub use text::GenerateTextExecutor;
pub use trigger::TriggerProjection;
pub use wait::WaitExecutor;

use serde_json::Value;

use super::registry::ExecutorError;

/// Read a required string field from node data.
pub(crate) fn require_str<'a>(data: &'a Value, key: &str) -> Result<&'a str, ExecutorError> {
    data.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ExecutorError::Config(format!("missing required field '{key}'")))
}

/// Read the output variable name, falling back to a per-type default.
pub(crate) fn variable_name(data: &Value, default: &str) -> String {
    data.get("variable")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(default)
        .to_string()
}
