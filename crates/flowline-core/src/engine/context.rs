//! Execution context with dot-path access and template resolution.
//!
//! The context is a JSON object threaded through a run. It is
//! immutable-on-write: executors receive a context and return a new one via
//! [`ExecutionContext::with`], so no two nodes ever mutate shared state.
//!
//! Reserved keys:
//! - `workspaceId`, `contactId` -- routing identity
//! - `_trigger` -- `{ type, depth, firedAt, payload }` set by the dispatcher
//! - `_wait` -- `{ resumeInSecs }` returned by the wait executor
//! - `subjectIds` / `subjectPayloads` -- set on coalesced batch launches

use chrono::{DateTime, Utc};
use flowline_types::workflow::NodeType;
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// Key carrying trigger metadata.
pub const TRIGGER_KEY: &str = "_trigger";
/// Key carrying a wait executor's suspension request.
pub const WAIT_KEY: &str = "_wait";
/// Workspace routing key.
pub const WORKSPACE_KEY: &str = "workspaceId";
/// Contact routing key.
pub const CONTACT_KEY: &str = "contactId";

/// Immutable execution context.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    values: Map<String, Value>,
}

impl ExecutionContext {
    /// An empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// The initial context for a dispatched trigger launch.
    pub fn for_trigger(
        workspace_id: Uuid,
        trigger_type: NodeType,
        depth: u8,
        fired_at: DateTime<Utc>,
        payload: Value,
    ) -> Self {
        let mut values = Map::new();
        values.insert(WORKSPACE_KEY.to_string(), json!(workspace_id));
        if let Some(contact_id) = payload.get(CONTACT_KEY) {
            values.insert(CONTACT_KEY.to_string(), contact_id.clone());
        }
        values.insert(
            TRIGGER_KEY.to_string(),
            json!({
                "type": trigger_type,
                "depth": depth,
                "firedAt": fired_at,
                "payload": payload,
            }),
        );
        Self { values }
    }

    /// Rebuild a context from a persisted JSON snapshot.
    ///
    /// Non-object values yield an empty context.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(values) => Self { values },
            _ => Self::default(),
        }
    }

    /// Snapshot the context as a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }

    /// Return a new context with `key` set to `value` at the top level.
    pub fn with(&self, key: &str, value: Value) -> Self {
        let mut values = self.values.clone();
        values.insert(key.to_string(), value);
        Self { values }
    }

    /// Return a new context with the top-level `key` removed.
    pub fn without(&self, key: &str) -> Self {
        let mut values = self.values.clone();
        values.remove(key);
        Self { values }
    }

    /// Resolve a dot-path (e.g. `trigger.contact.email`).
    ///
    /// A missing segment anywhere along the path yields `None`, never an
    /// error. Only object traversal is supported; indexing into arrays is
    /// not.
    pub fn get(&self, path: &str) -> Option<&Value> {
        resolve_path(&self.values, path)
    }

    /// Workspace ID, when present and well formed.
    pub fn workspace_id(&self) -> Option<Uuid> {
        self.get(WORKSPACE_KEY)
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
    }

    /// Contact ID, when present and well formed.
    pub fn contact_id(&self) -> Option<Uuid> {
        self.get(CONTACT_KEY)
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
    }

    /// The trigger chain depth, 0 when absent.
    pub fn trigger_depth(&self) -> u8 {
        self.get("_trigger.depth")
            .and_then(Value::as_u64)
            .map(|d| d.min(u8::MAX as u64) as u8)
            .unwrap_or(0)
    }

    /// The pending wait request in seconds, if a wait node set one.
    pub fn wait_request_secs(&self) -> Option<u64> {
        self.get("_wait.resumeInSecs").and_then(Value::as_u64)
    }

    /// Render a template string, substituting `{{dot.path}}` placeholders
    /// with context values. Unresolvable placeholders render empty.
    pub fn render(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find("}}") {
                Some(end) => {
                    let path = after[..end].trim();
                    if let Some(value) = self.get(path) {
                        out.push_str(&value_to_string(value));
                    }
                    rest = &after[end + 2..];
                }
                None => {
                    // Unterminated placeholder: emit verbatim.
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

/// Resolve a dot-path against a JSON object.
pub fn resolve_path<'a>(values: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = values.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Coerce a JSON value to its template/comparison string form.
///
/// Strings render bare (no quotes); null renders empty; compound values
/// render as compact JSON.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}
