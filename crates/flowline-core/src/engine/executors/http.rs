//! HTTP request executor.
//!
//! Configuration (`node.data`):
//! - `url` (required, template)
//! - `method` (optional, default GET)
//! - `headers` (optional string map, values templated)
//! - `body` (optional, template)
//! - `variable` (optional, default `http`) -- context key for the response

use std::collections::HashMap;

use flowline_types::event::NodeStatusKind;
use flowline_types::workflow::Node;
use futures_util::future::BoxFuture;
use serde_json::Value;

use super::super::context::ExecutionContext;
use super::super::registry::{ExecutorEnv, ExecutorError, ExecutorOutput, NodeExecutor};
use super::{require_str, variable_name};

const SUPPORTED_METHODS: [&str; 5] = ["GET", "POST", "PUT", "PATCH", "DELETE"];

pub struct HttpRequestExecutor;

impl NodeExecutor for HttpRequestExecutor {
    fn execute<'a>(
        &'a self,
        node: &'a Node,
        ctx: ExecutionContext,
        env: &'a ExecutorEnv,
    ) -> BoxFuture<'a, Result<ExecutorOutput, ExecutorError>> {
        Box::pin(async move {
            let url_template = require_str(&node.data, "url")?;
            let method = node
                .data
                .get("method")
                .and_then(Value::as_str)
                .unwrap_or("GET")
                .to_ascii_uppercase();
            if !SUPPORTED_METHODS.contains(&method.as_str()) {
                return Err(ExecutorError::Config(format!(
                    "unsupported HTTP method '{method}'"
                )));
            }

            let url = ctx.render(url_template);
            let headers: HashMap<String, String> = node
                .data
                .get("headers")
                .and_then(Value::as_object)
                .map(|map| {
                    map.iter()
                        .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), ctx.render(v))))
                        .collect()
                })
                .unwrap_or_default();
            let body = node
                .data
                .get("body")
                .and_then(Value::as_str)
                .map(|b| ctx.render(b));

            env.publish_status(&node.id, NodeStatusKind::Loading);
            tracing::debug!(node_id = %node.id, %method, %url, "http request node");

            match env
                .effects
                .http_request(&method, &url, &headers, body.as_deref())
                .await
            {
                Ok(response) => {
                    env.publish_status(&node.id, NodeStatusKind::Success);
                    let variable = variable_name(&node.data, "http");
                    Ok(ExecutorOutput::context(ctx.with(&variable, response)))
                }
                Err(e) => {
                    env.publish_status(&node.id, NodeStatusKind::Error);
                    Err(e)
                }
            }
        })
    }
}
