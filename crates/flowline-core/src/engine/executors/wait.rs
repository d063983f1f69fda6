//! Wait executor.
//!
//! Configuration (`node.data`):
//! - `duration` (required, positive number)
//! - `unit` (optional: seconds | minutes | hours | days, default minutes)
//!
//! The executor never sleeps. It computes the delay and hands it back as
//! the `_wait` context field; the orchestrator persists the execution as
//! Waiting with a `resume_at` and a resumption pass picks it up later, so
//! the suspension survives restarts.

use flowline_types::workflow::Node;
use futures_util::future::BoxFuture;
use serde_json::{json, Value};

use super::super::context::{ExecutionContext, WAIT_KEY};
use super::super::registry::{ExecutorEnv, ExecutorError, ExecutorOutput, NodeExecutor};

pub struct WaitExecutor;

impl NodeExecutor for WaitExecutor {
    fn execute<'a>(
        &'a self,
        node: &'a Node,
        ctx: ExecutionContext,
        _env: &'a ExecutorEnv,
    ) -> BoxFuture<'a, Result<ExecutorOutput, ExecutorError>> {
        Box::pin(async move {
            let duration = node
                .data
                .get("duration")
                .and_then(Value::as_f64)
                .ok_or_else(|| {
                    ExecutorError::Config("missing required field 'duration'".to_string())
                })?;
            if duration <= 0.0 {
                return Err(ExecutorError::Config(
                    "'duration' must be positive".to_string(),
                ));
            }

            let unit = node
                .data
                .get("unit")
                .and_then(Value::as_str)
                .unwrap_or("minutes");
            let per_unit: u64 = match unit {
                "seconds" => 1,
                "minutes" => 60,
                "hours" => 3600,
                "days" => 86_400,
                other => {
                    return Err(ExecutorError::Config(format!("unknown wait unit '{other}'")));
                }
            };

            let resume_in_secs = (duration * per_unit as f64).round() as u64;
            tracing::debug!(node_id = %node.id, resume_in_secs, "wait node requesting suspension");

            Ok(ExecutorOutput::context(
                ctx.with(WAIT_KEY, json!({"resumeInSecs": resume_in_secs})),
            ))
        })
    }
}
