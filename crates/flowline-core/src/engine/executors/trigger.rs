//! Trigger projection executor.
//!
//! Trigger nodes do not perform work at execution time; the dispatcher has
//! already matched the event before the run exists. This executor only
//! projects the firing event's payload into the context under `trigger`, so
//! downstream templates read `{{trigger.*}}` instead of digging into the
//! engine's `_trigger` metadata.

use flowline_types::workflow::Node;
use futures_util::future::BoxFuture;
use serde_json::Value;

use super::super::context::ExecutionContext;
use super::super::registry::{ExecutorEnv, ExecutorError, ExecutorOutput, NodeExecutor};

pub struct TriggerProjection;

impl NodeExecutor for TriggerProjection {
    fn execute<'a>(
        &'a self,
        _node: &'a Node,
        ctx: ExecutionContext,
        _env: &'a ExecutorEnv,
    ) -> BoxFuture<'a, Result<ExecutorOutput, ExecutorError>> {
        Box::pin(async move {
            let payload = ctx
                .get("_trigger.payload")
                .cloned()
                .unwrap_or(Value::Null);
            Ok(ExecutorOutput::context(ctx.with("trigger", payload)))
        })
    }
}
