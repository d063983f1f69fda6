//! Branch executor.
//!
//! Configuration (`node.data`):
//! - `condition` (required [`Condition`])
//!
//! Evaluates the condition against the context and reports the decision as
//! the output label `"true"` or `"false"`; the walk follows only that
//! output's connections. `in_category` conditions go through the env's
//! category lookup and fail closed.

use flowline_types::workflow::{Condition, Node};
use futures_util::future::BoxFuture;

use super::super::condition::evaluate_with_lookup;
use super::super::context::ExecutionContext;
use super::super::registry::{ExecutorEnv, ExecutorError, ExecutorOutput, NodeExecutor};

pub struct BranchExecutor;

impl NodeExecutor for BranchExecutor {
    fn execute<'a>(
        &'a self,
        node: &'a Node,
        ctx: ExecutionContext,
        env: &'a ExecutorEnv,
    ) -> BoxFuture<'a, Result<ExecutorOutput, ExecutorError>> {
        Box::pin(async move {
            let condition: Condition = node
                .data
                .get("condition")
                .cloned()
                .ok_or_else(|| {
                    ExecutorError::Config("missing required field 'condition'".to_string())
                })
                .and_then(|value| {
                    serde_json::from_value(value)
                        .map_err(|e| ExecutorError::Config(format!("invalid condition: {e}")))
                })?;

            let met = evaluate_with_lookup(&condition, &ctx, env.categories.as_ref()).await;
            tracing::debug!(node_id = %node.id, field = %condition.field, met, "branch decision");

            Ok(ExecutorOutput {
                context: ctx,
                branch: Some(if met { "true" } else { "false" }.to_string()),
            })
        })
    }
}
