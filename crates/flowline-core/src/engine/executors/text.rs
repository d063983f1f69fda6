//! Text generation executor.
//!
//! Configuration (`node.data`):
//! - `prompt` (required, template)
//! - `model` (optional)
//! - `variable` (optional, default `text`) -- context key for the result

use flowline_types::event::NodeStatusKind;
use flowline_types::workflow::Node;
use futures_util::future::BoxFuture;
use serde_json::Value;

use super::super::context::ExecutionContext;
use super::super::registry::{ExecutorEnv, ExecutorError, ExecutorOutput, NodeExecutor};
use super::{require_str, variable_name};

pub struct GenerateTextExecutor;

impl NodeExecutor for GenerateTextExecutor {
    fn execute<'a>(
        &'a self,
        node: &'a Node,
        ctx: ExecutionContext,
        env: &'a ExecutorEnv,
    ) -> BoxFuture<'a, Result<ExecutorOutput, ExecutorError>> {
        Box::pin(async move {
            let prompt_template = require_str(&node.data, "prompt")?;
            let model = node.data.get("model").and_then(Value::as_str);
            let prompt = ctx.render(prompt_template);

            env.publish_status(&node.id, NodeStatusKind::Loading);
            tracing::debug!(node_id = %node.id, model = ?model, "generate text node");

            match env.effects.generate_text(&prompt, model).await {
                Ok(text) => {
                    env.publish_status(&node.id, NodeStatusKind::Success);
                    let variable = variable_name(&node.data, "text");
                    Ok(ExecutorOutput::context(ctx.with(&variable, Value::String(text))))
                }
                Err(e) => {
                    env.publish_status(&node.id, NodeStatusKind::Error);
                    Err(e)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testutil::{env_with_effects, test_env, test_node, MockEffects};
    use flowline_types::workflow::NodeType;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn missing_prompt_is_config_error() {
        let node = test_node("g", NodeType::GenerateText, json!({}));
        let env = test_env();

        let err = GenerateTextExecutor
            .execute(&node, ExecutionContext::new(), &env)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Config(_)));
    }

    #[tokio::test]
    async fn renders_prompt_and_stores_result() {
        let effects = Arc::new(MockEffects::default());
        let env = env_with_effects(effects.clone());
        let node = test_node(
            "g",
            NodeType::GenerateText,
            json!({"prompt": "Reply to {{trigger.reviewer}}", "variable": "reply"}),
        );
        let ctx = ExecutionContext::new().with("trigger", json!({"reviewer": "Ada"}));

        let out = GenerateTextExecutor.execute(&node, ctx, &env).await.unwrap();

        let prompts = effects.text_calls.lock().unwrap();
        assert_eq!(prompts[0], "Reply to Ada");
        assert!(matches!(out.context.get("reply"), Some(Value::String(_))));
    }
}
