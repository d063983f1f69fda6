//! Message delivery executor.
//!
//! Configuration (`node.data`):
//! - `channel` (required, e.g. "email", "sms")
//! - `recipient` (required, template)
//! - `body` (required, template)
//! - `variable` (optional, default `message`) -- context key for delivery
//!   metadata
//!
//! Delivery can re-enter the engine as a `message_received` event (replies,
//! delivery webhooks), so this is the executor that chains workflows. The
//! downstream trigger is emitted at `depth + 1` and refused outright once
//! the incremented depth reaches the chain limit; the dispatcher enforces
//! the same bound on its side.

use flowline_types::event::NodeStatusKind;
use flowline_types::workflow::{Node, NodeType, TriggerEvent, MAX_TRIGGER_DEPTH};
use futures_util::future::BoxFuture;
use serde_json::json;

use super::super::context::ExecutionContext;
use super::super::registry::{ExecutorEnv, ExecutorError, ExecutorOutput, NodeExecutor};
use super::{require_str, variable_name};

pub struct SendMessageExecutor;

impl NodeExecutor for SendMessageExecutor {
    fn execute<'a>(
        &'a self,
        node: &'a Node,
        ctx: ExecutionContext,
        env: &'a ExecutorEnv,
    ) -> BoxFuture<'a, Result<ExecutorOutput, ExecutorError>> {
        Box::pin(async move {
            let channel = require_str(&node.data, "channel")?.to_string();
            let recipient = ctx.render(require_str(&node.data, "recipient")?);
            let body = ctx.render(require_str(&node.data, "body")?);
            if recipient.is_empty() {
                return Err(ExecutorError::Config(
                    "recipient resolved to an empty string".to_string(),
                ));
            }

            env.publish_status(&node.id, NodeStatusKind::Loading);
            tracing::debug!(node_id = %node.id, channel, recipient, "send message node");

            let delivery = match env.effects.send_message(&channel, &recipient, &body).await {
                Ok(delivery) => {
                    env.publish_status(&node.id, NodeStatusKind::Success);
                    delivery
                }
                Err(e) => {
                    env.publish_status(&node.id, NodeStatusKind::Error);
                    return Err(e);
                }
            };

            self.chain_downstream_trigger(&ctx, env, &channel, &recipient).await;

            let variable = variable_name(&node.data, "message");
            Ok(ExecutorOutput::context(ctx.with(&variable, delivery)))
        })
    }
}

impl SendMessageExecutor {
    /// Emit the engine-side `message_received` follow-up for this delivery.
    ///
    /// Skipped when no trigger sink is wired, and refused once the
    /// incremented depth reaches `MAX_TRIGGER_DEPTH`.
    async fn chain_downstream_trigger(
        &self,
        ctx: &ExecutionContext,
        env: &ExecutorEnv,
        channel: &str,
        recipient: &str,
    ) {
        let Some(triggers) = &env.triggers else {
            return;
        };
        let Some(workspace_id) = ctx.workspace_id() else {
            return;
        };

        let next_depth = ctx.trigger_depth().saturating_add(1);
        if next_depth >= MAX_TRIGGER_DEPTH {
            tracing::info!(
                depth = next_depth,
                "refusing to chain message trigger at depth limit"
            );
            return;
        }

        let mut payload = json!({
            "source": "workflow",
            "channel": channel,
            "recipient": recipient,
        });
        if let Some(contact_id) = ctx.contact_id() {
            payload["contactId"] = json!(contact_id);
        }

        triggers
            .fire(TriggerEvent {
                trigger_type: NodeType::MessageReceived,
                payload,
                workspace_id,
                depth: next_depth,
            })
            .await;
    }
}
