//! Node executor trait and the type-to-executor registry.
//!
//! Every node type maps to exactly one executor. The registry is built once
//! at startup and validated against each graph before the walk begins;
//! hitting an unregistered type at run time is a fatal error, never a
//! silent skip.

use std::collections::HashMap;
use std::sync::Arc;

use flowline_types::event::{EngineEvent, NodeStatusKind};
use flowline_types::workflow::{Node, NodeType, WorkflowGraph};
use futures_util::future::BoxFuture;
use thiserror::Error;
use uuid::Uuid;

use super::condition::CategoryLookup;
use super::context::ExecutionContext;
use super::dispatcher::TriggerSink;
use super::effects::SideEffects;
use crate::event::EventBus;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from node executor invocation.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Invalid or missing node configuration. Never retried.
    #[error("invalid node configuration: {0}")]
    Config(String),

    /// A transient failure (network, 5xx, timeout). Retried up to the limit.
    #[error("transient failure: {0}")]
    Transient(String),

    /// A non-transient execution failure. Never retried.
    #[error("execution failed: {0}")]
    Fatal(String),

    /// No executor registered for the node type.
    #[error("no executor registered for node type {0:?}")]
    Unregistered(NodeType),
}

impl ExecutorError {
    /// Whether the retry loop may re-attempt after this error.
    pub fn is_retriable(&self) -> bool {
        matches!(self, ExecutorError::Transient(_))
    }
}

// ---------------------------------------------------------------------------
// Executor trait
// ---------------------------------------------------------------------------

/// What an executor hands back to the walk.
#[derive(Debug, Clone)]
pub struct ExecutorOutput {
    /// The updated context (executors never mutate their input).
    pub context: ExecutionContext,
    /// A branch decision (`"true"` / `"false"`), set only by branch nodes.
    pub branch: Option<String>,
}

impl ExecutorOutput {
    /// Plain output: updated context, no branch decision.
    pub fn context(context: ExecutionContext) -> Self {
        Self {
            context,
            branch: None,
        }
    }
}

/// Shared collaborators handed to every executor invocation.
#[derive(Clone)]
pub struct ExecutorEnv {
    pub execution_id: Uuid,
    pub bus: EventBus,
    pub effects: Arc<dyn SideEffects>,
    pub categories: Arc<dyn CategoryLookup>,
    /// Present when the engine is wired for workflow-to-workflow chaining.
    pub triggers: Option<Arc<dyn TriggerSink>>,
}

impl ExecutorEnv {
    /// Publish a node status event on the bus.
    pub fn publish_status(&self, node_id: &str, status: NodeStatusKind) {
        self.bus.publish(EngineEvent::NodeStatus {
            execution_id: self.execution_id,
            node_id: node_id.to_string(),
            status,
        });
    }
}

/// A node executor.
///
/// Object safe (boxed futures) so the registry can hold heterogeneous
/// executors behind `Arc<dyn NodeExecutor>`. Implementations validate their
/// configuration before doing any work and return
/// [`ExecutorError::Config`] when it is invalid.
pub trait NodeExecutor: Send + Sync {
    fn execute<'a>(
        &'a self,
        node: &'a Node,
        ctx: ExecutionContext,
        env: &'a ExecutorEnv,
    ) -> BoxFuture<'a, Result<ExecutorOutput, ExecutorError>>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// The node-type-to-executor map.
pub struct ExecutorRegistry {
    executors: HashMap<NodeType, Arc<dyn NodeExecutor>>,
}

impl ExecutorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// A registry wired with every built-in executor.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        let trigger: Arc<dyn NodeExecutor> = Arc::new(super::executors::TriggerProjection);

        for trigger_type in [
            NodeType::ContactCreated,
            NodeType::ReviewReceived,
            NodeType::MessageReceived,
            NodeType::FormSubmitted,
            NodeType::PaymentReceived,
            NodeType::StageChanged,
            NodeType::Schedule,
        ] {
            registry.register(trigger_type, trigger.clone());
        }

        registry.register(NodeType::HttpRequest, Arc::new(super::executors::HttpRequestExecutor));
        registry.register(NodeType::GenerateText, Arc::new(super::executors::GenerateTextExecutor));
        registry.register(NodeType::SendMessage, Arc::new(super::executors::SendMessageExecutor));
        registry.register(NodeType::Wait, Arc::new(super::executors::WaitExecutor));
        registry.register(NodeType::Branch, Arc::new(super::executors::BranchExecutor));
        registry
    }

    /// Register (or replace) the executor for a node type.
    pub fn register(&mut self, node_type: NodeType, executor: Arc<dyn NodeExecutor>) {
        self.executors.insert(node_type, executor);
    }

    /// Look up the executor for a node type.
    pub fn get(&self, node_type: NodeType) -> Result<&Arc<dyn NodeExecutor>, ExecutorError> {
        self.executors
            .get(&node_type)
            .ok_or(ExecutorError::Unregistered(node_type))
    }

    /// Check that every node in the graph has a registered executor.
    ///
    /// Run before the walk starts so a half-registered engine fails loudly
    /// instead of mid-execution.
    pub fn validate_graph(&self, graph: &WorkflowGraph) -> Result<(), ExecutorError> {
        for node in &graph.nodes {
            if !self.executors.contains_key(&node.node_type) {
                return Err(ExecutorError::Unregistered(node.node_type));
            }
        }
        Ok(())
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
