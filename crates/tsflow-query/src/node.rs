//! Executor-side contract: the runtime node a factory materializes.

use async_trait::async_trait;
use tracing::Span;

use tsflow_core::config::OperatorConfig;
use tsflow_core::error::Result;
use tsflow_core::graph::GraphNode;

/// A materialized operator instance in the executor graph.
///
/// Invariants the planner relies on:
/// - `config().id()` is stable for the node's lifetime; the executor graph
///   and `node_for_id` lookups are keyed on it.
/// - `initialize` is invoked exactly once, and only after `initialize` has
///   completed on every downstream node.
#[async_trait]
pub trait QueryNode: Send + Sync {
    /// The configuration this node was built from.
    fn config(&self) -> &OperatorConfig;

    /// Whether this node reads time-series data directly.
    fn is_data_source(&self) -> bool {
        false
    }

    /// Prepare the node for streaming results.
    async fn initialize(&self, span: &Span) -> Result<()>;
}

impl GraphNode for dyn QueryNode {
    fn node_id(&self) -> &str {
        self.config().id()
    }
}
