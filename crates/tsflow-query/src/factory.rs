//! Factory contracts: plan-time graph rewriting and executor construction.

use std::sync::Arc;

use tsflow_core::config::{ConfigNode, OperatorConfig};
use tsflow_core::error::Result;
use tsflow_core::graph::DiGraph;
use tsflow_core::query::TimeSeriesQuery;

use crate::context::QueryPipelineContext;
use crate::node::QueryNode;

/// The mutator surface the planner exposes to factories during
/// [`QueryNodeFactory::setup_graph`]. Every edge mutation is cycle-checked.
pub trait QueryPlanner {
    /// Read-only view of the current configuration graph.
    fn config_graph(&self) -> &DiGraph<ConfigNode>;

    /// Insert `from → to` (parent consumes child), adding missing endpoints
    /// to the graph first. On cycle creation the edge is rejected and the
    /// graph left unchanged. Returns whether the edge was new.
    fn add_edge(&mut self, from: &OperatorConfig, to: &OperatorConfig) -> Result<bool>;

    /// Remove `from → to`. An endpoint left with no edges in either
    /// direction is dropped from the graph. Returns whether removal
    /// occurred.
    fn remove_edge(&mut self, from: &OperatorConfig, to: &OperatorConfig) -> bool;

    /// Drop a node and all incident edges.
    fn remove_node(&mut self, config: &OperatorConfig) -> bool;

    /// Atomically swap `old` for `new`, preserving both neighbor sets.
    fn replace(&mut self, old: &OperatorConfig, new: OperatorConfig) -> Result<()>;
}

/// Factory contract for one operator or source type.
///
/// `setup_graph` runs during planning and may rewrite the config graph
/// through the planner's mutators; the planner re-walks the graph until no
/// factory mutates it, so rewrites must be idempotent on their own output.
pub trait QueryNodeFactory: Send + Sync {
    /// Inspect and, if needed, rewrite the config graph around `config`.
    fn setup_graph(
        &self,
        query: &TimeSeriesQuery,
        config: &OperatorConfig,
        planner: &mut dyn QueryPlanner,
    ) -> Result<()>;

    /// Materialize the executor for `config`, or `None` when it cannot.
    fn new_node(
        &self,
        context: &dyn QueryPipelineContext,
        config: &OperatorConfig,
    ) -> Option<Arc<dyn QueryNode>>;

    /// Whether operators shaped like `config` can run inside this factory's
    /// data source.
    fn supports_pushdown(&self, _config: &OperatorConfig) -> bool {
        false
    }
}
