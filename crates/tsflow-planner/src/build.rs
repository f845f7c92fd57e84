//! Executor graph construction, serialization sources, and initialization.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tracing::{debug, Span};

use tsflow_core::config::{ConfigNode, CONTEXT_NODE_ID};
use tsflow_core::error::{Error, Result};
use tsflow_core::graph::{DiGraph, GraphNode};
use tsflow_query::node::QueryNode;

use crate::planner::Planner;

/// One executor's initialization, shareable between every parent waiting on
/// it. Exactly-once is structural: the future is memoized per node.
type InitFuture = Shared<BoxFuture<'static, Result<()>>>;

impl Planner {
    /// Materialize executors bottom-up from the final config graph.
    pub(crate) fn build_executor_graph(&mut self) -> Result<()> {
        self.graph = DiGraph::new();
        self.graph.add_node(self.context_sink.clone());
        self.nodes_map
            .insert(CONTEXT_NODE_ID.to_string(), self.context_sink.clone());

        let mut constructed: HashSet<u64> = HashSet::new();
        for id in self.config_graph.breadth_first(CONTEXT_NODE_ID) {
            if self.config_graph.predecessors(&id).is_empty() {
                self.build_node(&id, &mut constructed)?;
            }
        }
        debug!(executors = self.graph.len(), "built executor graph");
        Ok(())
    }

    /// Build the executor for `node_id`, recursing into its downstream
    /// dependencies first so `nodes_map` is populated before any parent
    /// links against it.
    fn build_node(
        &mut self,
        node_id: &str,
        constructed: &mut HashSet<u64>,
    ) -> Result<Arc<dyn QueryNode>> {
        let node = self
            .config_graph
            .node(node_id)
            .cloned()
            .ok_or_else(|| Error::UnknownNode(node_id.to_string()))?;

        // Equal content hashes share one executor.
        let hash = node.build_hash();
        if constructed.contains(&hash) {
            return self
                .nodes_map
                .get(node.id())
                .cloned()
                .ok_or_else(|| Error::UnknownNode(node.id().to_string()));
        }

        let mut sources = Vec::new();
        for succ in self.config_graph.successors(node_id).to_vec() {
            sources.push(self.build_node(&succ, constructed)?);
        }

        let config = match node {
            ConfigNode::Context => {
                // The sentinel maps to the externally supplied sink; no
                // executor is materialized for it.
                for source in &sources {
                    self.graph.add_edge(CONTEXT_NODE_ID, source.node_id())?;
                }
                return Ok(self.context_sink.clone());
            }
            ConfigNode::Operator(config) => config,
        };

        let key = Planner::factory_key(&config);
        let factory = self
            .get_factory(&key)
            .ok_or_else(|| Error::NoFactory(key))?;
        let query_node = factory
            .new_node(self.context.as_ref(), &config)
            .ok_or_else(|| Error::NullExecutor(config.id().to_string()))?;

        self.graph.add_node(query_node.clone());
        self.nodes_map
            .insert(query_node.config().id().to_string(), query_node.clone());
        constructed.insert(hash);

        if query_node.is_data_source() {
            self.data_sources.push(query_node.clone());
        }
        for source in &sources {
            self.graph
                .add_edge(query_node.node_id(), source.node_id())?;
        }
        Ok(query_node)
    }

    /// Result ids the sink should expect, walking down from `node_id`.
    ///
    /// Data sources and joiners terminate the recursion with their own id.
    /// Directly under the context node, non-terminal paths are prefixed with
    /// the child's id (`"child:id"`) so the sink can tell them apart.
    pub(crate) fn compute_serialization_sources(&self, node_id: &str) -> BTreeSet<String> {
        let Some(node) = self.config_graph.node(node_id) else {
            return BTreeSet::new();
        };
        if node.is_data_source() || node.joins() {
            return BTreeSet::from([node.id().to_string()]);
        }

        let mut ids = BTreeSet::new();
        for succ in self.config_graph.successors(node_id) {
            let downstream = self.compute_serialization_sources(succ);
            if node.is_context() {
                let terminal = self
                    .config_graph
                    .node(succ)
                    .is_some_and(|d| d.is_data_source() || d.joins());
                if terminal {
                    ids.extend(downstream);
                } else {
                    ids.extend(downstream.into_iter().map(|id| format!("{succ}:{id}")));
                }
            } else {
                ids.extend(downstream);
            }
        }
        ids
    }

    /// Depth-first initialization from the context sink: every executor's
    /// successors complete before its own `initialize` starts.
    pub(crate) async fn initialize_executors(&self, span: &Span) -> Result<()> {
        let mut initialized: HashMap<String, InitFuture> = HashMap::new();
        let sink = self.context_sink.clone();
        let root = self.init_future(&sink, &mut initialized, span);
        debug!(executors = initialized.len(), "initializing executor graph");
        root.await
    }

    /// Memoized init future for `node`: join all successor futures, then run
    /// the node's own `initialize`. The context sink itself resolves without
    /// initializing.
    fn init_future(
        &self,
        node: &Arc<dyn QueryNode>,
        initialized: &mut HashMap<String, InitFuture>,
        span: &Span,
    ) -> InitFuture {
        let id = node.node_id().to_string();
        if let Some(existing) = initialized.get(&id) {
            return existing.clone();
        }

        let succ_ids = self.graph.successors(&id).to_vec();
        let mut downstream = Vec::with_capacity(succ_ids.len());
        for succ in &succ_ids {
            if let Some(succ_node) = self.graph.node(succ).cloned() {
                downstream.push(self.init_future(&succ_node, initialized, span));
            }
        }

        let is_sink = Arc::ptr_eq(node, &self.context_sink);
        let node = Arc::clone(node);
        let span = span.clone();
        let future: BoxFuture<'static, Result<()>> = Box::pin(async move {
            futures::future::try_join_all(downstream).await?;
            if is_sink {
                return Ok(());
            }
            node.initialize(&span).await
        });
        let future = future.shared();
        initialized.insert(id, future.clone());
        future
    }
}
