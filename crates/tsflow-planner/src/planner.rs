//! The planner object: owns both graphs and drives [`Planner::plan`].

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{debug, Span};

use tsflow_core::config::{ConfigNode, OperatorConfig, CONTEXT_NODE_ID};
use tsflow_core::error::{Error, Result};
use tsflow_core::graph::DiGraph;
use tsflow_core::query::TimeSeriesQuery;
use tsflow_query::context::QueryPipelineContext;
use tsflow_query::factory::{QueryNodeFactory, QueryPlanner};
use tsflow_query::node::QueryNode;

use crate::filters::parse_sink_filters;

/// Plans a single query: validates the config graph, lets factories rewrite
/// it, folds push-down operators into their sources, and materializes and
/// initializes the executor graph.
///
/// Lifecycle: construct → [`Planner::plan`] (at most once) → inspect the
/// planned artifacts. The config graph is mutated freely while planning and
/// must be treated as frozen afterwards.
pub struct Planner {
    pub(crate) context: Arc<dyn QueryPipelineContext>,
    pub(crate) query: Arc<TimeSeriesQuery>,
    /// The pass-through sink every result flows into. Supplied by the
    /// caller; must answer to the `QueryContext` id.
    pub(crate) context_sink: Arc<dyn QueryNode>,
    /// Sink filter: node id → optional source hint.
    pub(crate) sink_filter: HashMap<String, Option<String>>,
    /// Predecessor-less node ids recorded while sink filters are in play.
    pub(crate) roots: Vec<String>,
    /// The planned executor graph.
    pub(crate) graph: DiGraph<Arc<dyn QueryNode>>,
    /// Data source executors in order of construction.
    pub(crate) data_sources: Vec<Arc<dyn QueryNode>>,
    /// Ids of the data source configs currently in the config graph.
    pub(crate) source_nodes: BTreeSet<String>,
    pub(crate) config_graph: DiGraph<ConfigNode>,
    /// Config id → executor, for linking and lookups.
    pub(crate) nodes_map: HashMap<String, Arc<dyn QueryNode>>,
    /// Result ids the sink should expect once planning finished.
    pub(crate) serialization_sources: BTreeSet<String>,
    pub(crate) satisfied_filters: HashSet<String>,
    pub(crate) factory_cache: HashMap<String, Arc<dyn QueryNodeFactory>>,
    planned: bool,
}

impl Planner {
    /// Create a planner for the context's query. Sink filter directives are
    /// parsed here; a malformed directive fails construction with
    /// [`Error::InvalidFilter`].
    pub fn new(
        context: Arc<dyn QueryPipelineContext>,
        context_sink: Arc<dyn QueryNode>,
    ) -> Result<Self> {
        debug_assert_eq!(
            context_sink.config().id(),
            CONTEXT_NODE_ID,
            "context sink must answer to the QueryContext id"
        );
        let query = context.query();
        let sink_filter = parse_sink_filters(&query.serdes_configs)?;
        Ok(Self {
            context,
            query,
            context_sink,
            sink_filter,
            roots: Vec::new(),
            graph: DiGraph::new(),
            data_sources: Vec::new(),
            source_nodes: BTreeSet::new(),
            config_graph: DiGraph::new(),
            nodes_map: HashMap::new(),
            serialization_sources: BTreeSet::new(),
            satisfied_filters: HashSet::new(),
            factory_cache: HashMap::new(),
            planned: false,
        })
    }

    /// Does the hard work. Must be called at most once per planner.
    pub async fn plan(&mut self, span: &Span) -> Result<()> {
        debug_assert!(!self.planned, "plan() invoked twice");
        self.planned = true;

        self.build_config_graph()?;
        self.setup_to_convergence()?;
        self.rebuild_source_nodes();
        self.initialize_source_filters(span).await?;

        // Before doing any more work, make sure the filters were satisfied.
        for key in self.sink_filter.keys() {
            if !self.satisfied_filters.contains(key) {
                return Err(Error::UnsatisfiedFilter(key.clone()));
            }
        }

        self.push_down_all()?;
        self.serialization_sources = self.compute_serialization_sources(CONTEXT_NODE_ID);
        self.build_executor_graph()?;
        self.initialize_executors(span).await
    }

    /// Seed the config graph from the query's execution graph: the context
    /// sentinel, one vertex per operator, and one edge per source reference.
    fn build_config_graph(&mut self) -> Result<()> {
        let query = self.query.clone();
        self.config_graph.add_node(ConfigNode::Context);

        for node in &query.execution_graph {
            if node.id() == CONTEXT_NODE_ID
                || !self
                    .config_graph
                    .add_node(ConfigNode::Operator(node.clone()))
            {
                return Err(Error::DuplicateId(node.id().to_string()));
            }
        }

        for node in &query.execution_graph {
            if node.is_data_source() {
                self.source_nodes.insert(node.id().to_string());
            }
            for source in node.sources() {
                if !self.config_graph.contains(source) {
                    return Err(Error::UnknownSource {
                        node: node.id().to_string(),
                        source: source.clone(),
                    });
                }
                self.config_graph.add_edge(node.id(), source)?;
            }
        }
        debug!(
            nodes = self.config_graph.len(),
            sources = self.source_nodes.len(),
            "built initial config graph"
        );
        Ok(())
    }

    /// Re-scan the (possibly rewritten) config graph for data sources.
    pub(crate) fn rebuild_source_nodes(&mut self) {
        let ids: Vec<String> = self
            .config_graph
            .nodes()
            .filter(|n| n.is_data_source())
            .map(|n| n.id().to_string())
            .collect();
        self.source_nodes.clear();
        self.source_nodes.extend(ids);
    }

    /// Kick off every data source filter initialization and wait for the
    /// whole group.
    async fn initialize_source_filters(&mut self, span: &Span) -> Result<()> {
        let mut filters = Vec::new();
        for id in &self.source_nodes {
            let filter = self
                .config_graph
                .node(id)
                .and_then(ConfigNode::as_operator)
                .and_then(OperatorConfig::data_source)
                .and_then(|ds| ds.filter());
            if let Some(filter) = filter {
                filters.push(Arc::clone(filter));
            }
        }
        if filters.is_empty() {
            return Ok(());
        }
        debug!(filters = filters.len(), "initializing data source filters");
        let inits = filters.iter().map(|f| f.initialize(span));
        futures::future::try_join_all(inits).await?;
        Ok(())
    }

    /// Registry key for a config: the source id for data sources (empty key
    /// selects the default source factory), otherwise the type, falling
    /// back to the node id. Keys are lowercased.
    pub(crate) fn factory_key(config: &OperatorConfig) -> String {
        if let Some(ds) = config.data_source() {
            ds.source_id().map(str::to_lowercase).unwrap_or_default()
        } else if let Some(node_type) = config.node_type().filter(|t| !t.is_empty()) {
            node_type.to_lowercase()
        } else {
            config.id().to_lowercase()
        }
    }

    /// Resolve a factory through the per-plan cache, then the registry.
    pub(crate) fn get_factory(&mut self, key: &str) -> Option<Arc<dyn QueryNodeFactory>> {
        if let Some(factory) = self.factory_cache.get(key) {
            return Some(factory.clone());
        }
        let factory = self.context.registry().get(key)?;
        self.factory_cache.insert(key.to_string(), factory.clone());
        Some(factory)
    }

    /// The planned executor graph. Immutable once `plan` resolves.
    pub fn graph(&self) -> &DiGraph<Arc<dyn QueryNode>> {
        &self.graph
    }

    pub fn config_graph(&self) -> &DiGraph<ConfigNode> {
        &self.config_graph
    }

    pub fn context(&self) -> &Arc<dyn QueryPipelineContext> {
        &self.context
    }

    pub fn context_sink(&self) -> &Arc<dyn QueryNode> {
        &self.context_sink
    }

    /// Data source executors in order of construction.
    pub fn sources(&self) -> &[Arc<dyn QueryNode>] {
        &self.data_sources
    }

    /// Result ids the sink will observe.
    pub fn serialization_sources(&self) -> &BTreeSet<String> {
        &self.serialization_sources
    }

    pub fn node_for_id(&self, id: &str) -> Option<Arc<dyn QueryNode>> {
        self.nodes_map.get(id).cloned()
    }

    /// Predecessor-less config ids that were not auto-wired to the context
    /// because sink filters were present.
    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    /// Render the config graph for logs and debugging.
    pub fn describe_config_graph(&self) -> String {
        let mut out = String::new();
        for node in self.config_graph.nodes() {
            let kind = match node {
                ConfigNode::Context => "context",
                ConfigNode::Operator(c) if c.is_data_source() => "source",
                ConfigNode::Operator(_) => "operator",
            };
            let _ = writeln!(out, "[V] {} ({})", node.id(), kind);
        }
        for (from, to) in self.config_graph.edges() {
            let _ = writeln!(out, "[E] {} => {}", from, to);
        }
        out
    }
}

impl QueryPlanner for Planner {
    fn config_graph(&self) -> &DiGraph<ConfigNode> {
        &self.config_graph
    }

    fn add_edge(&mut self, from: &OperatorConfig, to: &OperatorConfig) -> Result<bool> {
        let inserted_from = self
            .config_graph
            .add_node(ConfigNode::Operator(from.clone()));
        let inserted_to = self.config_graph.add_node(ConfigNode::Operator(to.clone()));
        let added = match self.config_graph.add_edge(from.id(), to.id()) {
            Ok(added) => added,
            Err(err) => {
                // A rejected edge must leave the graph unchanged, endpoints
                // included.
                if inserted_from {
                    self.config_graph.remove_node(from.id());
                }
                if inserted_to {
                    self.config_graph.remove_node(to.id());
                }
                return Err(err);
            }
        };
        if from.is_data_source() {
            self.source_nodes.insert(from.id().to_string());
        }
        if to.is_data_source() {
            self.source_nodes.insert(to.id().to_string());
        }
        Ok(added)
    }

    fn remove_edge(&mut self, from: &OperatorConfig, to: &OperatorConfig) -> bool {
        if !self.config_graph.remove_edge(from.id(), to.id()) {
            return false;
        }
        for config in [from, to] {
            if self.config_graph.is_orphan(config.id()) {
                self.config_graph.remove_node(config.id());
                self.source_nodes.remove(config.id());
            }
        }
        true
    }

    fn remove_node(&mut self, config: &OperatorConfig) -> bool {
        if self.config_graph.remove_node(config.id()).is_none() {
            return false;
        }
        self.source_nodes.remove(config.id());
        true
    }

    fn replace(&mut self, old: &OperatorConfig, new: OperatorConfig) -> Result<()> {
        let upstream: Vec<String> = self.config_graph.predecessors(old.id()).to_vec();
        let downstream: Vec<String> = self.config_graph.successors(old.id()).to_vec();

        self.config_graph.remove_node(old.id());
        self.source_nodes.remove(old.id());

        let new_id = new.id().to_string();
        let is_source = new.is_data_source();
        self.config_graph.add_node(ConfigNode::Operator(new));
        if is_source {
            self.source_nodes.insert(new_id.clone());
        }

        for up in upstream {
            self.config_graph.add_edge(&up, &new_id)?;
        }
        for down in downstream {
            self.config_graph.add_edge(&new_id, &down)?;
        }
        Ok(())
    }
}
