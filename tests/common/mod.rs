//! Shared fixtures for planner integration tests: recording executors and
//! factories plus a small builder wiring up registry, context, and sink.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::Span;

use tsflow_core::config::{OperatorConfig, QueryFilter, CONTEXT_NODE_ID};
use tsflow_core::error::Result;
use tsflow_core::query::{SerdesConfig, TimeSeriesQuery};
use tsflow_planner::Planner;
use tsflow_query::context::QueryPipelineContext;
use tsflow_query::factory::{QueryNodeFactory, QueryPlanner};
use tsflow_query::node::QueryNode;
use tsflow_query::registry::FactoryRegistry;

/// Ordered record of observable events (executor inits, filter inits).
pub type EventLog = Arc<Mutex<Vec<String>>>;

/// Scripted factory behavior, keyed by config id and run during
/// `setup_graph`. Hooks must be idempotent on their own output; the planner
/// re-walks the graph until it stabilizes.
pub type SetupHook = Arc<dyn Fn(&mut dyn QueryPlanner) -> Result<()> + Send + Sync>;

/// Executor that records the order in which `initialize` runs.
pub struct RecordingNode {
    pub config: OperatorConfig,
    pub data_source: bool,
    pub log: EventLog,
}

#[async_trait]
impl QueryNode for RecordingNode {
    fn config(&self) -> &OperatorConfig {
        &self.config
    }

    fn is_data_source(&self) -> bool {
        self.data_source
    }

    async fn initialize(&self, _span: &Span) -> Result<()> {
        self.log.lock().unwrap().push(self.config.id().to_string());
        Ok(())
    }
}

/// Data source filter that records its initialization.
#[derive(Debug)]
pub struct RecordingFilter {
    pub log: EventLog,
}

#[async_trait]
impl QueryFilter for RecordingFilter {
    async fn initialize(&self, _span: &Span) -> Result<()> {
        self.log.lock().unwrap().push("filter:init".to_string());
        Ok(())
    }
}

/// Factory materializing [`RecordingNode`]s. Push-down support comes from a
/// fixed type list; per-node setup behavior from [`SetupHook`]s.
pub struct RecordingFactory {
    pub pushdown_types: Vec<String>,
    pub log: EventLog,
    pub null_executor_for: Option<String>,
    pub setup_hooks: HashMap<String, SetupHook>,
}

impl QueryNodeFactory for RecordingFactory {
    fn setup_graph(
        &self,
        _query: &TimeSeriesQuery,
        config: &OperatorConfig,
        planner: &mut dyn QueryPlanner,
    ) -> Result<()> {
        if let Some(hook) = self.setup_hooks.get(config.id()) {
            hook(planner)?;
        }
        Ok(())
    }

    fn new_node(
        &self,
        _context: &dyn QueryPipelineContext,
        config: &OperatorConfig,
    ) -> Option<Arc<dyn QueryNode>> {
        if self.null_executor_for.as_deref() == Some(config.id()) {
            return None;
        }
        Some(Arc::new(RecordingNode {
            config: config.clone(),
            data_source: config.is_data_source(),
            log: self.log.clone(),
        }))
    }

    fn supports_pushdown(&self, config: &OperatorConfig) -> bool {
        config
            .node_type()
            .is_some_and(|t| self.pushdown_types.iter().any(|p| p == t))
    }
}

pub struct TestContext {
    pub query: Arc<TimeSeriesQuery>,
    pub registry: FactoryRegistry,
}

impl QueryPipelineContext for TestContext {
    fn query(&self) -> Arc<TimeSeriesQuery> {
        self.query.clone()
    }

    fn registry(&self) -> &FactoryRegistry {
        &self.registry
    }
}

/// Builds a planner around a query: one recording factory registered under
/// every key the query resolves, plus the default source slot.
pub struct PlannerBuilder {
    query: TimeSeriesQuery,
    pushdown_types: Vec<String>,
    null_executor_for: Option<String>,
    setup_hooks: HashMap<String, SetupHook>,
    without_keys: Vec<String>,
    extra_keys: Vec<String>,
    filter_on: Option<String>,
}

impl PlannerBuilder {
    pub fn new(query: TimeSeriesQuery) -> Self {
        Self {
            query,
            pushdown_types: Vec::new(),
            null_executor_for: None,
            setup_hooks: HashMap::new(),
            without_keys: Vec::new(),
            extra_keys: Vec::new(),
            filter_on: None,
        }
    }

    pub fn pushdown_types(mut self, types: &[&str]) -> Self {
        self.pushdown_types = types.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn null_executor_for(mut self, id: &str) -> Self {
        self.null_executor_for = Some(id.to_string());
        self
    }

    pub fn setup_hook(
        mut self,
        id: &str,
        hook: impl Fn(&mut dyn QueryPlanner) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.setup_hooks.insert(id.to_string(), Arc::new(hook));
        self
    }

    /// Leave `key` out of the registry, so resolving it fails.
    pub fn without_key(mut self, key: &str) -> Self {
        self.without_keys.push(key.to_lowercase());
        self
    }

    /// Register an extra key (for configs factories insert during setup).
    pub fn extra_key(mut self, key: &str) -> Self {
        self.extra_keys.push(key.to_string());
        self
    }

    /// Attach a [`RecordingFilter`] to the source with this id; the filter
    /// writes `"filter:init"` into the event log when initialized.
    pub fn with_source_filter(mut self, id: &str) -> Self {
        self.filter_on = Some(id.to_string());
        self
    }

    pub fn build(self) -> Result<(Planner, EventLog)> {
        let log: EventLog = Arc::new(Mutex::new(Vec::new()));

        let mut query = self.query;
        if let Some(id) = &self.filter_on {
            for node in &mut query.execution_graph {
                if node.id() == id.as_str() {
                    *node = node
                        .to_builder()
                        .filter(Arc::new(RecordingFilter { log: log.clone() }))
                        .build();
                }
            }
        }
        let factory: Arc<dyn QueryNodeFactory> = Arc::new(RecordingFactory {
            pushdown_types: self.pushdown_types,
            log: log.clone(),
            null_executor_for: self.null_executor_for,
            setup_hooks: self.setup_hooks,
        });

        let mut registry = FactoryRegistry::new();
        registry.register_default(factory.clone());
        for node in &query.execution_graph {
            let key = match node.data_source() {
                Some(ds) => match ds.source_id() {
                    Some(sid) => sid,
                    None => continue,
                },
                None => node.node_type().unwrap_or(node.id()),
            };
            if self.without_keys.contains(&key.to_lowercase()) {
                continue;
            }
            registry.register(key, factory.clone());
        }
        for key in &self.extra_keys {
            registry.register(key.clone(), factory.clone());
        }

        let context = Arc::new(TestContext {
            query: Arc::new(query),
            registry,
        });
        let sink: Arc<dyn QueryNode> = Arc::new(RecordingNode {
            config: OperatorConfig::builder(CONTEXT_NODE_ID).build(),
            data_source: false,
            log: log.clone(),
        });
        let planner = Planner::new(context, sink)?;
        Ok((planner, log))
    }
}

pub fn query(nodes: Vec<OperatorConfig>) -> TimeSeriesQuery {
    TimeSeriesQuery {
        execution_graph: nodes,
        serdes_configs: Vec::new(),
    }
}

pub fn query_with_filters(nodes: Vec<OperatorConfig>, filters: &[&str]) -> TimeSeriesQuery {
    TimeSeriesQuery {
        execution_graph: nodes,
        serdes_configs: vec![SerdesConfig {
            id: "json".to_string(),
            filter: filters.iter().map(|f| f.to_string()).collect(),
        }],
    }
}

/// Position of `id` in the event log; panics when absent.
pub fn log_index(log: &EventLog, id: &str) -> usize {
    let entries = log.lock().unwrap();
    entries
        .iter()
        .position(|e| e == id)
        .unwrap_or_else(|| panic!("{id} not found in log {entries:?}"))
}
