//! Criterion benchmark: plan a deep linear chain of push-down operators.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use tracing::Span;

use tsflow_core::config::{OperatorConfig, CONTEXT_NODE_ID};
use tsflow_core::query::TimeSeriesQuery;
use tsflow_planner::Planner;
use tsflow_query::context::QueryPipelineContext;
use tsflow_query::factory::QueryNodeFactory;
use tsflow_query::node::QueryNode;
use tsflow_query::registry::FactoryRegistry;

struct BenchNode {
    config: OperatorConfig,
    data_source: bool,
}

#[async_trait::async_trait]
impl QueryNode for BenchNode {
    fn config(&self) -> &OperatorConfig {
        &self.config
    }

    fn is_data_source(&self) -> bool {
        self.data_source
    }

    async fn initialize(&self, _span: &Span) -> tsflow_core::error::Result<()> {
        Ok(())
    }
}

struct BenchFactory;

impl QueryNodeFactory for BenchFactory {
    fn setup_graph(
        &self,
        _query: &TimeSeriesQuery,
        _config: &OperatorConfig,
        _planner: &mut dyn tsflow_query::factory::QueryPlanner,
    ) -> tsflow_core::error::Result<()> {
        Ok(())
    }

    fn new_node(
        &self,
        _context: &dyn QueryPipelineContext,
        config: &OperatorConfig,
    ) -> Option<Arc<dyn QueryNode>> {
        Some(Arc::new(BenchNode {
            config: config.clone(),
            data_source: config.is_data_source(),
        }))
    }

    fn supports_pushdown(&self, config: &OperatorConfig) -> bool {
        config.node_type() == Some("stage")
    }
}

struct BenchContext {
    query: Arc<TimeSeriesQuery>,
    registry: FactoryRegistry,
}

impl QueryPipelineContext for BenchContext {
    fn query(&self) -> Arc<TimeSeriesQuery> {
        self.query.clone()
    }

    fn registry(&self) -> &FactoryRegistry {
        &self.registry
    }
}

/// `stage_0 → stage_1 → … → stage_{depth-1} → source`, every stage eligible
/// for push-down so planning exercises the whole fold.
fn chain_query(depth: usize) -> TimeSeriesQuery {
    let mut nodes = Vec::with_capacity(depth + 1);
    for i in 0..depth {
        let downstream = if i + 1 == depth {
            "source".to_string()
        } else {
            format!("stage_{}", i + 1)
        };
        nodes.push(
            OperatorConfig::builder(format!("stage_{i}"))
                .node_type("stage")
                .source(downstream)
                .push_down(true)
                .build(),
        );
    }
    nodes.push(OperatorConfig::builder("source").data_source().build());
    TimeSeriesQuery {
        execution_graph: nodes,
        serdes_configs: Vec::new(),
    }
}

fn planner_for(depth: usize) -> Planner {
    let factory: Arc<dyn QueryNodeFactory> = Arc::new(BenchFactory);
    let mut registry = FactoryRegistry::new();
    registry.register_default(factory.clone());
    registry.register("stage", factory);
    let context = Arc::new(BenchContext {
        query: Arc::new(chain_query(depth)),
        registry,
    });
    let sink: Arc<dyn QueryNode> = Arc::new(BenchNode {
        config: OperatorConfig::builder(CONTEXT_NODE_ID).build(),
        data_source: false,
    });
    Planner::new(context, sink).expect("planner construction")
}

fn bench_plan(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
    c.bench_function("plan_linear_chain_64", |b| {
        b.iter(|| {
            let mut planner = planner_for(64);
            rt.block_on(planner.plan(&Span::none())).expect("plan");
        })
    });
}

criterion_group!(benches, bench_plan);
criterion_main!(benches);
