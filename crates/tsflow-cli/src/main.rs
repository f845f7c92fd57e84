//! tsflow CLI: plan queries from JSON files and print the result.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info_span, Span};

use tsflow_core::config::{OperatorConfig, CONTEXT_NODE_ID};
use tsflow_core::query::TimeSeriesQuery;
use tsflow_planner::Planner;
use tsflow_query::context::QueryPipelineContext;
use tsflow_query::factory::{QueryNodeFactory, QueryPlanner};
use tsflow_query::node::QueryNode;
use tsflow_query::registry::FactoryRegistry;

#[derive(Parser)]
#[command(name = "tsflow")]
#[command(about = "tsflow: time-series query planning toolkit", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan a query and print the resulting graphs (EXPLAIN)
    Plan {
        /// Path to the query JSON file
        #[arg(short, long)]
        query: PathBuf,

        /// Operator type the sources accept as push-down (repeatable)
        #[arg(long = "pushdown")]
        pushdown: Vec<String>,
    },

    /// Validate a query JSON file (syntax check)
    Validate {
        /// Path to the query JSON file
        #[arg(short, long)]
        query: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Plan { query, pushdown } => {
            if let Err(e) = plan_query(&query, pushdown).await {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Validate { query } => {
            if let Err(e) = validate_query(&query) {
                eprintln!("Validation failed: {}", e);
                std::process::exit(1);
            }
            println!("✓ Query is valid");
        }
    }
}

async fn plan_query(
    query_path: &PathBuf,
    pushdown: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let query = load_query(query_path)?;
    let query = Arc::new(query);

    let factory: Arc<dyn QueryNodeFactory> = Arc::new(PassThroughFactory {
        pushdown_types: pushdown,
    });
    let context = Arc::new(CliContext {
        registry: registry_for(&query, &factory),
        query: query.clone(),
    });

    let sink: Arc<dyn QueryNode> = Arc::new(PassThroughNode {
        config: OperatorConfig::builder(CONTEXT_NODE_ID).build(),
        data_source: false,
    });
    let mut planner = Planner::new(context, sink)?;
    let span = info_span!("plan");
    planner.plan(&span).await?;

    println!("Configuration Graph");
    println!("===================");
    print!("{}", planner.describe_config_graph());
    println!();

    println!("Executor Graph");
    println!("==============");
    for node in planner.graph().nodes() {
        let kind = if node.is_data_source() { "source" } else { "node" };
        println!("[V] {} ({})", node.config().id(), kind);
    }
    for (from, to) in planner.graph().edges() {
        println!("[E] {} => {}", from, to);
    }
    println!();

    println!("Serialization Sources");
    println!("=====================");
    for id in planner.serialization_sources() {
        println!("  {}", id);
    }

    Ok(())
}

fn validate_query(query_path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let _ = load_query(query_path)?;
    Ok(())
}

fn load_query(query_path: &PathBuf) -> Result<TimeSeriesQuery, Box<dyn std::error::Error>> {
    let text = fs::read_to_string(query_path)?;
    let query: TimeSeriesQuery = serde_json::from_str(&text)?;
    Ok(query)
}

/// Register the pass-through factory under every key the query can resolve.
fn registry_for(query: &TimeSeriesQuery, factory: &Arc<dyn QueryNodeFactory>) -> FactoryRegistry {
    let mut registry = FactoryRegistry::new();
    registry.register_default(factory.clone());
    for node in &query.execution_graph {
        let key = node
            .data_source()
            .and_then(|ds| ds.source_id())
            .or(node.node_type())
            .unwrap_or(node.id());
        registry.register(key, factory.clone());
    }
    registry
}

struct CliContext {
    query: Arc<TimeSeriesQuery>,
    registry: FactoryRegistry,
}

impl QueryPipelineContext for CliContext {
    fn query(&self) -> Arc<TimeSeriesQuery> {
        self.query.clone()
    }

    fn registry(&self) -> &FactoryRegistry {
        &self.registry
    }
}

/// Executor that only tracks its config; enough for explain-style planning.
struct PassThroughNode {
    config: OperatorConfig,
    data_source: bool,
}

#[async_trait::async_trait]
impl QueryNode for PassThroughNode {
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

/// Factory that materializes pass-through executors and reports push-down
/// support from the `--pushdown` type list.
struct PassThroughFactory {
    pushdown_types: Vec<String>,
}

impl QueryNodeFactory for PassThroughFactory {
    fn setup_graph(
        &self,
        _query: &TimeSeriesQuery,
        _config: &OperatorConfig,
        _planner: &mut dyn QueryPlanner,
    ) -> tsflow_core::error::Result<()> {
        Ok(())
    }

    fn new_node(
        &self,
        _context: &dyn QueryPipelineContext,
        config: &OperatorConfig,
    ) -> Option<Arc<dyn QueryNode>> {
        Some(Arc::new(PassThroughNode {
            config: config.clone(),
            data_source: config.is_data_source(),
        }))
    }

    fn supports_pushdown(&self, config: &OperatorConfig) -> bool {
        config.node_type().is_some_and(|t| {
            self.pushdown_types
                .iter()
                .any(|p| p.eq_ignore_ascii_case(t))
        })
    }
}
