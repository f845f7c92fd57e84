//! Operator configuration model: the vertices of the config graph.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use blake3::Hasher;
use serde::{Deserialize, Serialize};
use tracing::Span;

use crate::error::Result;
use crate::graph::GraphNode;
use crate::hash::{hash_str, Hash256};

/// Id of the synthetic sentinel at the top of every config graph. The
/// externally supplied context sink executor answers to the same id.
pub const CONTEXT_NODE_ID: &str = "QueryContext";

/// Filter attached to a data source. Filters may resolve external state and
/// are initialized before planning continues past the setup phase.
#[async_trait]
pub trait QueryFilter: fmt::Debug + Send + Sync {
    async fn initialize(&self, span: &Span) -> Result<()>;
}

/// Declarative description of one operator in the execution graph.
///
/// Identity is content-addressed: two configs with equal [`build_hash`]
/// values are treated as the same config by the planner.
///
/// [`build_hash`]: OperatorConfig::build_hash
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorConfig {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    node_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    sources: Vec<String>,
    #[serde(default)]
    push_down: bool,
    #[serde(default)]
    joins: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data_source: Option<DataSourceSpec>,
}

/// Extra state carried by data source configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataSourceSpec {
    /// Factory key of the backing store; `None` selects the registry's
    /// default data source factory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_id: Option<String>,
    #[serde(skip)]
    filter: Option<Arc<dyn QueryFilter>>,
    /// Operators the source executes inline, in dataflow order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    push_down_nodes: Vec<OperatorConfig>,
}

impl DataSourceSpec {
    pub fn source_id(&self) -> Option<&str> {
        self.source_id.as_deref()
    }

    pub fn filter(&self) -> Option<&Arc<dyn QueryFilter>> {
        self.filter.as_ref()
    }

    pub fn push_down_nodes(&self) -> &[OperatorConfig] {
        &self.push_down_nodes
    }
}

impl OperatorConfig {
    pub fn builder(id: impl Into<String>) -> OperatorConfigBuilder {
        OperatorConfigBuilder {
            id: id.into(),
            node_type: None,
            sources: Vec::new(),
            push_down: false,
            joins: false,
            data_source: None,
        }
    }

    /// A builder seeded with this config's state, for producing modified
    /// copies.
    pub fn to_builder(&self) -> OperatorConfigBuilder {
        OperatorConfigBuilder {
            id: self.id.clone(),
            node_type: self.node_type.clone(),
            sources: self.sources.clone(),
            push_down: self.push_down,
            joins: self.joins,
            data_source: self.data_source.clone(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn node_type(&self) -> Option<&str> {
        self.node_type.as_deref()
    }

    /// Ids of the upstream configs this operator consumes.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Whether this operator may be folded into a data source.
    pub fn push_down(&self) -> bool {
        self.push_down
    }

    /// Whether this operator merges multiple result streams.
    pub fn joins(&self) -> bool {
        self.joins
    }

    pub fn data_source(&self) -> Option<&DataSourceSpec> {
        self.data_source.as_ref()
    }

    pub fn is_data_source(&self) -> bool {
        self.data_source.is_some()
    }

    /// Stable 64-bit hash over semantic identity. Filter handles are not
    /// part of identity; nested push-down configs are.
    pub fn build_hash(&self) -> u64 {
        let mut h = Hasher::new();
        feed(&mut h, self.id.as_bytes());
        match &self.node_type {
            Some(t) => {
                h.update(&[1]);
                feed(&mut h, t.as_bytes());
            }
            None => {
                h.update(&[0]);
            }
        }
        h.update(&(self.sources.len() as u64).to_le_bytes());
        for s in &self.sources {
            feed(&mut h, s.as_bytes());
        }
        h.update(&[self.push_down as u8, self.joins as u8]);
        match &self.data_source {
            Some(ds) => {
                h.update(&[1]);
                match &ds.source_id {
                    Some(sid) => {
                        h.update(&[1]);
                        feed(&mut h, sid.as_bytes());
                    }
                    None => {
                        h.update(&[0]);
                    }
                }
                h.update(&(ds.push_down_nodes.len() as u64).to_le_bytes());
                for n in &ds.push_down_nodes {
                    h.update(&n.build_hash().to_le_bytes());
                }
            }
            None => {
                h.update(&[0]);
            }
        }
        Hash256(h.finalize().into()).as_u64()
    }
}

// Length-prefix variable fields so adjacent values cannot alias.
fn feed(h: &mut Hasher, bytes: &[u8]) {
    h.update(&(bytes.len() as u64).to_le_bytes());
    h.update(bytes);
}

/// Consuming builder for [`OperatorConfig`].
#[derive(Debug, Clone)]
pub struct OperatorConfigBuilder {
    id: String,
    node_type: Option<String>,
    sources: Vec<String>,
    push_down: bool,
    joins: bool,
    data_source: Option<DataSourceSpec>,
}

impl OperatorConfigBuilder {
    pub fn node_type(mut self, node_type: impl Into<String>) -> Self {
        self.node_type = Some(node_type.into());
        self
    }

    /// Append one upstream source id.
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.sources.push(source.into());
        self
    }

    /// Replace the upstream source id list.
    pub fn sources(mut self, sources: Vec<String>) -> Self {
        self.sources = sources;
        self
    }

    pub fn push_down(mut self, push_down: bool) -> Self {
        self.push_down = push_down;
        self
    }

    pub fn joins(mut self, joins: bool) -> Self {
        self.joins = joins;
        self
    }

    /// Mark the config as a data source (with no source id).
    pub fn data_source(mut self) -> Self {
        self.data_source.get_or_insert_with(Default::default);
        self
    }

    /// Mark the config as a data source backed by `source_id`.
    pub fn source_id(mut self, source_id: impl Into<String>) -> Self {
        self.data_source
            .get_or_insert_with(Default::default)
            .source_id = Some(source_id.into());
        self
    }

    /// Attach a filter; marks the config as a data source.
    pub fn filter(mut self, filter: Arc<dyn QueryFilter>) -> Self {
        self.data_source.get_or_insert_with(Default::default).filter = Some(filter);
        self
    }

    /// Set the inline operator list; marks the config as a data source.
    pub fn push_down_nodes(mut self, nodes: Vec<OperatorConfig>) -> Self {
        self.data_source
            .get_or_insert_with(Default::default)
            .push_down_nodes = nodes;
        self
    }

    pub fn build(self) -> OperatorConfig {
        OperatorConfig {
            id: self.id,
            node_type: self.node_type,
            sources: self.sources,
            push_down: self.push_down,
            joins: self.joins,
            data_source: self.data_source,
        }
    }
}

/// A vertex in the config graph: the synthetic context sentinel or a real
/// operator. The sentinel never pushes down, never joins, and hashes to a
/// fixed value so plans stay stable across processes.
#[derive(Debug, Clone)]
pub enum ConfigNode {
    Context,
    Operator(OperatorConfig),
}

impl ConfigNode {
    pub fn id(&self) -> &str {
        match self {
            ConfigNode::Context => CONTEXT_NODE_ID,
            ConfigNode::Operator(config) => config.id(),
        }
    }

    pub fn is_context(&self) -> bool {
        matches!(self, ConfigNode::Context)
    }

    pub fn as_operator(&self) -> Option<&OperatorConfig> {
        match self {
            ConfigNode::Context => None,
            ConfigNode::Operator(config) => Some(config),
        }
    }

    pub fn is_data_source(&self) -> bool {
        self.as_operator().is_some_and(OperatorConfig::is_data_source)
    }

    pub fn push_down(&self) -> bool {
        self.as_operator().is_some_and(OperatorConfig::push_down)
    }

    pub fn joins(&self) -> bool {
        self.as_operator().is_some_and(OperatorConfig::joins)
    }

    pub fn build_hash(&self) -> u64 {
        match self {
            ConfigNode::Context => hash_str(CONTEXT_NODE_ID).as_u64(),
            ConfigNode::Operator(config) => config.build_hash(),
        }
    }
}

impl From<OperatorConfig> for ConfigNode {
    fn from(config: OperatorConfig) -> Self {
        ConfigNode::Operator(config)
    }
}

impl GraphNode for ConfigNode {
    fn node_id(&self) -> &str {
        self.id()
    }
}
