//! The query model consumed by the planner.

use serde::{Deserialize, Serialize};

use crate::config::OperatorConfig;

/// A user query: the logical execution graph plus serialization options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeSeriesQuery {
    /// Operator configs in no particular order; edges come from each
    /// config's `sources` list.
    #[serde(default)]
    pub execution_graph: Vec<OperatorConfig>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub serdes_configs: Vec<SerdesConfig>,
}

/// Serialization options attached to a query. The `filter` entries select
/// which node ids the sink consumes, in `"<nodeId>"` or
/// `"<nodeId>:<sourceHint>"` form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SerdesConfig {
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filter: Vec<String>,
}
