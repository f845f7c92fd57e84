//! Convenient re-exports for downstream crates.

pub use crate::config::{
    ConfigNode, DataSourceSpec, OperatorConfig, OperatorConfigBuilder, QueryFilter,
    CONTEXT_NODE_ID,
};
pub use crate::error::{Error, Result};
pub use crate::graph::{DiGraph, GraphNode};
pub use crate::hash::Hash256;
pub use crate::query::{SerdesConfig, TimeSeriesQuery};
