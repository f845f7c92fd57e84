#![forbid(unsafe_code)]
//! Facade crate re-exporting the tsflow planning stack.

pub use tsflow_core::prelude::*;
pub use tsflow_planner::Planner;
pub use tsflow_query::{
    FactoryRegistry, QueryNode, QueryNodeFactory, QueryPipelineContext, QueryPlanner,
    DEFAULT_SOURCE_KEY,
};
