#![forbid(unsafe_code)]
//! tsflow-query: contracts between the planner and its collaborators.
//!
//! The planner consumes a [`QueryPipelineContext`] (query + factory
//! registry) and produces a graph of [`QueryNode`] executors. Factories
//! rewrite the config graph through the [`QueryPlanner`] mutator surface
//! while planning runs.

pub mod context;
pub mod factory;
pub mod node;
pub mod registry;

pub use context::QueryPipelineContext;
pub use factory::{QueryNodeFactory, QueryPlanner};
pub use node::QueryNode;
pub use registry::{FactoryRegistry, DEFAULT_SOURCE_KEY};
