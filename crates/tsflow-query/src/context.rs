//! The planner's window into the surrounding query pipeline.

use std::sync::Arc;

use tsflow_core::query::TimeSeriesQuery;

use crate::registry::FactoryRegistry;

pub trait QueryPipelineContext: Send + Sync {
    /// The query being planned.
    fn query(&self) -> Arc<TimeSeriesQuery>;

    /// Registry used to resolve operator factories.
    fn registry(&self) -> &FactoryRegistry;
}
