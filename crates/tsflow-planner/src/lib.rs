#![forbid(unsafe_code)]
//! tsflow-planner: turns a logical execution graph into an initialized
//! executor graph, ready to stream results to the context sink.
//!
//! Planning phases, in order:
//!
//! 1. Build the config graph from the query (duplicate-id and cycle checks).
//! 2. Let factories rewrite the graph, restarting until it stabilizes.
//! 3. Initialize data source filters (async, joined as a group).
//! 4. Verify sink filter satisfaction.
//! 5. Fold push-down operators into their sources.
//! 6. Compute the serialization sources the sink should expect.
//! 7. Materialize executors bottom-up and initialize them depth-first.

mod build;
mod filters;
mod planner;
mod pushdown;
mod setup;

pub use planner::Planner;
