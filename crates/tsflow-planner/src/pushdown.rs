//! Push-down: fold eligible upstream operators into their data source.
//!
//! For each source the planner walks its upstream chain on a snapshot of the
//! config graph (stable enumeration while the live graph mutates). An
//! operator folds when its factory supports push-down for its shape, the
//! config allows it, and every live consumer of its output is already part
//! of the fold. Folded operators are recorded nearest-to-source first — the
//! order the source must apply them in — and removed from the live graph;
//! ineligible operators above a folded chain are re-wired straight to the
//! source.

use tracing::debug;

use tsflow_core::config::{ConfigNode, OperatorConfig};
use tsflow_core::error::{Error, Result};
use tsflow_core::graph::DiGraph;
use tsflow_query::factory::{QueryNodeFactory, QueryPlanner};

use crate::planner::Planner;

impl Planner {
    /// Fold what can run inside each data source into that source's config,
    /// replacing the source with a rebuilt copy carrying the folded list.
    pub(crate) fn push_down_all(&mut self) -> Result<()> {
        let sources: Vec<String> = self.source_nodes.iter().cloned().collect();
        for source_id in sources {
            let Some(node) = self.config_graph.node(&source_id).cloned() else {
                continue;
            };
            let Some(config) = node.as_operator() else {
                continue;
            };
            let key = Planner::factory_key(config);
            let factory = self
                .get_factory(&key)
                .ok_or_else(|| Error::NoFactory(key))?;

            let snapshot = self.config_graph.clone();
            let mut push_downs: Vec<OperatorConfig> = Vec::new();
            for pred in snapshot.predecessors(&source_id).to_vec() {
                self.push_down(&source_id, factory.as_ref(), &pred, &mut push_downs, &snapshot)?;
            }

            if push_downs.is_empty() {
                continue;
            }
            debug!(
                source = %source_id,
                folded = push_downs.len(),
                "pushed operators into source"
            );
            let rebuilt = config.to_builder().push_down_nodes(push_downs).build();
            self.replace(config, rebuilt)?;
        }
        Ok(())
    }

    /// Try to fold `node_id` into `source_id`; returns whether it folded.
    ///
    /// An ineligible node is re-wired to consume the source directly, since
    /// everything that used to sit between them is being folded away.
    fn push_down(
        &mut self,
        source_id: &str,
        factory: &dyn QueryNodeFactory,
        node_id: &str,
        push_downs: &mut Vec<OperatorConfig>,
        snapshot: &DiGraph<ConfigNode>,
    ) -> Result<bool> {
        if !self.config_graph.contains(node_id) {
            // Already folded through another branch of the walk.
            return Ok(true);
        }
        let Some(node) = snapshot.node(node_id) else {
            return Ok(false);
        };

        let eligible = node
            .as_operator()
            .is_some_and(|c| factory.supports_pushdown(c) && c.push_down());
        // A node whose output feeds anything outside the fold has to stay
        // behind as well.
        let foldable = eligible
            && self.config_graph.successors(node_id).iter().all(|succ| {
                succ == source_id || push_downs.iter().any(|c| c.id() == succ)
            });

        if !foldable {
            if !self.config_graph.has_edge(node_id, source_id) {
                self.config_graph.add_edge(node_id, source_id)?;
            }
            return Ok(false);
        }

        if let Some(config) = node.as_operator() {
            push_downs.push(config.clone());
        }
        for pred in snapshot.predecessors(node_id).to_vec() {
            self.push_down(source_id, factory, &pred, push_downs, snapshot)?;
        }

        // The operator now lives inside the source.
        self.config_graph.remove_node(node_id);
        self.source_nodes.remove(node_id);
        Ok(true)
    }
}
