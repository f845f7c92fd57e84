//! Factory setup driver: iterate until the config graph stabilizes.
//!
//! Factories may rewrite the graph arbitrarily while they run, and they
//! observe each other's rewrites. The driver walks upward from every data
//! source and restarts the whole pass as soon as a factory mutates the
//! graph; convergence relies on factories being idempotent on stabilized
//! inputs.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::{debug, trace};

use tsflow_core::config::{ConfigNode, CONTEXT_NODE_ID};
use tsflow_core::error::{Error, Result};
use tsflow_core::graph::DiGraph;

use crate::planner::Planner;

/// Mutation detector: node content hashes plus the edge set. Content
/// identity is the `build_hash`, so replacing a node with a semantically
/// different copy registers even when the id is unchanged.
type Fingerprint = (BTreeMap<String, u64>, BTreeSet<(String, String)>);

fn fingerprint(graph: &DiGraph<ConfigNode>) -> Fingerprint {
    let hashes = graph
        .nodes()
        .map(|n| (n.id().to_string(), n.build_hash()))
        .collect();
    let edges = graph.edges().into_iter().collect();
    (hashes, edges)
}

impl Planner {
    /// Run factory setup from every data source until a full traversal
    /// completes without the graph changing.
    pub(crate) fn setup_to_convergence(&mut self) -> Result<()> {
        let mut already_setup: HashSet<u64> = HashSet::new();
        let mut passes = 0u32;
        let mut modified = true;
        while modified {
            if self.source_nodes.is_empty() {
                break;
            }
            passes += 1;
            modified = false;
            let sources: Vec<String> = self.source_nodes.iter().cloned().collect();
            for id in sources {
                // A factory in an earlier slot of this pass may have
                // removed the node.
                if !self.config_graph.contains(&id) {
                    continue;
                }
                modified = self.recursive_setup(&id, &mut already_setup)?;
                if modified {
                    break;
                }
            }
        }
        debug!(passes, "factory setup converged");
        Ok(())
    }

    /// Visit `node_id`, apply rooting/filter wiring, run its factory, then
    /// walk upward. Returns `true` when the graph mutated and the pass must
    /// restart.
    fn recursive_setup(
        &mut self,
        node_id: &str,
        already_setup: &mut HashSet<u64>,
    ) -> Result<bool> {
        let Some(node) = self.config_graph.node(node_id).cloned() else {
            return Ok(false);
        };
        let hash = node.build_hash();

        if !node.is_context() && !already_setup.contains(&hash) {
            let before = fingerprint(&self.config_graph);

            if self.config_graph.predecessors(node_id).is_empty() {
                if self.sink_filter.is_empty() {
                    self.config_graph.add_edge(CONTEXT_NODE_ID, node_id)?;
                } else if !self.sink_filter.contains_key(node_id)
                    && !self.roots.iter().any(|r| r == node_id)
                {
                    // Filtered nodes are wired below instead of rooted.
                    self.roots.push(node_id.to_string());
                }
            }

            if self.sink_filter.contains_key(node_id) {
                // Filtered nodes are wired to the context even when they
                // already have predecessors.
                self.config_graph.add_edge(CONTEXT_NODE_ID, node_id)?;
                self.satisfied_filters.insert(node_id.to_string());
            }

            if let Some(config) = node.as_operator() {
                let key = Planner::factory_key(config);
                let factory = self
                    .get_factory(&key)
                    .ok_or_else(|| Error::NoFactory(key.clone()))?;
                let query = self.query.clone();
                factory.setup_graph(&query, config, self)?;
            }

            already_setup.insert(hash);
            if fingerprint(&self.config_graph) != before {
                trace!(node = node_id, "factory mutated the graph; restarting pass");
                return Ok(true);
            }
        }

        // All done, move up.
        for upstream in self.config_graph.predecessors(node_id).to_vec() {
            if self.recursive_setup(&upstream, already_setup)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
