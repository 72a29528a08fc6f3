//! Dead code elimination pass.
//!
//! Removes operation nodes that have no users (save sinks excepted), then
//! sweeps parameter variables no surviving node references.

use lantern_graph::{Graph, NodeKind};

use crate::Pass;

/// Removes unreachable nodes and unreferenced variables.
#[derive(Debug, Default)]
pub struct DeadCodeElimination {
    /// Skip the variable sweep, keeping variables alive even with no
    /// internal users. Variables are the interface to the user program;
    /// callers that hand out variable handles across the optimization
    /// boundary can set this to avoid invalidating them.
    pub keep_variables: bool,
}

impl Pass for DeadCodeElimination {
    fn name(&self) -> &str {
        "dce"
    }

    fn run(&self, graph: &mut Graph) -> bool {
        let mut changed = false;

        // Removing a node can strand its producers, so iterate the node
        // scan to a fixed point.
        loop {
            let dead: Vec<_> = graph
                .nodes()
                .filter(|(_, node)| {
                    !node.has_users() && !matches!(node.kind, NodeKind::Save { .. })
                })
                .map(|(handle, _)| handle)
                .collect();
            if dead.is_empty() {
                break;
            }
            for handle in dead {
                graph.erase_node(handle);
                changed = true;
            }
        }

        if !self.keep_variables {
            let dead: Vec<_> = graph
                .variables()
                .filter(|(_, var)| !var.has_users())
                .map(|(handle, _)| handle)
                .collect();
            for handle in dead {
                graph.erase_variable(handle);
                changed = true;
            }
        }

        changed
    }
}
