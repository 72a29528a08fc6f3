//! Pool reordering pass.
//!
//! Swaps `MaxPool(Relu(x))` into `Relu(MaxPool(x))`. Max over a window of
//! values clamped at zero equals the clamp of the max, so the two commute;
//! running the relu after the pool touches the smaller tensor and lets the
//! pool's buffer be reused.

use lantern_graph::{Graph, Handle, Node, NodeKind, PoolMode, Value};

use crate::Pass;

/// Moves relu below max-pool when the relu has a single user.
#[derive(Debug)]
pub struct OptimizePool;

impl Pass for OptimizePool {
    fn name(&self) -> &str {
        "optimize-pool"
    }

    fn run(&self, graph: &mut Graph) -> bool {
        let mut changed = false;
        let handles: Vec<Handle<Node>> = graph.nodes().map(|(h, _)| h).collect();
        for handle in handles {
            changed |= swap_relu_below_max_pool(graph, handle);
        }
        changed
    }
}

fn swap_relu_below_max_pool(graph: &mut Graph, handle: Handle<Node>) -> bool {
    let (input, kernel, stride, pad) = match &graph[handle].kind {
        // The equivalence holds for max pooling only.
        NodeKind::Pool {
            input,
            mode: PoolMode::Max,
            kernel,
            stride,
            pad,
        } => (*input, *kernel, *stride, *pad),
        _ => return false,
    };
    let Some(relu) = input.as_node() else {
        return false;
    };
    let relu_input = match &graph[relu].kind {
        NodeKind::Relu { input } => *input,
        _ => return false,
    };
    // A relu with other users would have to be computed twice after the
    // swap; keep the operation count flat.
    if !graph[relu].has_one_use() {
        return false;
    }

    let pool_name = graph[handle].name.clone();
    let relu_name = graph[relu].name.clone();
    let new_pool = graph.create_pool(&pool_name, relu_input, PoolMode::Max, kernel, stride, pad);
    let new_relu = graph.create_relu(&relu_name, Value::Node(new_pool));
    graph.replace_all_uses_of_with(handle, Value::Node(new_relu));
    true
}
