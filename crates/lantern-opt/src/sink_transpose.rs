//! Transpose sinking pass.
//!
//! Pushes axis-permutation nodes toward the graph sinks so that inverse
//! pairs meet and annihilate. Every rule is axis-tracking: when an operator
//! sinks through a transpose, any axis attribute it carries is remapped
//! through the permutation.
//!
//! The pass walks a snapshot of the node list once and does not revisit
//! nodes it creates; a stack of three or more transposes may need a second
//! `optimize` invocation to fully collapse.

use lantern_graph::{Graph, Handle, Node, NodeKind, Value};

use crate::Pass;

/// Sinks transposes below batch-norm, relu, arithmetic, and concat nodes,
/// and drops inverse transpose pairs.
#[derive(Debug)]
pub struct SinkTranspose;

impl Pass for SinkTranspose {
    fn name(&self) -> &str {
        "sink-transpose"
    }

    fn run(&self, graph: &mut Graph) -> bool {
        let mut changed = false;
        let handles: Vec<Handle<Node>> = graph.nodes().map(|(h, _)| h).collect();
        for handle in handles {
            changed |= sink_below_batch_norm(graph, handle)
                || sink_below_relu(graph, handle)
                || collapse_transpose_pair(graph, handle)
                || sink_below_arithmetic(graph, handle)
                || sink_below_concat(graph, handle);
        }
        changed
    }
}

/// Returns `true` if applying `first` then `second` yields the identity
/// permutation, i.e. the two shuffles are inverses of one another.
fn is_identity_shuffle(first: &[usize], second: &[usize]) -> bool {
    if first.len() != second.len() {
        return false;
    }
    (0..first.len()).all(|i| second[first[i]] == i)
}

/// Matches a transpose behind `value`: `(transpose node, its input, shuffle)`.
fn transpose_input(graph: &Graph, value: Value) -> Option<(Handle<Node>, Value, Vec<usize>)> {
    let handle = value.as_node()?;
    match &graph[handle].kind {
        NodeKind::Transpose { input, shuffle } => Some((handle, *input, shuffle.clone())),
        _ => None,
    }
}

fn sink_below_batch_norm(graph: &mut Graph, handle: Handle<Node>) -> bool {
    let (input, scale, bias, mean, var, channel_idx, epsilon, momentum) = match &graph[handle].kind
    {
        NodeKind::BatchNormalization {
            input,
            scale,
            bias,
            mean,
            var,
            channel_idx,
            epsilon,
            momentum,
        } => (
            *input,
            *scale,
            *bias,
            *mean,
            *var,
            *channel_idx,
            *epsilon,
            *momentum,
        ),
        _ => return false,
    };
    let Some((tr, tr_input, shuffle)) = transpose_input(graph, input) else {
        return false;
    };

    // The channel axis follows the data: axis `channel_idx` of the
    // transposed tensor is axis `shuffle[channel_idx]` of its input.
    let new_channel_idx = shuffle[channel_idx];
    let name = graph[handle].name.clone();
    let tr_name = graph[tr].name.clone();

    let new_bn = graph.create_batch_normalization_with_params(
        &name,
        tr_input,
        scale,
        bias,
        mean,
        var,
        new_channel_idx,
        epsilon,
        momentum,
    );
    let new_tr = graph.create_transpose(&tr_name, Value::Node(new_bn), &shuffle);
    graph.replace_all_uses_of_with(handle, Value::Node(new_tr));
    true
}

fn sink_below_relu(graph: &mut Graph, handle: Handle<Node>) -> bool {
    // TODO: extend to other single-input activations (sigmoid, tanh) once
    // the node set grows them.
    let input = match &graph[handle].kind {
        NodeKind::Relu { input } => *input,
        _ => return false,
    };
    let Some((tr, tr_input, shuffle)) = transpose_input(graph, input) else {
        return false;
    };

    let name = graph[handle].name.clone();
    let tr_name = graph[tr].name.clone();
    let new_relu = graph.create_relu(&name, tr_input);
    let new_tr = graph.create_transpose(&tr_name, Value::Node(new_relu), &shuffle);
    graph.replace_all_uses_of_with(handle, Value::Node(new_tr));
    true
}

fn collapse_transpose_pair(graph: &mut Graph, handle: Handle<Node>) -> bool {
    let (input, shuffle) = match &graph[handle].kind {
        NodeKind::Transpose { input, shuffle } => (*input, shuffle.clone()),
        _ => return false,
    };
    let Some((_, inner_input, inner_shuffle)) = transpose_input(graph, input) else {
        return false;
    };
    assert_eq!(
        shuffle.len(),
        inner_shuffle.len(),
        "permutation rank mismatch between stacked transposes"
    );

    // Only the annihilating case is handled here; general composition of
    // two permutations is left alone.
    if !is_identity_shuffle(&shuffle, &inner_shuffle) {
        return false;
    }
    graph.replace_all_uses_of_with(handle, inner_input);
    true
}

fn sink_below_arithmetic(graph: &mut Graph, handle: Handle<Node>) -> bool {
    let (lhs, rhs, mode) = match &graph[handle].kind {
        NodeKind::Arithmetic { lhs, rhs, mode } => (*lhs, *rhs, *mode),
        _ => return false,
    };
    let Some((ltr, l_input, l_shuffle)) = transpose_input(graph, lhs) else {
        return false;
    };
    let Some((_, r_input, r_shuffle)) = transpose_input(graph, rhs) else {
        return false;
    };
    // Both operands must be permuted the same way.
    if l_shuffle != r_shuffle {
        return false;
    }

    let name = graph[handle].name.clone();
    let tr_name = graph[ltr].name.clone();
    let new_arith = graph.create_arithmetic(&name, l_input, r_input, mode);
    let new_tr = graph.create_transpose(&tr_name, Value::Node(new_arith), &l_shuffle);
    graph.replace_all_uses_of_with(handle, Value::Node(new_tr));
    true
}

fn sink_below_concat(graph: &mut Graph, handle: Handle<Node>) -> bool {
    let (inputs, dim) = match &graph[handle].kind {
        NodeKind::Concat { inputs, dim } => (inputs.clone(), *dim),
        _ => return false,
    };
    assert!(inputs.len() > 1, "invalid number of concat operands");

    // Every input must be a transpose, and all must agree on the shuffle.
    let mut first: Option<(Handle<Node>, Vec<usize>)> = None;
    let mut unwrapped = Vec::with_capacity(inputs.len());
    for &input in &inputs {
        let Some((tr, tr_input, shuffle)) = transpose_input(graph, input) else {
            return false;
        };
        match &first {
            None => first = Some((tr, shuffle)),
            Some((_, first_shuffle)) => {
                if *first_shuffle != shuffle {
                    return false;
                }
            }
        }
        unwrapped.push(tr_input);
    }
    let (first_tr, shuffle) = first.expect("concat has at least two inputs");

    let name = graph[handle].name.clone();
    let tr_name = graph[first_tr].name.clone();
    let new_concat = graph.create_concat(&name, &unwrapped, shuffle[dim]);
    let new_tr = graph.create_transpose(&tr_name, Value::Node(new_concat), &shuffle);
    graph.replace_all_uses_of_with(handle, Value::Node(new_tr));
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use lantern_graph::ArithmeticMode;

    /// The input edge of the only save node in the graph.
    fn save_input(graph: &Graph) -> Value {
        let mut saves = graph
            .nodes()
            .filter_map(|(_, node)| match &node.kind {
                NodeKind::Save { input, .. } => Some(*input),
                _ => None,
            });
        let input = saves.next().expect("graph has a save node");
        assert!(saves.next().is_none(), "graph has a single save node");
        input
    }

    #[test]
    fn identity_shuffle_predicate() {
        assert!(is_identity_shuffle(&[0, 2, 3, 1], &[0, 3, 1, 2]));
        assert!(is_identity_shuffle(&[0, 3, 1, 2], &[0, 2, 3, 1]));
        assert!(!is_identity_shuffle(&[0, 2, 3, 1], &[0, 2, 3, 1]));
        assert!(!is_identity_shuffle(&[0, 1], &[0, 1, 2]));
        assert!(is_identity_shuffle(&[1, 0], &[1, 0]));
    }

    #[test]
    fn relu_sinks_below_transpose() {
        let mut graph = Graph::new();
        let input = Value::Var(graph.create_variable("in", &[1, 4, 4, 3]));
        let tr = graph.create_transpose("tr", input, &[0, 3, 1, 2]);
        let relu = graph.create_relu("relu", Value::Node(tr));
        graph.create_save("ret", Value::Node(relu));

        assert!(SinkTranspose.run(&mut graph));
        graph.verify().unwrap();

        // Save <- Transpose <- Relu <- Var
        let Value::Node(new_tr) = save_input(&graph) else {
            panic!("expected a node");
        };
        let NodeKind::Transpose { input: tr_in, .. } = &graph[new_tr].kind else {
            panic!("expected transpose on top");
        };
        let NodeKind::Relu { input: relu_in } = &graph[tr_in.as_node().unwrap()].kind else {
            panic!("expected relu below the transpose");
        };
        assert_eq!(*relu_in, input);
    }

    #[test]
    fn batch_norm_channel_axis_is_remapped() {
        let mut graph = Graph::new();
        let input = Value::Var(graph.create_variable("in", &[1, 4, 4, 3]));
        // NHWC -> NCHW; the batch norm then normalizes axis 1.
        let tr = graph.create_transpose("tr", input, &[0, 3, 1, 2]);
        let bn = graph.create_batch_normalization("bn", Value::Node(tr), 1, 1e-5, 0.9);
        graph.create_save("ret", Value::Node(bn));

        assert!(SinkTranspose.run(&mut graph));
        graph.verify().unwrap();

        let Value::Node(new_tr) = save_input(&graph) else {
            panic!("expected a node");
        };
        let NodeKind::Transpose { input: tr_in, .. } = &graph[new_tr].kind else {
            panic!("expected transpose on top");
        };
        let NodeKind::BatchNormalization {
            input: bn_in,
            channel_idx,
            ..
        } = &graph[tr_in.as_node().unwrap()].kind
        else {
            panic!("expected batch norm below the transpose");
        };
        // Axis 1 of the NCHW view is axis 3 of the original NHWC tensor.
        assert_eq!(*channel_idx, 3);
        assert_eq!(*bn_in, input);
    }

    #[test]
    fn inverse_transpose_pair_annihilates() {
        let mut graph = Graph::new();
        let input = Value::Var(graph.create_variable("in", &[1, 4, 4, 3]));
        let tr1 = graph.create_transpose("tr1", input, &[0, 3, 1, 2]);
        let tr2 = graph.create_transpose("tr2", Value::Node(tr1), &[0, 2, 3, 1]);
        graph.create_save("ret", Value::Node(tr2));

        assert!(SinkTranspose.run(&mut graph));
        graph.verify().unwrap();
        assert_eq!(save_input(&graph), input);
    }

    #[test]
    fn non_inverse_transpose_pair_is_left_alone() {
        let mut graph = Graph::new();
        let input = Value::Var(graph.create_variable("in", &[1, 4, 4, 3]));
        let tr1 = graph.create_transpose("tr1", input, &[0, 2, 3, 1]);
        let tr2 = graph.create_transpose("tr2", Value::Node(tr1), &[0, 2, 3, 1]);
        graph.create_save("ret", Value::Node(tr2));

        assert!(!SinkTranspose.run(&mut graph));
        assert_eq!(save_input(&graph), Value::Node(tr2));
    }

    #[test]
    fn arithmetic_sinks_when_shuffles_agree() {
        let mut graph = Graph::new();
        let a = Value::Var(graph.create_variable("a", &[1, 4, 4, 3]));
        let b = Value::Var(graph.create_variable("b", &[1, 4, 4, 3]));
        let ta = graph.create_transpose("ta", a, &[0, 3, 1, 2]);
        let tb = graph.create_transpose("tb", b, &[0, 3, 1, 2]);
        let add = graph.create_arithmetic(
            "add",
            Value::Node(ta),
            Value::Node(tb),
            ArithmeticMode::Add,
        );
        graph.create_save("ret", Value::Node(add));

        assert!(SinkTranspose.run(&mut graph));
        graph.verify().unwrap();

        let Value::Node(new_tr) = save_input(&graph) else {
            panic!("expected a node");
        };
        let NodeKind::Transpose { input: tr_in, .. } = &graph[new_tr].kind else {
            panic!("expected transpose on top");
        };
        let NodeKind::Arithmetic { lhs, rhs, .. } = &graph[tr_in.as_node().unwrap()].kind else {
            panic!("expected arithmetic below the transpose");
        };
        assert_eq!(*lhs, a);
        assert_eq!(*rhs, b);
    }

    #[test]
    fn arithmetic_bails_on_differing_shuffles() {
        let mut graph = Graph::new();
        let a = Value::Var(graph.create_variable("a", &[1, 4, 4, 4]));
        let b = Value::Var(graph.create_variable("b", &[1, 4, 4, 4]));
        let ta = graph.create_transpose("ta", a, &[0, 3, 1, 2]);
        let tb = graph.create_transpose("tb", b, &[0, 2, 3, 1]);
        let add = graph.create_arithmetic(
            "add",
            Value::Node(ta),
            Value::Node(tb),
            ArithmeticMode::Add,
        );
        graph.create_save("ret", Value::Node(add));

        assert!(!SinkTranspose.run(&mut graph));
        assert_eq!(save_input(&graph), Value::Node(add));
    }

    #[test]
    fn concat_sinks_and_remaps_its_axis() {
        let mut graph = Graph::new();
        let a = Value::Var(graph.create_variable("a", &[1, 4, 4, 3]));
        let b = Value::Var(graph.create_variable("b", &[1, 4, 4, 3]));
        let ta = graph.create_transpose("ta", a, &[0, 3, 1, 2]);
        let tb = graph.create_transpose("tb", b, &[0, 3, 1, 2]);
        let cc = graph.create_concat("cc", &[Value::Node(ta), Value::Node(tb)], 1);
        graph.create_save("ret", Value::Node(cc));

        assert!(SinkTranspose.run(&mut graph));
        graph.verify().unwrap();

        let Value::Node(new_tr) = save_input(&graph) else {
            panic!("expected a node");
        };
        let NodeKind::Transpose { input: tr_in, .. } = &graph[new_tr].kind else {
            panic!("expected transpose on top");
        };
        let NodeKind::Concat { inputs, dim } = &graph[tr_in.as_node().unwrap()].kind else {
            panic!("expected concat below the transpose");
        };
        // Axis 1 of the NCHW views is axis 3 of the NHWC originals.
        assert_eq!(*dim, 3);
        assert_eq!(inputs.as_slice(), &[a, b]);
    }

    #[test]
    fn concat_bails_when_an_input_is_not_a_transpose() {
        let mut graph = Graph::new();
        let a = Value::Var(graph.create_variable("a", &[1, 3, 4, 4]));
        let b = Value::Var(graph.create_variable("b", &[1, 4, 4, 3]));
        let tb = graph.create_transpose("tb", b, &[0, 3, 1, 2]);
        let cc = graph.create_concat("cc", &[a, Value::Node(tb)], 1);
        graph.create_save("ret", Value::Node(cc));

        assert!(!SinkTranspose.run(&mut graph));
        assert_eq!(save_input(&graph), Value::Node(cc));
    }
}
