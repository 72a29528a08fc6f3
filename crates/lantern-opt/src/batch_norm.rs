//! Batch-normalization folding pass.
//!
//! With frozen statistics, a batch normalization is the per-channel affine
//! transform `y = A*x + B` with `A = gamma / sqrt(var + eps)` and
//! `B = beta - mean * A`. Composed with the convolution feeding it,
//! `(conv(X, W) + b) * A + B == conv(X, W*A) + (b*A + B)`, so the whole
//! normalization folds into the convolution's filter and bias tensors and
//! the node disappears. Inference only; training keeps live statistics.

use lantern_graph::{Graph, Handle, Node, NodeKind, Value, Variable};

use crate::Pass;

/// Folds batch normalization into the preceding convolution's weights.
#[derive(Debug)]
pub struct BatchNormFolding;

impl Pass for BatchNormFolding {
    fn name(&self) -> &str {
        "batchnorm-fold"
    }

    fn run(&self, graph: &mut Graph) -> bool {
        let mut changed = false;
        let handles: Vec<Handle<Node>> = graph.nodes().map(|(h, _)| h).collect();
        for handle in handles {
            changed |= fold_into_convolution(graph, handle);
        }
        changed
    }
}

fn param(graph: &Graph, value: Value, what: &str) -> Handle<Variable> {
    value
        .as_var()
        .unwrap_or_else(|| panic!("{what} must be a variable"))
}

fn fold_into_convolution(graph: &mut Graph, handle: Handle<Node>) -> bool {
    let (input, scale, bias, mean, var, epsilon) = match &graph[handle].kind {
        NodeKind::BatchNormalization {
            input,
            scale,
            bias,
            mean,
            var,
            epsilon,
            ..
        } => (*input, *scale, *bias, *mean, *var, *epsilon),
        _ => return false,
    };
    let Some(conv) = input.as_node() else {
        return false;
    };
    let (filter, conv_bias) = match &graph[conv].kind {
        NodeKind::Convolution { filter, bias, .. } => (*filter, *bias),
        _ => return false,
    };
    // Rewriting the weights would silently change the result seen by any
    // other consumer of the convolution.
    if !graph[conv].has_one_use() {
        return false;
    }

    let scale_v = graph[param(graph, scale, "batch-norm scale")]
        .payload
        .data()
        .to_vec();
    let bias_v = graph[param(graph, bias, "batch-norm bias")]
        .payload
        .data()
        .to_vec();
    let mean_v = graph[param(graph, mean, "batch-norm mean")]
        .payload
        .data()
        .to_vec();
    let var_v = graph[param(graph, var, "batch-norm variance")]
        .payload
        .data()
        .to_vec();

    let filter_h = param(graph, filter, "convolution filter");
    let conv_bias_h = param(graph, conv_bias, "convolution bias");

    // Axis 0 of the filter is the output channel; the per-channel
    // parameters must line up with it.
    assert_eq!(
        graph[filter_h].payload.dims()[0],
        scale_v.len(),
        "filter output-channel extent must match the batch-norm channel count"
    );

    let filter_t = &mut graph[filter_h].payload;
    for i in 0..filter_t.len() {
        let channel = filter_t.dim_for_linear(0, i);
        let stdvar = 1.0 / (var_v[channel] + epsilon).sqrt();
        let a = scale_v[channel] * stdvar;
        *filter_t.raw_mut(i) *= a;
    }

    let bias_t = &mut graph[conv_bias_h].payload;
    for i in 0..bias_t.len() {
        let channel = bias_t.dim_for_linear(0, i);
        let stdvar = 1.0 / (var_v[channel] + epsilon).sqrt();
        let a = scale_v[channel] * stdvar;
        let b = bias_v[channel] - mean_v[channel] * a;
        let prev = bias_t.raw(i);
        *bias_t.raw_mut(i) = prev * a + b;
    }

    graph.replace_all_uses_of_with(handle, Value::Node(conv));
    true
}
