//! Shared helpers for the optimizer integration tests: a naive reference
//! evaluator over graph values, random test tensors, and tolerance asserts.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::Rng;

use lantern_graph::{ArithmeticMode, Graph, NodeKind, PoolMode, Tensor, Value};

/// Evaluates every save sink against the variables' current payloads.
/// Results are sorted by save-node name so runs are comparable.
#[allow(dead_code)]
pub fn evaluate_saves(graph: &Graph) -> Vec<(String, Tensor)> {
    let mut memo: HashMap<Value, Tensor> = HashMap::new();
    let mut results: Vec<(String, Tensor)> = graph
        .nodes()
        .filter_map(|(_, node)| match &node.kind {
            NodeKind::Save { input, .. } => {
                Some((node.name.clone(), eval(graph, *input, &mut memo)))
            }
            _ => None,
        })
        .collect();
    results.sort_by(|a, b| a.0.cmp(&b.0));
    results
}

/// A deterministic tensor of uniform values in [-1, 1).
#[allow(dead_code)]
pub fn random_tensor(rng: &mut StdRng, dims: &[usize]) -> Tensor {
    let len = dims.iter().product::<usize>();
    let data = (0..len).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
    Tensor::from_vec(dims, data)
}

/// Element-wise tolerance comparison of two tensors.
#[allow(dead_code)]
pub fn assert_all_close(a: &Tensor, b: &Tensor, tolerance: f32) {
    assert_eq!(a.dims(), b.dims(), "tensor shape mismatch");
    for i in 0..a.len() {
        approx::assert_relative_eq!(
            a.raw(i),
            b.raw(i),
            epsilon = tolerance,
            max_relative = tolerance
        );
    }
}

fn eval(graph: &Graph, value: Value, memo: &mut HashMap<Value, Tensor>) -> Tensor {
    if let Some(cached) = memo.get(&value) {
        return cached.clone();
    }
    let result = match value {
        Value::Var(h) => graph[h].payload.clone(),
        Value::Node(h) => {
            let node = &graph[h];
            match &node.kind {
                NodeKind::Convolution {
                    input,
                    filter,
                    bias,
                    kernel,
                    stride,
                    pad,
                    ..
                } => {
                    let x = eval(graph, *input, memo);
                    let w = eval(graph, *filter, memo);
                    let b = eval(graph, *bias, memo);
                    conv2d(&x, &w, &b, *kernel, *stride, *pad)
                }
                NodeKind::BatchNormalization {
                    input,
                    scale,
                    bias,
                    mean,
                    var,
                    channel_idx,
                    epsilon,
                    ..
                } => {
                    let x = eval(graph, *input, memo);
                    let gamma = eval(graph, *scale, memo);
                    let beta = eval(graph, *bias, memo);
                    let mu = eval(graph, *mean, memo);
                    let variance = eval(graph, *var, memo);
                    batch_norm(&x, &gamma, &beta, &mu, &variance, *channel_idx, *epsilon)
                }
                NodeKind::Pool {
                    input,
                    mode,
                    kernel,
                    stride,
                    pad,
                } => {
                    let x = eval(graph, *input, memo);
                    pool(&x, *mode, *kernel, *stride, *pad)
                }
                NodeKind::Relu { input } => {
                    let mut x = eval(graph, *input, memo);
                    for i in 0..x.len() {
                        let clamped = x.raw(i).max(0.0);
                        *x.raw_mut(i) = clamped;
                    }
                    x
                }
                NodeKind::Transpose { input, shuffle } => {
                    let x = eval(graph, *input, memo);
                    transpose(&x, shuffle)
                }
                NodeKind::Concat { inputs, dim } => {
                    let tensors: Vec<Tensor> =
                        inputs.iter().map(|&v| eval(graph, v, memo)).collect();
                    concat(&tensors, *dim)
                }
                NodeKind::Arithmetic { lhs, rhs, mode } => {
                    let a = eval(graph, *lhs, memo);
                    let b = eval(graph, *rhs, memo);
                    arithmetic(&a, &b, *mode)
                }
                NodeKind::Save { input, .. } => eval(graph, *input, memo),
            }
        }
    };
    memo.insert(value, result.clone());
    result
}

fn unravel(dims: &[usize], mut linear: usize) -> Vec<usize> {
    let mut coords = vec![0; dims.len()];
    for axis in (0..dims.len()).rev() {
        coords[axis] = linear % dims[axis];
        linear /= dims[axis];
    }
    coords
}

fn out_dim(size: usize, kernel: usize, stride: usize, pad: usize) -> usize {
    (size + 2 * pad - kernel) / stride + 1
}

fn conv2d(x: &Tensor, w: &Tensor, b: &Tensor, kernel: usize, stride: usize, pad: usize) -> Tensor {
    let (n, h, wd, c) = (x.dims()[0], x.dims()[1], x.dims()[2], x.dims()[3]);
    let depth = w.dims()[0];
    let (oh, ow) = (out_dim(h, kernel, stride, pad), out_dim(wd, kernel, stride, pad));
    let mut out = Tensor::zeros(&[n, oh, ow, depth]);
    for ni in 0..n {
        for ohi in 0..oh {
            for owi in 0..ow {
                for d in 0..depth {
                    let mut acc = 0.0f32;
                    for kh in 0..kernel {
                        for kw in 0..kernel {
                            let ih = (ohi * stride + kh) as isize - pad as isize;
                            let iw = (owi * stride + kw) as isize - pad as isize;
                            if ih < 0 || iw < 0 || ih >= h as isize || iw >= wd as isize {
                                continue;
                            }
                            for ci in 0..c {
                                acc += x.at(&[ni, ih as usize, iw as usize, ci])
                                    * w.at(&[d, kh, kw, ci]);
                            }
                        }
                    }
                    *out.at_mut(&[ni, ohi, owi, d]) = acc + b.at(&[d]);
                }
            }
        }
    }
    out
}

fn batch_norm(
    x: &Tensor,
    gamma: &Tensor,
    beta: &Tensor,
    mu: &Tensor,
    variance: &Tensor,
    channel_idx: usize,
    epsilon: f32,
) -> Tensor {
    let mut out = x.clone();
    for i in 0..out.len() {
        let coords = unravel(x.dims(), i);
        let c = coords[channel_idx];
        let normalized = (x.raw(i) - mu.at(&[c])) / (variance.at(&[c]) + epsilon).sqrt();
        *out.raw_mut(i) = gamma.at(&[c]) * normalized + beta.at(&[c]);
    }
    out
}

fn pool(x: &Tensor, mode: PoolMode, kernel: usize, stride: usize, pad: usize) -> Tensor {
    let (n, h, w, c) = (x.dims()[0], x.dims()[1], x.dims()[2], x.dims()[3]);
    let (oh, ow) = (out_dim(h, kernel, stride, pad), out_dim(w, kernel, stride, pad));
    let mut out = Tensor::zeros(&[n, oh, ow, c]);
    for ni in 0..n {
        for ohi in 0..oh {
            for owi in 0..ow {
                for ci in 0..c {
                    let mut max = f32::NEG_INFINITY;
                    let mut sum = 0.0f32;
                    for kh in 0..kernel {
                        for kw in 0..kernel {
                            let ih = (ohi * stride + kh) as isize - pad as isize;
                            let iw = (owi * stride + kw) as isize - pad as isize;
                            if ih < 0 || iw < 0 || ih >= h as isize || iw >= w as isize {
                                continue;
                            }
                            let v = x.at(&[ni, ih as usize, iw as usize, ci]);
                            max = max.max(v);
                            sum += v;
                        }
                    }
                    *out.at_mut(&[ni, ohi, owi, ci]) = match mode {
                        PoolMode::Max => max,
                        PoolMode::Avg => sum / (kernel * kernel) as f32,
                    };
                }
            }
        }
    }
    out
}

fn transpose(x: &Tensor, shuffle: &[usize]) -> Tensor {
    let out_dims: Vec<usize> = shuffle.iter().map(|&a| x.dims()[a]).collect();
    let mut out = Tensor::zeros(&out_dims);
    for i in 0..out.len() {
        let out_coords = unravel(&out_dims, i);
        let mut in_coords = vec![0; out_coords.len()];
        for (axis, &src) in shuffle.iter().enumerate() {
            in_coords[src] = out_coords[axis];
        }
        *out.raw_mut(i) = x.at(&in_coords);
    }
    out
}

fn concat(tensors: &[Tensor], dim: usize) -> Tensor {
    let mut out_dims = tensors[0].dims().to_vec();
    out_dims[dim] = tensors.iter().map(|t| t.dims()[dim]).sum();
    let mut out = Tensor::zeros(&out_dims);
    let mut offset = 0;
    for t in tensors {
        for i in 0..t.len() {
            let mut coords = unravel(t.dims(), i);
            coords[dim] += offset;
            *out.at_mut(&coords) = t.raw(i);
        }
        offset += t.dims()[dim];
    }
    out
}

fn arithmetic(a: &Tensor, b: &Tensor, mode: ArithmeticMode) -> Tensor {
    assert_eq!(a.dims(), b.dims(), "arithmetic operand shape mismatch");
    let mut out = a.clone();
    for i in 0..out.len() {
        *out.raw_mut(i) = match mode {
            ArithmeticMode::Add => a.raw(i) + b.raw(i),
            ArithmeticMode::Mul => a.raw(i) * b.raw(i),
        };
    }
    out
}
