//! The computation graph: operation nodes, parameter variables, use-lists.
//!
//! The graph is the unique owner of its nodes and variables. Every edge from
//! a consumer's input slot to a producer is mirrored by exactly one [`Use`]
//! entry on the producer, maintained by the single pair of helpers that
//! attach and detach edges. Rewrites therefore preserve use-list integrity
//! by construction.

use std::collections::HashMap;
use std::ops::{Index, IndexMut};

use crate::arena::{Arena, Handle};
use crate::error::GraphError;
use crate::tensor::Tensor;
use crate::types::{ElemKind, Type};

/// An edge payload: a reference to the output of a node or to a variable.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Value {
    /// The output of an operation node.
    Node(Handle<Node>),
    /// A parameter variable.
    Var(Handle<Variable>),
}

impl Value {
    /// Returns the node handle if this value is a node output.
    pub fn as_node(self) -> Option<Handle<Node>> {
        match self {
            Self::Node(h) => Some(h),
            Self::Var(_) => None,
        }
    }

    /// Returns the variable handle if this value is a variable.
    pub fn as_var(self) -> Option<Handle<Variable>> {
        match self {
            Self::Var(h) => Some(h),
            Self::Node(_) => None,
        }
    }
}

/// One entry in a producer's use-list: which consumer, which input slot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Use {
    /// The consuming node.
    pub consumer: Handle<Node>,
    /// The input slot on the consumer that references the producer.
    pub slot: usize,
}

/// Pooling mode.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PoolMode {
    /// Maximum over the window.
    Max,
    /// Average over the window.
    Avg,
}

/// Element-wise arithmetic mode.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ArithmeticMode {
    /// Element-wise addition.
    Add,
    /// Element-wise multiplication.
    Mul,
}

/// The operation performed by a node, with per-variant attributes.
///
/// This is a closed union: rewrites pattern-match on the variant, and new
/// operators extend the enum (and, where behaviorally relevant, the passes
/// that care about them).
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    /// 2-D convolution over an NHWC input with a channel-major filter
    /// (`[depth, kernel, kernel, channels]`, axis 0 is the output channel).
    Convolution {
        /// NHWC input activation.
        input: Value,
        /// Filter variable.
        filter: Value,
        /// Bias variable, one element per output channel.
        bias: Value,
        /// Number of output channels.
        depth: usize,
        /// Square kernel extent.
        kernel: usize,
        /// Stride in both spatial axes.
        stride: usize,
        /// Zero padding in both spatial axes.
        pad: usize,
    },
    /// Batch normalization over the axis `channel_idx`.
    BatchNormalization {
        /// Input activation.
        input: Value,
        /// Per-channel scale (gamma).
        scale: Value,
        /// Per-channel bias (beta).
        bias: Value,
        /// Per-channel running mean.
        mean: Value,
        /// Per-channel running variance.
        var: Value,
        /// The axis the per-channel parameters index.
        channel_idx: usize,
        /// Stabilizer added to the variance inside the square root.
        epsilon: f32,
        /// Running-statistics momentum.
        momentum: f32,
    },
    /// Spatial pooling over an NHWC input.
    Pool {
        /// NHWC input activation.
        input: Value,
        /// Pooling mode.
        mode: PoolMode,
        /// Square window extent.
        kernel: usize,
        /// Stride in both spatial axes.
        stride: usize,
        /// Zero padding in both spatial axes.
        pad: usize,
    },
    /// Rectified linear activation.
    Relu {
        /// Input activation.
        input: Value,
    },
    /// Axis permutation: output axis `i` takes input axis `shuffle[i]`.
    Transpose {
        /// Input tensor.
        input: Value,
        /// The permutation.
        shuffle: Vec<usize>,
    },
    /// Concatenation of two or more tensors along one axis.
    Concat {
        /// Inputs, in order.
        inputs: Vec<Value>,
        /// The concatenation axis.
        dim: usize,
    },
    /// Element-wise binary arithmetic.
    Arithmetic {
        /// Left operand.
        lhs: Value,
        /// Right operand.
        rhs: Value,
        /// Operation.
        mode: ArithmeticMode,
    },
    /// An observable output sink. Never removed by dead-code elimination.
    Save {
        /// The value to save.
        input: Value,
        /// The variable the result is written to.
        output: Value,
    },
}

impl NodeKind {
    /// Short operation name for diagnostics.
    pub fn op_name(&self) -> &'static str {
        match self {
            Self::Convolution { .. } => "conv",
            Self::BatchNormalization { .. } => "batchnorm",
            Self::Pool { .. } => "pool",
            Self::Relu { .. } => "relu",
            Self::Transpose { .. } => "transpose",
            Self::Concat { .. } => "concat",
            Self::Arithmetic { .. } => "arithmetic",
            Self::Save { .. } => "save",
        }
    }

    /// All input edges in slot order.
    pub fn inputs(&self) -> Vec<Value> {
        match self {
            Self::Convolution {
                input, filter, bias, ..
            } => vec![*input, *filter, *bias],
            Self::BatchNormalization {
                input,
                scale,
                bias,
                mean,
                var,
                ..
            } => vec![*input, *scale, *bias, *mean, *var],
            Self::Pool { input, .. } | Self::Relu { input } | Self::Transpose { input, .. } => {
                vec![*input]
            }
            Self::Concat { inputs, .. } => inputs.clone(),
            Self::Arithmetic { lhs, rhs, .. } => vec![*lhs, *rhs],
            Self::Save { input, output } => vec![*input, *output],
        }
    }

    fn inputs_mut(&mut self) -> Vec<&mut Value> {
        match self {
            Self::Convolution {
                input, filter, bias, ..
            } => vec![input, filter, bias],
            Self::BatchNormalization {
                input,
                scale,
                bias,
                mean,
                var,
                ..
            } => vec![input, scale, bias, mean, var],
            Self::Pool { input, .. } | Self::Relu { input } | Self::Transpose { input, .. } => {
                vec![input]
            }
            Self::Concat { inputs, .. } => inputs.iter_mut().collect(),
            Self::Arithmetic { lhs, rhs, .. } => vec![lhs, rhs],
            Self::Save { input, output } => vec![input, output],
        }
    }

    pub(crate) fn set_input(&mut self, slot: usize, value: Value) {
        let mut inputs = self.inputs_mut();
        assert!(
            slot < inputs.len(),
            "input slot {slot} out of range for {}",
            self.op_name()
        );
        *inputs[slot] = value;
    }
}

/// An operation node.
#[derive(Clone, Debug)]
pub struct Node {
    /// Stable name, carried through rewrites for diagnostics.
    pub name: String,
    /// The operation and its attributes.
    pub kind: NodeKind,
    /// Output tensor type. Immutable once created.
    pub ty: Type,
    uses: Vec<Use>,
}

/// A named parameter variable: a graph leaf holding mutable tensor data.
#[derive(Clone, Debug)]
pub struct Variable {
    /// Variable name.
    pub name: String,
    /// Tensor type of the payload.
    pub ty: Type,
    /// The tensor contents. Mutated in place by weight-folding rewrites.
    pub payload: Tensor,
    uses: Vec<Use>,
}

impl Node {
    /// Returns `true` if any edge references this node's output.
    pub fn has_users(&self) -> bool {
        !self.uses.is_empty()
    }

    /// Returns `true` if exactly one edge references this node's output.
    pub fn has_one_use(&self) -> bool {
        self.uses.len() == 1
    }

    /// Number of referencing edges.
    pub fn num_users(&self) -> usize {
        self.uses.len()
    }

    /// The recorded use-list.
    pub fn uses(&self) -> &[Use] {
        &self.uses
    }
}

impl Variable {
    /// Returns `true` if any node references this variable.
    pub fn has_users(&self) -> bool {
        !self.uses.is_empty()
    }

    /// Returns `true` if exactly one node edge references this variable.
    pub fn has_one_use(&self) -> bool {
        self.uses.len() == 1
    }

    /// Number of referencing edges.
    pub fn num_users(&self) -> usize {
        self.uses.len()
    }

    /// The recorded use-list.
    pub fn uses(&self) -> &[Use] {
        &self.uses
    }
}

/// A directed acyclic computation graph.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    nodes: Arena<Node>,
    vars: Arena<Variable>,
}

impl Graph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterates over live operation nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = (Handle<Node>, &Node)> {
        self.nodes.iter()
    }

    /// Iterates over live variables in creation order.
    pub fn variables(&self) -> impl Iterator<Item = (Handle<Variable>, &Variable)> {
        self.vars.iter()
    }

    /// Number of live operation nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of live variables.
    pub fn variable_count(&self) -> usize {
        self.vars.len()
    }

    /// The output type of a value.
    pub fn value_type(&self, value: Value) -> &Type {
        match value {
            Value::Node(h) => &self.nodes[h].ty,
            Value::Var(h) => &self.vars[h].ty,
        }
    }

    /// The name of the node or variable behind a value.
    pub fn value_name(&self, value: Value) -> &str {
        match value {
            Value::Node(h) => &self.nodes[h].name,
            Value::Var(h) => &self.vars[h].name,
        }
    }

    // ---- construction ----------------------------------------------------

    /// Creates a zero-initialized f32 variable.
    pub fn create_variable(&mut self, name: &str, dims: &[usize]) -> Handle<Variable> {
        self.create_variable_with(name, dims, Tensor::zeros(dims))
    }

    /// Creates a variable with an explicit payload.
    ///
    /// # Panics
    ///
    /// Panics if the payload dimensions disagree with `dims`.
    pub fn create_variable_with(
        &mut self,
        name: &str,
        dims: &[usize],
        payload: Tensor,
    ) -> Handle<Variable> {
        assert_eq!(
            payload.dims(),
            dims,
            "create_variable({name}): payload shape mismatch"
        );
        self.vars.append(Variable {
            name: name.to_string(),
            ty: Type::new(ElemKind::F32, dims.to_vec()),
            payload,
            uses: Vec::new(),
        })
    }

    /// Creates a convolution node, allocating its filter and bias variables.
    ///
    /// The input must be 4-D NHWC. The filter is channel-major:
    /// `[depth, kernel, kernel, channels]`.
    pub fn create_convolution(
        &mut self,
        name: &str,
        input: Value,
        depth: usize,
        kernel: usize,
        stride: usize,
        pad: usize,
    ) -> Handle<Node> {
        let dims = self.value_type(input).dims.clone();
        assert_eq!(dims.len(), 4, "create_convolution({name}): input must be 4-D NHWC");
        let [n, h, w, c] = [dims[0], dims[1], dims[2], dims[3]];
        let oh = conv_out_dim(h, kernel, stride, pad);
        let ow = conv_out_dim(w, kernel, stride, pad);

        let filter = self.create_variable(&format!("{name}.filter"), &[depth, kernel, kernel, c]);
        let bias = self.create_variable(&format!("{name}.bias"), &[depth]);

        self.add_node(
            name,
            NodeKind::Convolution {
                input,
                filter: Value::Var(filter),
                bias: Value::Var(bias),
                depth,
                kernel,
                stride,
                pad,
            },
            Type::new(ElemKind::F32, vec![n, oh, ow, depth]),
        )
    }

    /// Creates a batch-normalization node, allocating fresh parameter
    /// variables (gamma = 1, beta = 0, mean = 0, variance = 1).
    pub fn create_batch_normalization(
        &mut self,
        name: &str,
        input: Value,
        channel_idx: usize,
        epsilon: f32,
        momentum: f32,
    ) -> Handle<Node> {
        let dims = self.value_type(input).dims.clone();
        assert!(
            channel_idx < dims.len(),
            "create_batch_normalization({name}): channel axis {channel_idx} out of range"
        );
        let channels = dims[channel_idx];
        let scale =
            self.create_variable_with(&format!("{name}.scale"), &[channels], Tensor::splat(&[channels], 1.0));
        let bias = self.create_variable(&format!("{name}.bias"), &[channels]);
        let mean = self.create_variable(&format!("{name}.mean"), &[channels]);
        let var =
            self.create_variable_with(&format!("{name}.var"), &[channels], Tensor::splat(&[channels], 1.0));

        self.create_batch_normalization_with_params(
            name,
            input,
            Value::Var(scale),
            Value::Var(bias),
            Value::Var(mean),
            Value::Var(var),
            channel_idx,
            epsilon,
            momentum,
        )
    }

    /// Creates a batch-normalization node over existing parameter values.
    ///
    /// Rewrites use this to re-anchor a normalization without duplicating
    /// its parameters.
    #[allow(clippy::too_many_arguments)]
    pub fn create_batch_normalization_with_params(
        &mut self,
        name: &str,
        input: Value,
        scale: Value,
        bias: Value,
        mean: Value,
        var: Value,
        channel_idx: usize,
        epsilon: f32,
        momentum: f32,
    ) -> Handle<Node> {
        let ty = self.value_type(input).clone();
        assert!(
            channel_idx < ty.rank(),
            "create_batch_normalization({name}): channel axis {channel_idx} out of range"
        );
        self.add_node(
            name,
            NodeKind::BatchNormalization {
                input,
                scale,
                bias,
                mean,
                var,
                channel_idx,
                epsilon,
                momentum,
            },
            ty,
        )
    }

    /// Creates a pooling node over a 4-D NHWC input.
    pub fn create_pool(
        &mut self,
        name: &str,
        input: Value,
        mode: PoolMode,
        kernel: usize,
        stride: usize,
        pad: usize,
    ) -> Handle<Node> {
        let dims = self.value_type(input).dims.clone();
        assert_eq!(dims.len(), 4, "create_pool({name}): input must be 4-D NHWC");
        let [n, h, w, c] = [dims[0], dims[1], dims[2], dims[3]];
        let oh = conv_out_dim(h, kernel, stride, pad);
        let ow = conv_out_dim(w, kernel, stride, pad);
        self.add_node(
            name,
            NodeKind::Pool {
                input,
                mode,
                kernel,
                stride,
                pad,
            },
            Type::new(ElemKind::F32, vec![n, oh, ow, c]),
        )
    }

    /// Creates a rectified-linear activation node.
    pub fn create_relu(&mut self, name: &str, input: Value) -> Handle<Node> {
        let ty = self.value_type(input).clone();
        self.add_node(name, NodeKind::Relu { input }, ty)
    }

    /// Creates a transpose node. Output axis `i` takes input axis
    /// `shuffle[i]`.
    ///
    /// # Panics
    ///
    /// Panics if `shuffle` is not a permutation of the input rank.
    pub fn create_transpose(&mut self, name: &str, input: Value, shuffle: &[usize]) -> Handle<Node> {
        let dims = self.value_type(input).dims.clone();
        assert!(
            is_permutation(shuffle, dims.len()),
            "create_transpose({name}): {shuffle:?} is not a permutation of rank {}",
            dims.len()
        );
        let out_dims: Vec<usize> = shuffle.iter().map(|&a| dims[a]).collect();
        self.add_node(
            name,
            NodeKind::Transpose {
                input,
                shuffle: shuffle.to_vec(),
            },
            Type::new(ElemKind::F32, out_dims),
        )
    }

    /// Creates a concatenation node.
    ///
    /// # Panics
    ///
    /// Panics on fewer than two inputs, or if the inputs disagree on any
    /// axis other than `dim`.
    pub fn create_concat(&mut self, name: &str, inputs: &[Value], dim: usize) -> Handle<Node> {
        assert!(
            inputs.len() > 1,
            "create_concat({name}): needs at least two inputs"
        );
        let first = self.value_type(inputs[0]).dims.clone();
        assert!(
            dim < first.len(),
            "create_concat({name}): axis {dim} out of range for rank {}",
            first.len()
        );
        let mut out_dims = first.clone();
        for &input in &inputs[1..] {
            let dims = &self.value_type(input).dims;
            assert_eq!(dims.len(), first.len(), "create_concat({name}): rank mismatch");
            for (axis, (&a, &b)) in first.iter().zip(dims.iter()).enumerate() {
                assert!(
                    axis == dim || a == b,
                    "create_concat({name}): inputs disagree on axis {axis}"
                );
            }
            out_dims[dim] += dims[dim];
        }
        self.add_node(
            name,
            NodeKind::Concat {
                inputs: inputs.to_vec(),
                dim,
            },
            Type::new(ElemKind::F32, out_dims),
        )
    }

    /// Creates an element-wise arithmetic node.
    ///
    /// # Panics
    ///
    /// Panics if the operand types differ.
    pub fn create_arithmetic(
        &mut self,
        name: &str,
        lhs: Value,
        rhs: Value,
        mode: ArithmeticMode,
    ) -> Handle<Node> {
        let lty = self.value_type(lhs).clone();
        assert_eq!(
            &lty,
            self.value_type(rhs),
            "create_arithmetic({name}): operand types differ"
        );
        self.add_node(name, NodeKind::Arithmetic { lhs, rhs, mode }, lty)
    }

    /// Creates a save sink, allocating the output variable it writes to.
    pub fn create_save(&mut self, name: &str, input: Value) -> Handle<Node> {
        let ty = self.value_type(input).clone();
        let output = self.create_variable(name, &ty.dims);
        self.add_node(
            name,
            NodeKind::Save {
                input,
                output: Value::Var(output),
            },
            ty,
        )
    }

    fn add_node(&mut self, name: &str, kind: NodeKind, ty: Type) -> Handle<Node> {
        let inputs = kind.inputs();
        for &input in &inputs {
            assert!(
                self.contains_value(input),
                "add_node({name}): input {input:?} not in this graph"
            );
        }
        let handle = self.nodes.append(Node {
            name: name.to_string(),
            kind,
            ty,
            uses: Vec::new(),
        });
        for (slot, input) in inputs.into_iter().enumerate() {
            self.add_use(
                input,
                Use {
                    consumer: handle,
                    slot,
                },
            );
        }
        handle
    }

    fn contains_value(&self, value: Value) -> bool {
        match value {
            Value::Node(h) => self.nodes.contains(h),
            Value::Var(h) => self.vars.contains(h),
        }
    }

    fn add_use(&mut self, producer: Value, entry: Use) {
        match producer {
            Value::Node(h) => self.nodes[h].uses.push(entry),
            Value::Var(h) => self.vars[h].uses.push(entry),
        }
    }

    fn drop_use(&mut self, producer: Value, entry: Use) {
        let uses = match producer {
            Value::Node(h) => &mut self.nodes[h].uses,
            Value::Var(h) => &mut self.vars[h].uses,
        };
        let pos = uses
            .iter()
            .position(|u| *u == entry)
            .expect("use-list entry missing during edge detach");
        uses.swap_remove(pos);
    }

    // ---- rewriting -------------------------------------------------------

    /// Rewires every edge that references `old` to reference `new` instead,
    /// in one atomic pass. `old` is left in place with an empty use-list.
    pub fn replace_all_uses_of_with(&mut self, old: Handle<Node>, new: Value) {
        assert!(
            new != Value::Node(old),
            "replace_all_uses_of_with: cannot replace {:?} with itself",
            self.nodes[old].name
        );
        let uses = std::mem::take(&mut self.nodes[old].uses);
        for entry in &uses {
            self.nodes[entry.consumer].kind.set_input(entry.slot, new);
        }
        match new {
            Value::Node(h) => self.nodes[h].uses.extend(uses),
            Value::Var(h) => self.vars[h].uses.extend(uses),
        }
    }

    /// Deletes a node, detaching it from the use-lists of all its inputs.
    ///
    /// # Panics
    ///
    /// Panics if the node still has users.
    pub fn erase_node(&mut self, handle: Handle<Node>) {
        assert!(
            !self.nodes[handle].has_users(),
            "erase_node({}): node still has users",
            self.nodes[handle].name
        );
        let inputs = self.nodes[handle].kind.inputs();
        for (slot, input) in inputs.into_iter().enumerate() {
            self.drop_use(
                input,
                Use {
                    consumer: handle,
                    slot,
                },
            );
        }
        self.nodes.remove(handle);
    }

    /// Deletes a variable.
    ///
    /// # Panics
    ///
    /// Panics if any node still references it.
    pub fn erase_variable(&mut self, handle: Handle<Variable>) {
        assert!(
            !self.vars[handle].has_users(),
            "erase_variable({}): variable still has users",
            self.vars[handle].name
        );
        self.vars.remove(handle);
    }

    // ---- verification ----------------------------------------------------

    /// Checks the structural invariants: use-list integrity in both
    /// directions, acyclicity, and per-variant well-formedness.
    pub fn verify(&self) -> Result<(), GraphError> {
        // Every input edge must be mirrored by exactly one use entry.
        for (handle, node) in self.nodes.iter() {
            for (slot, input) in node.kind.inputs().into_iter().enumerate() {
                let entry = Use {
                    consumer: handle,
                    slot,
                };
                let uses = match input {
                    Value::Node(h) => self
                        .nodes
                        .try_get(h)
                        .map(|n| n.uses())
                        .ok_or_else(|| GraphError::DanglingEdge {
                            node: node.name.clone(),
                            slot,
                        })?,
                    Value::Var(h) => self
                        .vars
                        .try_get(h)
                        .map(|v| v.uses())
                        .ok_or_else(|| GraphError::DanglingEdge {
                            node: node.name.clone(),
                            slot,
                        })?,
                };
                if uses.iter().filter(|u| **u == entry).count() != 1 {
                    return Err(GraphError::MissingUse {
                        node: node.name.clone(),
                        slot,
                    });
                }
            }
        }

        // Every use entry must point back at a live consumer edge.
        let check_uses = |name: &str, value: Value, uses: &[Use]| -> Result<(), GraphError> {
            for entry in uses {
                let consumer =
                    self.nodes
                        .try_get(entry.consumer)
                        .ok_or_else(|| GraphError::StaleUse {
                            producer: name.to_string(),
                            slot: entry.slot,
                        })?;
                let inputs = consumer.kind.inputs();
                if inputs.get(entry.slot) != Some(&value) {
                    return Err(GraphError::StaleUse {
                        producer: name.to_string(),
                        slot: entry.slot,
                    });
                }
            }
            Ok(())
        };
        for (handle, node) in self.nodes.iter() {
            check_uses(&node.name, Value::Node(handle), node.uses())?;
        }
        for (handle, var) in self.vars.iter() {
            check_uses(&var.name, Value::Var(handle), var.uses())?;
        }

        self.verify_acyclic()?;

        // Per-variant structure.
        for (_, node) in self.nodes.iter() {
            match &node.kind {
                NodeKind::Concat { inputs, .. } => {
                    if inputs.len() < 2 {
                        return Err(GraphError::ConcatArity {
                            node: node.name.clone(),
                            count: inputs.len(),
                        });
                    }
                }
                NodeKind::Transpose { input, shuffle } => {
                    let rank = self.value_type(*input).rank();
                    if !is_permutation(shuffle, rank) {
                        return Err(GraphError::BadShuffle {
                            node: node.name.clone(),
                            shuffle: shuffle.clone(),
                            rank,
                        });
                    }
                }
                NodeKind::Save { output, .. } => {
                    if output.as_var().is_none() {
                        return Err(GraphError::BadSaveTarget {
                            node: node.name.clone(),
                        });
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }

    fn verify_acyclic(&self) -> Result<(), GraphError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }
        let mut marks: HashMap<Handle<Node>, Mark> = HashMap::new();

        for (root, _) in self.nodes.iter() {
            if marks.contains_key(&root) {
                continue;
            }
            // Iterative DFS; the second visit of a frame finalizes it.
            let mut stack = vec![(root, false)];
            while let Some((handle, expanded)) = stack.pop() {
                if expanded {
                    marks.insert(handle, Mark::Done);
                    continue;
                }
                match marks.get(&handle) {
                    Some(Mark::Done) => continue,
                    Some(Mark::Visiting) => {
                        return Err(GraphError::Cycle {
                            node: self.nodes[handle].name.clone(),
                        });
                    }
                    None => {}
                }
                marks.insert(handle, Mark::Visiting);
                stack.push((handle, true));
                for input in self.nodes[handle].kind.inputs() {
                    if let Value::Node(producer) = input {
                        match marks.get(&producer) {
                            Some(Mark::Visiting) => {
                                return Err(GraphError::Cycle {
                                    node: self.nodes[producer].name.clone(),
                                });
                            }
                            Some(Mark::Done) => {}
                            None => stack.push((producer, false)),
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl Index<Handle<Node>> for Graph {
    type Output = Node;

    fn index(&self, handle: Handle<Node>) -> &Node {
        &self.nodes[handle]
    }
}

impl IndexMut<Handle<Node>> for Graph {
    fn index_mut(&mut self, handle: Handle<Node>) -> &mut Node {
        &mut self.nodes[handle]
    }
}

impl Index<Handle<Variable>> for Graph {
    type Output = Variable;

    fn index(&self, handle: Handle<Variable>) -> &Variable {
        &self.vars[handle]
    }
}

impl IndexMut<Handle<Variable>> for Graph {
    fn index_mut(&mut self, handle: Handle<Variable>) -> &mut Variable {
        &mut self.vars[handle]
    }
}

/// Output spatial extent of a strided, padded window operation.
fn conv_out_dim(size: usize, kernel: usize, stride: usize, pad: usize) -> usize {
    let padded = size + 2 * pad;
    assert!(
        padded >= kernel && stride > 0,
        "window (kernel {kernel}, stride {stride}, pad {pad}) does not fit extent {size}"
    );
    (padded - kernel) / stride + 1
}

fn is_permutation(shuffle: &[usize], rank: usize) -> bool {
    if shuffle.len() != rank {
        return false;
    }
    let mut seen = vec![false; rank];
    for &axis in shuffle {
        if axis >= rank || seen[axis] {
            return false;
        }
        seen[axis] = true;
    }
    true
}
