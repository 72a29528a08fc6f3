//! Error types for graph verification.

/// Structural invariant violations reported by [`Graph::verify`].
///
/// [`Graph::verify`]: crate::Graph::verify
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// An input edge references a node or variable that is not live.
    #[error("node {node} input {slot} references a deleted node or variable")]
    DanglingEdge { node: String, slot: usize },

    /// An input edge is not mirrored by exactly one use-list entry.
    #[error("node {node} input {slot} is not recorded exactly once in the producer's use-list")]
    MissingUse { node: String, slot: usize },

    /// A use-list entry points at a consumer edge that no longer exists.
    #[error("{producer} records a use at slot {slot} that no consumer edge matches")]
    StaleUse { producer: String, slot: usize },

    /// The producer-consumer relation contains a cycle.
    #[error("cycle detected through node {node}")]
    Cycle { node: String },

    /// A concat node has fewer than two inputs.
    #[error("concat {node} has {count} inputs, expected at least two")]
    ConcatArity { node: String, count: usize },

    /// A transpose shuffle is not a permutation of its input rank.
    #[error("transpose {node} shuffle {shuffle:?} is not a permutation of rank {rank}")]
    BadShuffle {
        node: String,
        shuffle: Vec<usize>,
        rank: usize,
    },

    /// A save node's output edge is not a variable.
    #[error("save {node} output is not a variable")]
    BadSaveTarget { node: String },
}
