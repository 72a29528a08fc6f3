//! Computation-graph substrate for the lantern compiler.
//!
//! An arena-based DAG of tensor operations and parameter variables, with
//! use-list back-references maintained by construction. The optimizer
//! rewrites this graph in place; backends consume the optimized result.

pub mod arena;
mod display;
mod error;
pub mod graph;
mod tensor;
mod types;

pub use arena::{Arena, Handle};
pub use display::dump_graph;
pub use error::GraphError;
pub use graph::{ArithmeticMode, Graph, Node, NodeKind, PoolMode, Use, Value, Variable};
pub use tensor::Tensor;
pub use types::{ElemKind, Type};
