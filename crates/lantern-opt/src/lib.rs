//! Graph optimization passes for lantern.
//!
//! Provides a [`Pass`] trait and the fixed [`optimize`] pipeline: transpose
//! sinking, pool/relu reordering, dead-code elimination, and (for inference)
//! batch-norm folding.

mod batch_norm;
mod dce;
mod pool;
mod sink_transpose;

pub use batch_norm::BatchNormFolding;
pub use dce::DeadCodeElimination;
pub use pool::OptimizePool;
pub use sink_transpose::SinkTranspose;

use std::fmt::Debug;

use lantern_graph::Graph;

/// An optimization pass that rewrites a graph in place.
pub trait Pass: Debug {
    /// Human-readable name of the pass.
    fn name(&self) -> &str;

    /// Run the pass on a graph. Returns `true` if anything was modified.
    fn run(&self, graph: &mut Graph) -> bool;
}

/// How aggressively to optimize, and for which execution phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptimizationMode {
    /// Leave the graph untouched.
    None,
    /// Optimize for inference; batch-norm statistics are frozen and may be
    /// folded into the preceding convolution's weights.
    Infer,
    /// Optimize for training; batch normalization keeps its trainable
    /// statistics and is preserved.
    Train,
}

/// Runs the optimization pipeline over one graph.
///
/// The pipeline is a fixed sequence: each pass runs once, and the trailing
/// dead-code elimination reclaims whatever the rewrites orphaned. There is
/// no cross-pass fixed point; calling `optimize` again picks up rewrite
/// opportunities the single sinking sweep left behind.
pub fn optimize(graph: &mut Graph, mode: OptimizationMode) {
    if mode == OptimizationMode::None {
        return;
    }

    // Sink transpose operations in an attempt to cancel them out.
    run_pass(&SinkTranspose, graph);

    // Swap relu below max-pool so the activation runs on the smaller tensor.
    run_pass(&OptimizePool, graph);

    run_pass(&DeadCodeElimination::default(), graph);

    if mode == OptimizationMode::Infer {
        // Merge batch normalization into the preceding convolution.
        run_pass(&BatchNormFolding, graph);
    }

    run_pass(&DeadCodeElimination::default(), graph);
}

fn run_pass(pass: &dyn Pass, graph: &mut Graph) {
    let changed = pass.run(graph);
    log::debug!(
        "{}: {}",
        pass.name(),
        if changed { "changed" } else { "no change" }
    );
}
