#![warn(missing_docs)]
//! Backend dispatch for the lantern compiler.
//!
//! Defines the [`Backend`] trait implemented by every execution provider
//! and the [`create_backend`] dispatcher that materializes an optimized
//! graph for one of them. The interpreter is always available; the CPU and
//! OpenCL backends are compiled in through the `backend-cpu` and
//! `backend-opencl` cargo features, and requesting one that was compiled
//! out is a fatal configuration error.

use std::fmt::{self, Debug};

use lantern_graph::Graph;

/// The execution providers a graph can be dispatched to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    /// Reference interpreter; always available.
    Interpreter,
    /// Native CPU code generation (feature `backend-cpu`).
    Cpu,
    /// OpenCL code generation (feature `backend-opencl`).
    OpenCl,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Interpreter => "interpreter",
            Self::Cpu => "cpu",
            Self::OpenCl => "opencl",
        })
    }
}

/// An execution provider bound to one optimized graph.
pub trait Backend: Debug {
    /// Human-readable name.
    fn name(&self) -> &str;

    /// Which provider this is.
    fn kind(&self) -> BackendKind;

    /// The graph this backend was created over.
    fn graph(&self) -> &Graph;
}

/// The reference interpreter backend.
#[derive(Debug)]
pub struct Interpreter<'g> {
    graph: &'g Graph,
}

impl Backend for Interpreter<'_> {
    fn name(&self) -> &str {
        "interpreter"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Interpreter
    }

    fn graph(&self) -> &Graph {
        self.graph
    }
}

/// The native CPU backend.
#[cfg(feature = "backend-cpu")]
#[derive(Debug)]
pub struct CpuBackend<'g> {
    graph: &'g Graph,
}

#[cfg(feature = "backend-cpu")]
impl Backend for CpuBackend<'_> {
    fn name(&self) -> &str {
        "cpu"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Cpu
    }

    fn graph(&self) -> &Graph {
        self.graph
    }
}

/// The OpenCL backend.
#[cfg(feature = "backend-opencl")]
#[derive(Debug)]
pub struct OpenClBackend<'g> {
    graph: &'g Graph,
}

#[cfg(feature = "backend-opencl")]
impl Backend for OpenClBackend<'_> {
    fn name(&self) -> &str {
        "opencl"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::OpenCl
    }

    fn graph(&self) -> &Graph {
        self.graph
    }
}

/// Creates the backend of the requested kind over an optimized graph.
///
/// # Panics
///
/// Panics if the requested backend was not compiled in.
pub fn create_backend(kind: BackendKind, graph: &Graph) -> Box<dyn Backend + '_> {
    match kind {
        BackendKind::Interpreter => Box::new(Interpreter { graph }),
        BackendKind::Cpu => {
            #[cfg(feature = "backend-cpu")]
            {
                Box::new(CpuBackend { graph })
            }
            #[cfg(not(feature = "backend-cpu"))]
            {
                panic!("must compile with CPU support to request the cpu backend")
            }
        }
        BackendKind::OpenCl => {
            #[cfg(feature = "backend-opencl")]
            {
                Box::new(OpenClBackend { graph })
            }
            #[cfg(not(feature = "backend-opencl"))]
            {
                panic!("must compile with OpenCL support to request the opencl backend")
            }
        }
    }
}
