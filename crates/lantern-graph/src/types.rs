//! Tensor types for the lantern graph.

use std::fmt;

/// The element type of a tensor.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum ElemKind {
    /// 32-bit floating point.
    F32,
    /// 64-bit floating point.
    F64,
    /// 8-bit signed integer.
    I8,
    /// 32-bit signed integer.
    I32,
}

impl ElemKind {
    /// Width of one element in bytes.
    pub fn byte_width(self) -> usize {
        match self {
            Self::F32 | Self::I32 => 4,
            Self::F64 => 8,
            Self::I8 => 1,
        }
    }
}

impl fmt::Display for ElemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::I8 => "i8",
            Self::I32 => "i32",
        })
    }
}

/// The type of a tensor value: element kind plus concrete dimensions.
///
/// Shapes are fixed at graph-construction time; the optimizer never infers
/// them.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Type {
    /// Element type.
    pub elem: ElemKind,
    /// Extent of each axis, outermost first.
    pub dims: Vec<usize>,
}

impl Type {
    /// Creates a new tensor type.
    pub fn new(elem: ElemKind, dims: Vec<usize>) -> Self {
        Self { elem, dims }
    }

    /// Number of axes.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.dims.iter().product()
    }

    /// Returns `true` if the tensor holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<", self.elem)?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, " x ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, ">")
    }
}
