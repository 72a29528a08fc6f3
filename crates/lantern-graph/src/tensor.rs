//! Dense tensor storage for parameter variables.

use std::fmt;

/// A dense row-major tensor of `f32` elements.
///
/// This is the mutable payload behind every graph variable. Rewrites that
/// fold computation into parameters (batch-norm folding) edit the payload
/// through [`raw_mut`](Self::raw_mut) while mapping linear offsets back to
/// axis coordinates with [`dim_for_linear`](Self::dim_for_linear).
#[derive(Clone, PartialEq)]
pub struct Tensor {
    dims: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    /// Creates a zero-filled tensor with the given dimensions.
    pub fn zeros(dims: &[usize]) -> Self {
        let len = dims.iter().product();
        Self {
            dims: dims.to_vec(),
            data: vec![0.0; len],
        }
    }

    /// Creates a tensor filled with `value`.
    pub fn splat(dims: &[usize], value: f32) -> Self {
        let len = dims.iter().product();
        Self {
            dims: dims.to_vec(),
            data: vec![value; len],
        }
    }

    /// Creates a tensor from existing row-major data.
    ///
    /// # Panics
    ///
    /// Panics if `data.len()` does not match the product of `dims`.
    pub fn from_vec(dims: &[usize], data: Vec<f32>) -> Self {
        let len: usize = dims.iter().product();
        assert_eq!(
            data.len(),
            len,
            "tensor data length {} does not match dims {dims:?}",
            data.len(),
        );
        Self {
            dims: dims.to_vec(),
            data,
        }
    }

    /// Extent of each axis, outermost first.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the tensor holds no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The whole payload as a row-major slice.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Overwrites every element with `value`.
    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }

    /// Element at a linear row-major offset.
    pub fn raw(&self, i: usize) -> f32 {
        self.data[i]
    }

    /// Mutable element at a linear row-major offset.
    pub fn raw_mut(&mut self, i: usize) -> &mut f32 {
        &mut self.data[i]
    }

    /// Element at multidimensional coordinates.
    pub fn at(&self, coords: &[usize]) -> f32 {
        self.data[self.linear_index(coords)]
    }

    /// Mutable element at multidimensional coordinates.
    pub fn at_mut(&mut self, coords: &[usize]) -> &mut f32 {
        let i = self.linear_index(coords);
        &mut self.data[i]
    }

    /// Maps a linear offset back to its coordinate along `axis`.
    ///
    /// For a filter laid out channel-major this recovers the output-channel
    /// index of any element with `dim_for_linear(0, i)`.
    pub fn dim_for_linear(&self, axis: usize, i: usize) -> usize {
        assert!(
            axis < self.dims.len(),
            "axis {axis} out of range for rank {}",
            self.dims.len()
        );
        let stride: usize = self.dims[axis + 1..].iter().product();
        (i / stride) % self.dims[axis]
    }

    fn linear_index(&self, coords: &[usize]) -> usize {
        assert_eq!(
            coords.len(),
            self.dims.len(),
            "expected {} coordinates, got {}",
            self.dims.len(),
            coords.len()
        );
        let mut index = 0;
        for (axis, (&c, &d)) in coords.iter().zip(&self.dims).enumerate() {
            assert!(c < d, "coordinate {c} out of range on axis {axis} (extent {d})");
            index = index * d + c;
        }
        index
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor {{ dims: {:?}, len: {} }}", self.dims, self.data.len())
    }
}
