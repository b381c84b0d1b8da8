use smallvec::SmallVec;
use std::fmt;

/// Tensor shape with stack-allocated storage for ≤4 dimensions.
///
/// Batched matmul operands are almost always rank 2-4, so the common case
/// never touches the heap.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: SmallVec<[usize; 4]>,
}

impl Shape {
    pub fn new(dims: &[usize]) -> Self {
        Self {
            dims: SmallVec::from_slice(dims),
        }
    }

    /// Number of dimensions (rank).
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements. A rank-0 shape holds one element.
    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn dim(&self, axis: usize) -> Option<usize> {
        self.dims.get(axis).copied()
    }

    /// Leading (batch) dimensions: everything except the last two axes.
    pub fn batch_dims(&self) -> &[usize] {
        let n = self.dims.len().saturating_sub(2);
        &self.dims[..n]
    }

    /// Number of matrices in the batch. A rank-2 shape is a batch of one.
    pub fn batch_size(&self) -> usize {
        self.batch_dims().iter().product()
    }

    /// Trailing `(rows, cols)` pair, or `None` below rank 2.
    pub fn matrix_dims(&self) -> Option<(usize, usize)> {
        let n = self.dims.len();
        if n < 2 {
            return None;
        }
        Some((self.dims[n - 2], self.dims[n - 1]))
    }

    /// Canonical `[batch, rows, cols]` view of a rank ≥ 2 shape.
    pub fn collapse_batch(&self) -> Option<Shape> {
        let (rows, cols) = self.matrix_dims()?;
        Some(Shape::new(&[self.batch_size(), rows, cols]))
    }

    /// A shape with the same element count, or `None` if `dims` disagrees.
    pub fn reshaped(&self, dims: &[usize]) -> Option<Shape> {
        let target = Shape::new(dims);
        (target.numel() == self.numel()).then_some(target)
    }

    /// Append trailing dimensions to a copy of this shape.
    pub fn with_trailing(&self, trailing: &[usize]) -> Shape {
        let mut dims = self.dims.clone();
        dims.extend_from_slice(trailing);
        Shape { dims }
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape({:?})", self.dims.as_slice())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::new(dims)
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape {
            dims: SmallVec::from_vec(dims),
        }
    }
}

macro_rules! impl_shape_from_array {
    ($($n:expr),*) => {
        $(
            impl From<[usize; $n]> for Shape {
                fn from(dims: [usize; $n]) -> Self {
                    Shape::new(&dims)
                }
            }
        )*
    };
}

impl_shape_from_array!(0, 1, 2, 3, 4, 5, 6);
