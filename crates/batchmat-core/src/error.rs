use crate::device::{Device, DeviceKind};
use crate::dtype::DType;
use crate::shape::Shape;

/// Coarse classification of a [`BatchMatError`], matching the status codes
/// an op-execution framework reports back to its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller supplied inconsistent shapes, ranks, dtypes or buffers.
    InvalidArgument,
    /// The backend failed while executing a valid request.
    Internal,
    /// No kernel is registered for the requested (device, dtype) pair.
    Unimplemented,
}

#[derive(Debug, thiserror::Error)]
pub enum BatchMatError {
    #[error("In[0] and In[1] have different ndims: {lhs} vs. {rhs}")]
    RankMismatch { lhs: Shape, rhs: Shape },

    #[error("In[0] and In[1] ndims must be >= 2: {ndims}")]
    RankTooSmall { ndims: usize },

    #[error("In[0].dim({axis}) and In[1].dim({axis}) must be the same: {lhs} vs {rhs}")]
    BatchDimMismatch { axis: usize, lhs: Shape, rhs: Shape },

    #[error("In[0] mismatch In[1] shape: {lhs_dim} vs. {rhs_dim}: {lhs} {rhs} adj_x={adj_x} adj_y={adj_y}")]
    ContractionMismatch {
        lhs_dim: usize,
        rhs_dim: usize,
        lhs: Shape,
        rhs: Shape,
        adj_x: bool,
        adj_y: bool,
    },

    #[error("dtype mismatch: In[0] is {lhs}, In[1] is {rhs}")]
    DTypeMismatch { lhs: DType, rhs: DType },

    #[error("shape {shape} requires {expected} elements, got {got}")]
    ShapeMismatch { shape: Shape, expected: usize, got: usize },

    #[error("cannot reshape {numel} elements into {shape}")]
    InvalidReshape { numel: usize, shape: Shape },

    #[error("device mismatch: In[0] on {lhs}, In[1] on {rhs}")]
    DeviceMismatch { lhs: Device, rhs: Device },

    #[error("no {device} kernel registered for dtype {dtype}")]
    UnsupportedKernel { device: DeviceKind, dtype: DType },

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("No GPU stream available.")]
    NoStream,

    #[error("Blas GEMMBatched launch failed: a.shape={lhs}, b.shape={rhs}, m={m}, n={n}, k={k}, batch_size={batch}: {reason}")]
    BlasLaunch {
        lhs: Shape,
        rhs: Shape,
        m: usize,
        n: usize,
        k: usize,
        batch: usize,
        reason: String,
    },

    #[error("CUDA error: {0}")]
    CudaError(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl BatchMatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BatchMatError::RankMismatch { .. }
            | BatchMatError::RankTooSmall { .. }
            | BatchMatError::BatchDimMismatch { .. }
            | BatchMatError::ContractionMismatch { .. }
            | BatchMatError::DTypeMismatch { .. }
            | BatchMatError::ShapeMismatch { .. }
            | BatchMatError::InvalidReshape { .. }
            | BatchMatError::DeviceMismatch { .. }
            | BatchMatError::InvalidConfig(_) => ErrorKind::InvalidArgument,
            BatchMatError::UnsupportedKernel { .. } => ErrorKind::Unimplemented,
            BatchMatError::StorageError(_)
            | BatchMatError::NoStream
            | BatchMatError::BlasLaunch { .. }
            | BatchMatError::CudaError(_) => ErrorKind::Internal,
        }
    }

    pub fn is_invalid_argument(&self) -> bool {
        self.kind() == ErrorKind::InvalidArgument
    }

    pub fn is_internal(&self) -> bool {
        self.kind() == ErrorKind::Internal
    }
}
