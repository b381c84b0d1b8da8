//! The batched-GEMM seam between the launcher and a BLAS library.
//!
//! Parameters follow BLAS conventions: matrices are column-major, `op(A)`
//! is `m x k`, `op(B)` is `k x n` and `C` is `m x n`.

use batchmat_core::{Complex32, Complex64, Element, ScalarKind};
use half::f16;

use super::memory::{DeviceMemory, ScratchAllocator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transpose {
    NoTranspose,
    Transpose,
    ConjugateTranspose,
}

impl Transpose {
    /// The operation that realises a mathematical adjoint for `T`: plain
    /// transpose for real kinds, conjugate transpose for complex ones.
    pub fn adjoint_for<T: Element>() -> Self {
        if <T::Kind as ScalarKind>::IS_COMPLEX {
            Transpose::ConjugateTranspose
        } else {
            Transpose::Transpose
        }
    }

    pub fn is_transposed(self) -> bool {
        self != Transpose::NoTranspose
    }
}

/// Element types with a batched GEMM routine on the GPU. `i32` has none.
pub trait GpuElement: Element {}

impl GpuElement for f16 {}
impl GpuElement for f32 {}
impl GpuElement for f64 {}
impl GpuElement for Complex32 {}
impl GpuElement for Complex64 {}

/// Scalar parameters of one batched GEMM call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GemmBatched<T> {
    pub transa: Transpose,
    pub transb: Transpose,
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub alpha: T,
    pub lda: usize,
    pub ldb: usize,
    pub beta: T,
    pub ldc: usize,
    pub batch: usize,
}

/// Failure reported by a BLAS stream for one call.
#[derive(Debug, thiserror::Error)]
pub enum BlasError {
    #[error("invalid parameter: {0}")]
    InvalidValue(String),

    #[error("device memory error: {0}")]
    Memory(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),
}

/// A stream that can enqueue batched GEMM.
pub trait BlasStream {
    /// Enqueue `C[i] = alpha * op(A[i]) * op(B[i]) + beta * C[i]` for every
    /// `i < params.batch`.
    ///
    /// Scratch obtained from `scratch` is only guaranteed to live until the
    /// allocator is dropped by the caller.
    ///
    /// # Safety
    ///
    /// Every pointer in `a`, `b` and `c` must address memory on this stream's
    /// device that is valid for the extents implied by `params`, and the
    /// `c` matrices must not overlap `a`, `b` or each other.
    unsafe fn gemm_batched<T: GpuElement>(
        &self,
        params: &GemmBatched<T>,
        a: &[DeviceMemory<T>],
        b: &[DeviceMemory<T>],
        c: &[DeviceMemory<T>],
        scratch: &mut dyn ScratchAllocator,
    ) -> Result<(), BlasError>;
}
