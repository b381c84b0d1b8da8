//! Row-major batched matmul expressed as one column-major batched GEMM.
//!
//! A row-major `[r, c]` matrix is the column-major `[c, r]` matrix with
//! leading dimension `c`. So `Z = op(X) * op(Y)` is computed as
//! `Z^T = op(Y)^T * op(X)^T` by swapping the operands, passing the
//! adjoint flags through as (conjugate-)transpose ops, and taking the
//! stored widths as leading dimensions.

use batchmat_core::{BatchMatError, Result};

use super::memory::{BlasScratchAllocator, DeviceMemory, TempAllocator};
use super::stream::{BlasStream, GemmBatched, GpuElement, Transpose};
use crate::reshape::MatMulShapes;

/// GEMM parameters for a planned call.
pub fn gemm_params<T: GpuElement>(shapes: &MatMulShapes) -> GemmBatched<T> {
    let op = |adj: bool| if adj { Transpose::adjoint_for::<T>() } else { Transpose::NoTranspose };
    GemmBatched {
        transa: op(shapes.adj_y),
        transb: op(shapes.adj_x),
        m: shapes.n,
        n: shapes.m,
        k: shapes.k,
        alpha: T::one(),
        lda: shapes.rhs_cols,
        ldb: shapes.lhs_cols,
        beta: T::zero(),
        ldc: shapes.n,
        batch: shapes.batch,
    }
}

/// Per-product views into contiguous `[batch, rows, cols]` buffers.
fn matrix_views<T>(base: DeviceMemory<T>, batch: usize, matrix_len: usize) -> Vec<DeviceMemory<T>> {
    (0..batch).map(|i| base.slice(i * matrix_len, matrix_len)).collect()
}

/// Enqueue a validated, non-degenerate batch on `stream`.
///
/// Scratch requested by the stream is drawn from `allocator` and released
/// when this call returns.
///
/// # Safety
///
/// `x`, `y` and `z` must address device memory valid for the stream, laid
/// out as the contiguous `[batch, rows, cols]` buffers described by
/// `shapes`, and `z` must not overlap `x` or `y`.
pub unsafe fn launch<T, S, A>(
    stream: Option<&S>,
    allocator: &A,
    x: DeviceMemory<T>,
    y: DeviceMemory<T>,
    z: DeviceMemory<T>,
    shapes: &MatMulShapes,
) -> Result<()>
where
    T: GpuElement,
    S: BlasStream,
    A: TempAllocator,
{
    let stream = stream.ok_or(BatchMatError::NoStream)?;

    let batch = shapes.batch;
    for (mem, expected) in [
        (x, batch * shapes.lhs_matrix_len()),
        (y, batch * shapes.rhs_matrix_len()),
        (z, batch * shapes.out_matrix_len()),
    ] {
        if mem.len() < expected {
            return Err(BatchMatError::StorageError(format!(
                "device buffer holds {} elements, {} required",
                mem.len(),
                expected
            )));
        }
    }

    let a = matrix_views(y, batch, shapes.rhs_matrix_len());
    let b = matrix_views(x, batch, shapes.lhs_matrix_len());
    let c = matrix_views(z, batch, shapes.out_matrix_len());
    let params = gemm_params::<T>(shapes);

    let dtype = T::DTYPE;
    tracing::debug!(
        %dtype,
        batch,
        m = shapes.m,
        n = shapes.n,
        k = shapes.k,
        transa = ?params.transa,
        transb = ?params.transb,
        "enqueue batched gemm"
    );

    let mut scratch = BlasScratchAllocator::new(allocator);
    stream
        .gemm_batched(&params, &a, &b, &c, &mut scratch)
        .map_err(|e| BatchMatError::BlasLaunch {
            lhs: shapes.lhs.clone(),
            rhs: shapes.rhs.clone(),
            m: shapes.m,
            n: shapes.n,
            k: shapes.k,
            batch,
            reason: e.to_string(),
        })
}
