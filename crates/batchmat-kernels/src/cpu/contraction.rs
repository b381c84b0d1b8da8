//! Per-shard matrix contraction.
//!
//! For each batch index in a shard this computes one product of the
//! (optionally adjointed) operands. Complex kinds use
//!
//! ```text
//! conj(a) * conj(b) = conj(a * b)
//! conj(a) * b       = conj(a * conj(b))
//! ```
//!
//! so the kernel only ever conjugates the right operand (when exactly one
//! side is adjointed). When `adj_x` is set the caller conjugates the whole
//! output once afterwards with [`InnerBatchKernel::conjugate`]. Real kinds
//! get a separate impl that never conjugates.

use std::ops::Range;

use batchmat_core::{ComplexKind, Element, RealKind, ScalarKind};
use rayon::prelude::*;

use crate::reshape::MatMulShapes;
use crate::sharder::CpuWorkers;

const TILE_N: usize = 64;
const TILE_K: usize = 64;

/// Execution context for the products of one shard.
#[derive(Clone, Copy)]
pub struct InnerContext<'a> {
    pub workers: &'a CpuWorkers,
    /// Let each product spread its output rows over the worker pool.
    pub parallelize_inner: bool,
    pub rows_per_task: usize,
}

/// Batch contraction specialised on the scalar kind.
pub trait InnerBatchKernel: ScalarKind {
    /// Compute `z[i] = op(x[i]) · op(y[i])` for `i` in `range`. `z` holds
    /// exactly the output matrices of `range`, back to back.
    fn run<T: Element<Kind = Self>>(
        ctx: &InnerContext<'_>,
        x: &[T],
        y: &[T],
        shapes: &MatMulShapes,
        range: Range<usize>,
        z: &mut [T],
    );

    /// Whole-output conjugation owed when `adj_x` is set.
    fn conjugate<T: Element<Kind = Self>>(workers: &CpuWorkers, z: &mut [T]);
}

impl InnerBatchKernel for RealKind {
    fn run<T: Element<Kind = Self>>(
        ctx: &InnerContext<'_>,
        x: &[T],
        y: &[T],
        shapes: &MatMulShapes,
        range: Range<usize>,
        z: &mut [T],
    ) {
        run_range::<T, false>(ctx, x, y, shapes, range, z);
    }

    #[inline(always)]
    fn conjugate<T: Element<Kind = Self>>(_workers: &CpuWorkers, _z: &mut [T]) {}
}

impl InnerBatchKernel for ComplexKind {
    fn run<T: Element<Kind = Self>>(
        ctx: &InnerContext<'_>,
        x: &[T],
        y: &[T],
        shapes: &MatMulShapes,
        range: Range<usize>,
        z: &mut [T],
    ) {
        if shapes.adj_x != shapes.adj_y {
            run_range::<T, true>(ctx, x, y, shapes, range, z);
        } else {
            run_range::<T, false>(ctx, x, y, shapes, range, z);
        }
    }

    fn conjugate<T: Element<Kind = Self>>(workers: &CpuWorkers, z: &mut [T]) {
        workers.install(|| z.par_iter_mut().for_each(|v| *v = Element::conj(*v)));
    }
}

/// Reusable packing buffers for the effective operands of one shard.
struct Packed<T> {
    lhs: Vec<T>,
    rhs: Vec<T>,
}

fn run_range<T: Element, const CONJ_RHS: bool>(
    ctx: &InnerContext<'_>,
    x: &[T],
    y: &[T],
    shapes: &MatMulShapes,
    range: Range<usize>,
    z: &mut [T],
) {
    let x_len = shapes.lhs_matrix_len();
    let y_len = shapes.rhs_matrix_len();
    let z_len = shapes.out_matrix_len();
    if z_len == 0 {
        return;
    }
    debug_assert_eq!(z.len(), range.len() * z_len);

    let mut packed = Packed {
        lhs: Vec::new(),
        rhs: Vec::new(),
    };
    for (i, z_i) in range.zip(z.chunks_mut(z_len)) {
        let x_i = &x[i * x_len..(i + 1) * x_len];
        let y_i = &y[i * y_len..(i + 1) * y_len];
        contract::<T, CONJ_RHS>(ctx, x_i, y_i, shapes, z_i, &mut packed);
    }
}

/// One product. Packs the effective `[m, k]` left and `[k, n]` right
/// operands when they are not already laid out that way, then runs a tiled
/// row kernel, optionally across the pool.
fn contract<T: Element, const CONJ_RHS: bool>(
    ctx: &InnerContext<'_>,
    x: &[T],
    y: &[T],
    shapes: &MatMulShapes,
    z: &mut [T],
    packed: &mut Packed<T>,
) {
    let (m, k, n) = (shapes.m, shapes.k, shapes.n);

    let lhs: &[T] = if shapes.adj_x {
        // x is stored [k, m].
        packed.lhs.clear();
        packed.lhs.extend((0..m * k).map(|idx| x[(idx % k) * m + idx / k]));
        &packed.lhs
    } else {
        x
    };

    let rhs: &[T] = if shapes.adj_y || CONJ_RHS {
        packed.rhs.clear();
        packed.rhs.extend((0..k * n).map(|idx| {
            let (p, c) = (idx / n, idx % n);
            // y is stored [n, k] when adjointed.
            let v = if shapes.adj_y { y[c * k + p] } else { y[idx] };
            if CONJ_RHS {
                v.conj()
            } else {
                v
            }
        }));
        &packed.rhs
    } else {
        y
    };

    if ctx.parallelize_inner && m > ctx.rows_per_task {
        let rows = ctx.rows_per_task;
        ctx.workers.install(|| {
            z.par_chunks_mut(rows * n)
                .enumerate()
                .for_each(|(t, z_rows)| gemm_rows(lhs, rhs, z_rows, t * rows, k, n));
        });
    } else {
        gemm_rows(lhs, rhs, z, 0, k, n);
    }
}

/// `z = l[first_row..] · r` for the rows `z` covers. Row-major `l: [_, k]`,
/// `r: [k, n]`. Each output element accumulates over `p` in ascending order.
fn gemm_rows<T: Element>(l: &[T], r: &[T], z: &mut [T], first_row: usize, k: usize, n: usize) {
    z.fill(T::zero());
    let rows = z.len() / n;
    for p0 in (0..k).step_by(TILE_K) {
        let p_end = (p0 + TILE_K).min(k);
        for j0 in (0..n).step_by(TILE_N) {
            let j_end = (j0 + TILE_N).min(n);
            for i in 0..rows {
                let l_row = &l[(first_row + i) * k..(first_row + i + 1) * k];
                let z_row = &mut z[i * n + j0..i * n + j_end];
                for p in p0..p_end {
                    let a = l_row[p];
                    let r_row = &r[p * n + j0..p * n + j_end];
                    for (zv, &b) in z_row.iter_mut().zip(r_row) {
                        *zv = T::mul_acc(*zv, a, b);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchmat_core::{Complex64, Shape};

    fn shapes(a: &[usize], b: &[usize], adj_x: bool, adj_y: bool) -> MatMulShapes {
        MatMulShapes::plan(&Shape::new(a), &Shape::new(b), adj_x, adj_y).unwrap()
    }

    fn ctx(workers: &CpuWorkers, parallel: bool) -> InnerContext<'_> {
        InnerContext {
            workers,
            parallelize_inner: parallel,
            rows_per_task: 2,
        }
    }

    #[test]
    fn test_real_plain() {
        let workers = CpuWorkers::global();
        let s = shapes(&[2, 3], &[3, 2], false, false);
        let x = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let y = [7.0f32, 8.0, 9.0, 10.0, 11.0, 12.0];
        let mut z = [f32::NAN; 4];
        RealKind::run(&ctx(&workers, false), &x, &y, &s, 0..1, &mut z);
        assert_eq!(z, [58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_real_transposed_operands() {
        let workers = CpuWorkers::global();
        // x stored [3, 2] so op(x) = x^T is [2, 3]; y stored [2, 3] so op(y) = y^T is [3, 2].
        let s = shapes(&[3, 2], &[2, 3], true, true);
        let x = [1i32, 4, 2, 5, 3, 6];
        let y = [7i32, 9, 11, 8, 10, 12];
        let mut z = [0i32; 4];
        RealKind::run(&ctx(&workers, false), &x, &y, &s, 0..1, &mut z);
        assert_eq!(z, [58, 64, 139, 154]);
    }

    #[test]
    fn test_parallel_inner_matches_serial() {
        let workers = CpuWorkers::with_threads(3).unwrap();
        let s = shapes(&[2, 9, 5], &[2, 5, 7], false, false);
        let x: Vec<f64> = (0..90).map(|i| (i % 11) as f64 - 5.0).collect();
        let y: Vec<f64> = (0..70).map(|i| (i % 7) as f64 * 0.5).collect();
        let mut serial = vec![0.0; 2 * 63];
        let mut parallel = vec![0.0; 2 * 63];
        RealKind::run(&ctx(&workers, false), &x, &y, &s, 0..2, &mut serial);
        RealKind::run(&ctx(&workers, true), &x, &y, &s, 0..2, &mut parallel);
        assert_eq!(serial, parallel);
    }

    #[test]
    fn test_complex_mixed_adjoint_conjugates_rhs_only() {
        let workers = CpuWorkers::global();
        // [1x1] · adjoint([1x1]) = a * conj(b)
        let s = shapes(&[1, 1], &[1, 1], false, true);
        let a = Complex64::new(1.0, 2.0);
        let b = Complex64::new(3.0, -1.0);
        let mut z = [Complex64::new(0.0, 0.0)];
        ComplexKind::run(&ctx(&workers, false), &[a], &[b], &s, 0..1, &mut z);
        assert_eq!(z[0], a * b.conj());
    }

    #[test]
    fn test_complex_conjugate_pass() {
        let workers = CpuWorkers::global();
        let mut z = vec![Complex64::new(1.0, 2.0), Complex64::new(-3.0, -4.0)];
        ComplexKind::conjugate(&workers, &mut z);
        assert_eq!(z, vec![Complex64::new(1.0, -2.0), Complex64::new(-3.0, 4.0)]);

        let mut r = vec![1.0f32, -2.0];
        RealKind::conjugate(&workers, &mut r);
        assert_eq!(r, vec![1.0, -2.0]);
    }

    #[test]
    fn test_sub_range_writes_only_its_slice() {
        let workers = CpuWorkers::global();
        let s = shapes(&[3, 1, 2], &[3, 2, 1], false, false);
        let x = [1.0f32, 1.0, 2.0, 2.0, 3.0, 3.0];
        let y = [1.0f32, 1.0, 1.0, 1.0, 1.0, 1.0];
        let mut z = [0.0f32; 2];
        RealKind::run(&ctx(&workers, false), &x, &y, &s, 1..3, &mut z);
        assert_eq!(z, [4.0, 6.0]);
    }
}
