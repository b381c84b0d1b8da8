//! Host-memory emulation of the GPU path.
//!
//! [`HostBlasStream`] runs batched GEMM on the CPU against addresses that
//! are plain host pointers, and [`HostAllocator`] hands out host scratch
//! under an optional byte budget. Together they exercise the launcher, the
//! scratch adapter and the column-major parameter mapping without a device.

use std::mem::size_of;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use batchmat_core::{BatchMatError, Element, Result};

use super::launch::launch;
use super::memory::{DeviceMemory, ScratchAllocator, TempAllocator};
use super::stream::{BlasError, BlasStream, GemmBatched, GpuElement, Transpose};
use crate::reshape::MatMulShapes;

/// View a host slice as "device" memory for [`HostBlasStream`].
pub fn host_memory<T>(data: &[T]) -> DeviceMemory<T> {
    DeviceMemory::new(data.as_ptr() as u64, data.len())
}

#[derive(Debug, Default)]
struct AllocState {
    outstanding: AtomicUsize,
    live: AtomicUsize,
    refused: AtomicUsize,
}

/// Temp allocator backed by host vectors.
#[derive(Debug, Clone, Default)]
pub struct HostAllocator {
    budget: Option<usize>,
    state: Arc<AllocState>,
}

/// One host scratch allocation. Returns its bytes to the budget on drop.
#[derive(Debug)]
pub struct HostScratch {
    words: Vec<u64>,
    bytes: usize,
    state: Arc<AllocState>,
}

impl HostAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse any allocation that would take outstanding scratch past
    /// `bytes`.
    pub fn with_budget(bytes: usize) -> Self {
        Self {
            budget: Some(bytes),
            state: Arc::default(),
        }
    }

    /// Allocations not yet dropped.
    pub fn live_buffers(&self) -> usize {
        self.state.live.load(Ordering::Acquire)
    }

    pub fn outstanding_bytes(&self) -> usize {
        self.state.outstanding.load(Ordering::Acquire)
    }

    /// Requests turned down for lack of budget.
    pub fn refused(&self) -> usize {
        self.state.refused.load(Ordering::Acquire)
    }
}

impl TempAllocator for HostAllocator {
    type Buffer = HostScratch;

    fn allocate_temp(&self, byte_size: usize) -> Result<HostScratch> {
        let before = self.state.outstanding.fetch_add(byte_size, Ordering::AcqRel);
        if let Some(budget) = self.budget {
            if before + byte_size > budget {
                self.state.outstanding.fetch_sub(byte_size, Ordering::AcqRel);
                self.state.refused.fetch_add(1, Ordering::AcqRel);
                return Err(BatchMatError::StorageError(format!(
                    "host scratch budget exhausted: {byte_size} bytes requested, {} of {budget} in use",
                    before
                )));
            }
        }
        self.state.live.fetch_add(1, Ordering::AcqRel);
        Ok(HostScratch {
            words: vec![0u64; byte_size.div_ceil(size_of::<u64>())],
            bytes: byte_size,
            state: Arc::clone(&self.state),
        })
    }

    fn device_memory(buffer: &HostScratch) -> DeviceMemory<u8> {
        DeviceMemory::new(buffer.words.as_ptr() as u64, buffer.bytes)
    }
}

impl Drop for HostScratch {
    fn drop(&mut self) {
        self.state.outstanding.fetch_sub(self.bytes, Ordering::AcqRel);
        self.state.live.fetch_sub(1, Ordering::AcqRel);
    }
}

/// CPU implementation of [`BlasStream`] over host addresses.
#[derive(Debug, Default)]
pub struct HostBlasStream {
    calls: AtomicUsize,
    scratch_fallbacks: AtomicUsize,
}

impl HostBlasStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Completed `gemm_batched` calls.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Acquire)
    }

    /// Calls that built their pointer tables without scratch.
    pub fn scratch_fallbacks(&self) -> usize {
        self.scratch_fallbacks.load(Ordering::Acquire)
    }
}

fn check_params<T>(p: &GemmBatched<T>, a: usize, b: usize, c: usize) -> std::result::Result<(), BlasError> {
    if a != p.batch || b != p.batch || c != p.batch {
        return Err(BlasError::InvalidValue(format!(
            "pointer arrays hold {a}/{b}/{c} entries for batch {}",
            p.batch
        )));
    }
    let a_rows = if p.transa.is_transposed() { p.k } else { p.m };
    let b_rows = if p.transb.is_transposed() { p.n } else { p.k };
    if p.lda < a_rows.max(1) || p.ldb < b_rows.max(1) || p.ldc < p.m.max(1) {
        return Err(BlasError::InvalidValue(format!(
            "leading dimensions lda={} ldb={} ldc={} too small for m={} n={} k={}",
            p.lda, p.ldb, p.ldc, p.m, p.n, p.k
        )));
    }
    Ok(())
}

#[inline]
fn op<T: Element>(trans: Transpose, data: &[T], ld: usize, row: usize, col: usize) -> T {
    match trans {
        Transpose::NoTranspose => data[row + col * ld],
        Transpose::Transpose => data[col + row * ld],
        Transpose::ConjugateTranspose => data[col + row * ld].conj(),
    }
}

/// Column-major `C = alpha * op(A) * op(B) + beta * C` for one product.
fn gemm<T: Element>(p: &GemmBatched<T>, a: &[T], b: &[T], c: &mut [T]) {
    for j in 0..p.n {
        for i in 0..p.m {
            let mut acc = T::zero();
            for l in 0..p.k {
                acc = T::mul_acc(acc, op(p.transa, a, p.lda, i, l), op(p.transb, b, p.ldb, l, j));
            }
            let out = &mut c[i + j * p.ldc];
            *out = if p.beta.is_zero() {
                p.alpha * acc
            } else {
                p.alpha * acc + p.beta * *out
            };
        }
    }
}

impl BlasStream for HostBlasStream {
    unsafe fn gemm_batched<T: GpuElement>(
        &self,
        params: &GemmBatched<T>,
        a: &[DeviceMemory<T>],
        b: &[DeviceMemory<T>],
        c: &[DeviceMemory<T>],
        scratch: &mut dyn ScratchAllocator,
    ) -> std::result::Result<(), BlasError> {
        check_params(params, a.len(), b.len(), c.len())?;
        let batch = params.batch;

        // Pointer tables for A, B and C, as a device launch would stage them.
        let table_len = 3 * batch;
        let mem = scratch.allocate_bytes(table_len * size_of::<u64>());
        let mut owned = Vec::new();
        let table: &mut [u64] = if !mem.is_null()
            && mem.len() >= table_len * size_of::<u64>()
            && mem.addr() % size_of::<u64>() as u64 == 0
        {
            std::slice::from_raw_parts_mut(mem.addr() as *mut u64, table_len)
        } else {
            tracing::debug!(batch, "no scratch for pointer tables, using host copy");
            self.scratch_fallbacks.fetch_add(1, Ordering::AcqRel);
            owned.resize(table_len, 0u64);
            &mut owned
        };
        for (i, ((a, b), c)) in a.iter().zip(b).zip(c).enumerate() {
            table[i] = a.addr();
            table[batch + i] = b.addr();
            table[2 * batch + i] = c.addr();
        }

        for i in 0..batch {
            if table[2 * batch + i] == 0 && !c[i].is_empty() {
                return Err(BlasError::Memory(format!("null output pointer for batch entry {i}")));
            }
            let a_i = std::slice::from_raw_parts(table[i] as *const T, a[i].len());
            let b_i = std::slice::from_raw_parts(table[batch + i] as *const T, b[i].len());
            let c_i = std::slice::from_raw_parts_mut(table[2 * batch + i] as *mut T, c[i].len());
            gemm(params, a_i, b_i, c_i);
        }

        self.calls.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

/// Run a planned batch through [`HostBlasStream`] on host slices.
///
/// `x`, `y` and `z` are the contiguous `[batch, rows, cols]` buffers of
/// `shapes`.
pub fn launch_on_host<T: GpuElement>(
    stream: &HostBlasStream,
    allocator: &HostAllocator,
    x: &[T],
    y: &[T],
    shapes: &MatMulShapes,
    z: &mut [T],
) -> Result<()> {
    let zm = DeviceMemory::new(z.as_mut_ptr() as u64, z.len());
    // SAFETY: the addresses come from live host slices whose lengths travel
    // with them, `launch` rejects buffers shorter than `shapes` requires, and
    // `z` is a unique borrow so it cannot overlap `x` or `y`.
    unsafe { launch(Some(stream), allocator, host_memory(x), host_memory(y), zm, shapes) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_refuses_and_recovers() {
        let alloc = HostAllocator::with_budget(64);
        let first = alloc.allocate_temp(48).unwrap();
        assert!(alloc.allocate_temp(32).is_err());
        assert_eq!(alloc.refused(), 1);
        drop(first);
        assert_eq!(alloc.outstanding_bytes(), 0);
        assert!(alloc.allocate_temp(32).is_ok());
        assert_eq!(alloc.live_buffers(), 0);
    }

    #[test]
    fn test_column_major_gemm() {
        // A = [[1, 2], [3, 4]] and B = [[5, 6], [7, 8]], column-major.
        let a = [1.0f32, 3.0, 2.0, 4.0];
        let b = [5.0f32, 7.0, 6.0, 8.0];
        let mut c = [0.0f32; 4];
        let p = GemmBatched {
            transa: Transpose::NoTranspose,
            transb: Transpose::NoTranspose,
            m: 2,
            n: 2,
            k: 2,
            alpha: 1.0,
            lda: 2,
            ldb: 2,
            beta: 0.0,
            ldc: 2,
            batch: 1,
        };
        gemm(&p, &a, &b, &mut c);
        assert_eq!(c, [19.0, 43.0, 22.0, 50.0]);

        let p = GemmBatched {
            transa: Transpose::Transpose,
            ..p
        };
        gemm(&p, &a, &b, &mut c);
        // A^T * B
        assert_eq!(c, [26.0, 38.0, 30.0, 44.0]);
    }

    #[test]
    fn test_rejects_short_leading_dimension() {
        let p = GemmBatched {
            transa: Transpose::NoTranspose,
            transb: Transpose::NoTranspose,
            m: 4,
            n: 2,
            k: 3,
            alpha: 1.0f64,
            lda: 3,
            ldb: 3,
            beta: 0.0,
            ldc: 4,
            batch: 1,
        };
        assert!(matches!(check_params(&p, 1, 1, 1), Err(BlasError::InvalidValue(_))));
        assert!(check_params(&GemmBatched { lda: 4, ..p }, 1, 1, 1).is_ok());
    }
}
