//! cuBLAS-backed [`BlasStream`] and a device temp allocator.

use std::mem::size_of;
use std::sync::Arc;

use batchmat_core::{BatchMatError, DType, Result};
use cudarc::cublas::sys::{self, cublasOperation_t, cublasStatus_t};
use cudarc::cublas::CudaBlas;
use cudarc::driver::{result as driver, CudaDevice, CudaSlice, DevicePtr, DeviceSlice};

use super::context::{get_blas, get_device};
use crate::gpu::{
    BlasError, BlasStream, DeviceMemory, GemmBatched, GpuElement, ScratchAllocator, TempAllocator, Transpose,
};

/// Temporaries carved from a device's memory pool.
pub struct CudaTempAllocator {
    device: Arc<CudaDevice>,
}

impl CudaTempAllocator {
    pub fn new(device_idx: usize) -> Result<Self> {
        Ok(Self {
            device: get_device(device_idx)?,
        })
    }
}

impl TempAllocator for CudaTempAllocator {
    type Buffer = CudaSlice<u8>;

    fn allocate_temp(&self, byte_size: usize) -> Result<CudaSlice<u8>> {
        // Uninitialised: callers overwrite every byte they read, and the
        // allocation is ordered on the same stream as their uploads.
        unsafe { self.device.alloc::<u8>(byte_size) }
            .map_err(|e| BatchMatError::CudaError(format!("alloc({byte_size} bytes): {e}")))
    }

    fn device_memory(buffer: &CudaSlice<u8>) -> DeviceMemory<u8> {
        DeviceMemory::new(*buffer.device_ptr(), buffer.len())
    }
}

/// Batched GEMM on a device's default stream.
pub struct CublasStream {
    device: Arc<CudaDevice>,
    blas: Arc<CudaBlas>,
}

impl CublasStream {
    pub fn new(device_idx: usize) -> Result<Self> {
        Ok(Self {
            device: get_device(device_idx)?,
            blas: get_blas(device_idx)?,
        })
    }

    pub fn device(&self) -> &Arc<CudaDevice> {
        &self.device
    }
}

fn operation(t: Transpose) -> cublasOperation_t {
    match t {
        Transpose::NoTranspose => cublasOperation_t::CUBLAS_OP_N,
        Transpose::Transpose => cublasOperation_t::CUBLAS_OP_T,
        Transpose::ConjugateTranspose => cublasOperation_t::CUBLAS_OP_C,
    }
}

fn dim(v: usize, name: &str) -> std::result::Result<i32, BlasError> {
    i32::try_from(v).map_err(|_| BlasError::InvalidValue(format!("{name}={v} exceeds i32")))
}

impl BlasStream for CublasStream {
    unsafe fn gemm_batched<T: GpuElement>(
        &self,
        params: &GemmBatched<T>,
        a: &[DeviceMemory<T>],
        b: &[DeviceMemory<T>],
        c: &[DeviceMemory<T>],
        scratch: &mut dyn ScratchAllocator,
    ) -> std::result::Result<(), BlasError> {
        let batch = params.batch;
        if a.len() != batch || b.len() != batch || c.len() != batch {
            return Err(BlasError::InvalidValue(format!(
                "pointer arrays hold {}/{}/{} entries for batch {batch}",
                a.len(),
                b.len(),
                c.len()
            )));
        }

        let mut table: Vec<u64> = Vec::with_capacity(3 * batch);
        table.extend(a.iter().map(|m| m.addr()));
        table.extend(b.iter().map(|m| m.addr()));
        table.extend(c.iter().map(|m| m.addr()));

        // Stage the pointer tables in scratch when we get some, otherwise in
        // an allocation owned by this call.
        let bytes = table.len() * size_of::<u64>();
        let mem = scratch.allocate_bytes(bytes);
        let mut owned: Option<CudaSlice<u64>> = None;
        let base = if !mem.is_null() && mem.len() >= bytes {
            driver::memcpy_htod_async(mem.addr(), &table, *self.device.cu_stream())
                .map_err(|e| BlasError::Memory(format!("pointer table upload: {e}")))?;
            mem.addr()
        } else {
            tracing::debug!(batch, "no scratch for pointer tables, allocating locally");
            let slice = self
                .device
                .htod_sync_copy(&table)
                .map_err(|e| BlasError::Memory(format!("pointer table upload: {e}")))?;
            let base = *slice.device_ptr();
            owned = Some(slice);
            base
        };
        let a_ptrs = base;
        let b_ptrs = base + (batch * size_of::<u64>()) as u64;
        let c_ptrs = base + (2 * batch * size_of::<u64>()) as u64;

        let handle = *self.blas.handle();
        let (transa, transb) = (operation(params.transa), operation(params.transb));
        let (m, n, k) = (dim(params.m, "m")?, dim(params.n, "n")?, dim(params.k, "k")?);
        let (lda, ldb, ldc) = (dim(params.lda, "lda")?, dim(params.ldb, "ldb")?, dim(params.ldc, "ldc")?);
        let count = dim(batch, "batch")?;
        let alpha = &params.alpha as *const T;
        let beta = &params.beta as *const T;

        macro_rules! call {
            ($f:path) => {
                $f(
                    handle,
                    transa,
                    transb,
                    m,
                    n,
                    k,
                    alpha as *const _,
                    a_ptrs as *const *const _,
                    lda,
                    b_ptrs as *const *const _,
                    ldb,
                    beta as *const _,
                    c_ptrs as *const *mut _,
                    ldc,
                    count,
                )
            };
        }

        let status = match T::DTYPE {
            DType::F16 => call!(sys::cublasHgemmBatched),
            DType::F32 => call!(sys::cublasSgemmBatched),
            DType::F64 => call!(sys::cublasDgemmBatched),
            DType::C64 => call!(sys::cublasCgemmBatched),
            DType::C128 => call!(sys::cublasZgemmBatched),
            DType::I32 => return Err(BlasError::InvalidValue("no batched gemm for i32".into())),
        };
        if status != cublasStatus_t::CUBLAS_STATUS_SUCCESS {
            return Err(BlasError::ExecutionFailed(format!("{status:?}")));
        }

        // The upload reads `table` and cuBLAS reads the staged copy
        // asynchronously; both must outlive the enqueued work.
        self.device
            .synchronize()
            .map_err(|e| BlasError::ExecutionFailed(format!("synchronize: {e}")))?;
        drop(owned);
        drop(table);
        Ok(())
    }
}
