//! CUDA backend: cuBLAS batched GEMM over device-resident tensors.

pub mod context;
pub mod stream;

pub use context::{get_blas, get_device, is_cuda_available};
pub use stream::{CublasStream, CudaTempAllocator};

use batchmat_core::{BatchMatError, Result, Storage, Tensor};
use cudarc::driver::DevicePtr;

use crate::gpu::{launch, DeviceMemory, GpuElement};
use crate::reshape::MatMulShapes;

fn device_memory<T>(storage: &Storage, what: &str) -> Result<DeviceMemory<T>> {
    let slice = storage
        .as_cuda_slice()
        .ok_or_else(|| BatchMatError::CudaError(format!("{what} is not device resident")))?;
    Ok(DeviceMemory::new(*slice.device_ptr(), storage.numel()))
}

/// Multiply two device tensors already reshaped to `[batch, rows, cols]`,
/// returning a new device tensor of `shapes.out`.
pub fn launch_tensors<T: GpuElement>(x: &Tensor, y: &Tensor, shapes: &MatMulShapes) -> Result<Tensor> {
    let device_idx = x
        .device()
        .cuda_index()
        .ok_or_else(|| BatchMatError::CudaError("lhs is not on a CUDA device".into()))?;
    let stream = CublasStream::new(device_idx)?;
    let allocator = CudaTempAllocator::new(device_idx)?;
    let out = Storage::cuda_zeros(T::DTYPE, shapes.out.numel(), stream.device().clone(), device_idx)?;

    let xm = device_memory::<T>(x.storage_ref(), "lhs")?;
    let ym = device_memory::<T>(y.storage_ref(), "rhs")?;
    let zm = device_memory::<T>(&out, "output")?;
    // SAFETY: all three buffers are live device allocations on `device_idx`
    // sized by their element counts, and `out` is freshly allocated.
    unsafe { launch(Some(&stream), &allocator, xm, ym, zm, shapes)? };

    Tensor::from_storage(out, shapes.out.dims())
}
