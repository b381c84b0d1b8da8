//! Per-GPU device and cuBLAS handle registry.
//!
//! Handles are created lazily on first use and cached for the life of the
//! process, one of each per GPU index.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use batchmat_core::{BatchMatError, Result};
use cudarc::cublas::CudaBlas;
use cudarc::driver::CudaDevice;
use parking_lot::Mutex;

static DEVICES: OnceLock<Mutex<HashMap<usize, Arc<CudaDevice>>>> = OnceLock::new();
static BLAS: OnceLock<Mutex<HashMap<usize, Arc<CudaBlas>>>> = OnceLock::new();

fn devices() -> &'static Mutex<HashMap<usize, Arc<CudaDevice>>> {
    DEVICES.get_or_init(|| Mutex::new(HashMap::new()))
}

fn blas_handles() -> &'static Mutex<HashMap<usize, Arc<CudaBlas>>> {
    BLAS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Get or create the device handle for `device_idx`.
pub fn get_device(device_idx: usize) -> Result<Arc<CudaDevice>> {
    let mut map = devices().lock();
    if let Some(dev) = map.get(&device_idx) {
        return Ok(Arc::clone(dev));
    }
    let dev = CudaDevice::new(device_idx)
        .map_err(|e| BatchMatError::CudaError(format!("device {device_idx} init: {e}")))?;
    tracing::debug!(device_idx, "cuda device initialized");
    map.insert(device_idx, Arc::clone(&dev));
    Ok(dev)
}

/// Get or create the cuBLAS handle bound to `device_idx`'s default stream.
pub fn get_blas(device_idx: usize) -> Result<Arc<CudaBlas>> {
    let mut map = blas_handles().lock();
    if let Some(blas) = map.get(&device_idx) {
        return Ok(Arc::clone(blas));
    }
    let dev = get_device(device_idx)?;
    let blas = CudaBlas::new(dev)
        .map_err(|e| BatchMatError::CudaError(format!("cublas handle for device {device_idx}: {e:?}")))?;
    let blas = Arc::new(blas);
    map.insert(device_idx, Arc::clone(&blas));
    Ok(blas)
}

pub fn is_cuda_available() -> bool {
    get_device(0).is_ok()
}
