use std::sync::Arc;

use crate::element::{Element, HostBuffer};
use crate::{BatchMatError, DType, Device, Result};

#[cfg(feature = "cuda")]
use cudarc::driver::{CudaDevice, CudaSlice, DeviceSlice};

/// Backing storage for tensor data.
#[derive(Debug, Clone)]
pub enum StorageData {
    /// Typed host memory.
    Cpu(HostBuffer),
    /// CUDA GPU storage: device handle plus raw byte buffer.
    #[cfg(feature = "cuda")]
    Cuda {
        device: Arc<CudaDevice>,
        buffer: Arc<CudaSlice<u8>>,
        device_idx: usize,
    },
}

/// Shared, reference-counted tensor storage.
///
/// Clones share the same allocation (a reshape is just a new shape over the
/// same storage). Mutable access on the host copies first if shared.
#[derive(Debug, Clone)]
pub struct Storage {
    data: Arc<StorageData>,
    dtype: DType,
    device: Device,
    numel: usize,
}

impl Storage {
    /// Allocate zeroed host storage.
    pub fn zeros(dtype: DType, numel: usize) -> Self {
        Self::from_host(HostBuffer::zeros(dtype, numel))
    }

    pub fn from_host(buf: HostBuffer) -> Self {
        Self {
            dtype: buf.dtype(),
            numel: buf.len(),
            device: Device::Cpu,
            data: Arc::new(StorageData::Cpu(buf)),
        }
    }

    pub fn from_vec<T: Element>(data: Vec<T>) -> Self {
        Self::from_host(T::into_buffer(data))
    }

    /// Create host storage from raw bytes.
    pub fn from_bytes(dtype: DType, numel: usize, bytes: &[u8]) -> Result<Self> {
        let expected = dtype.storage_bytes(numel);
        if bytes.len() != expected {
            return Err(BatchMatError::StorageError(format!(
                "Expected {} bytes for {} elements of {}, got {}",
                expected,
                numel,
                dtype,
                bytes.len()
            )));
        }
        let buf = HostBuffer::from_bytes(dtype, bytes).ok_or_else(|| {
            BatchMatError::StorageError(format!("{} bytes is not a whole number of {dtype}", bytes.len()))
        })?;
        Ok(Self::from_host(buf))
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Number of logical elements.
    pub fn numel(&self) -> usize {
        self.numel
    }

    pub fn nbytes(&self) -> usize {
        self.dtype.storage_bytes(self.numel)
    }

    /// Typed host data. `None` on dtype mismatch or if the data is on a GPU.
    pub fn as_slice<T: Element>(&self) -> Option<&[T]> {
        match self.data.as_ref() {
            StorageData::Cpu(buf) => T::slice(buf),
            #[cfg(feature = "cuda")]
            StorageData::Cuda { .. } => None,
        }
    }

    /// Typed mutable host data, cloning first if the storage is shared.
    pub fn as_slice_mut<T: Element>(&mut self) -> Option<&mut [T]> {
        match Arc::make_mut(&mut self.data) {
            StorageData::Cpu(buf) => T::slice_mut(buf),
            #[cfg(feature = "cuda")]
            StorageData::Cuda { .. } => None,
        }
    }

    /// Whether no other tensor shares this allocation.
    pub fn is_unique(&self) -> bool {
        Arc::strong_count(&self.data) == 1
    }

    pub fn is_cpu(&self) -> bool {
        self.device.is_cpu()
    }

    pub fn is_cuda(&self) -> bool {
        self.device.is_cuda()
    }

    pub fn data(&self) -> &StorageData {
        self.data.as_ref()
    }

    /// Copy host storage to a CUDA device (H2D). No-op if already there.
    #[cfg(feature = "cuda")]
    pub fn to_cuda(&self, device_idx: usize) -> Result<Self> {
        let buf = match self.data.as_ref() {
            StorageData::Cpu(buf) => buf,
            StorageData::Cuda { device_idx: cur, .. } if *cur == device_idx => {
                return Ok(self.clone())
            }
            StorageData::Cuda { .. } => {
                return self.to_cpu()?.to_cuda(device_idx);
            }
        };
        let cuda_dev = CudaDevice::new(device_idx)
            .map_err(|e| BatchMatError::CudaError(format!("device {device_idx} init: {e}")))?;
        let gpu_buf = cuda_dev
            .htod_sync_copy(buf.as_bytes())
            .map_err(|e| BatchMatError::CudaError(format!("H2D copy: {e}")))?;
        Ok(Self::from_cuda(cuda_dev, gpu_buf, device_idx, self.dtype, self.numel))
    }

    /// Copy CUDA storage back to the host (D2H, synchronous).
    #[cfg(feature = "cuda")]
    pub fn to_cpu(&self) -> Result<Self> {
        match self.data.as_ref() {
            StorageData::Cpu(_) => Ok(self.clone()),
            StorageData::Cuda { device, buffer, .. } => {
                let bytes: Vec<u8> = device
                    .dtoh_sync_copy(buffer.as_ref())
                    .map_err(|e| BatchMatError::CudaError(format!("D2H copy: {e}")))?;
                Self::from_bytes(self.dtype, self.numel, &bytes)
            }
        }
    }

    /// Allocate zeroed CUDA storage.
    #[cfg(feature = "cuda")]
    pub fn cuda_zeros(dtype: DType, numel: usize, device: Arc<CudaDevice>, device_idx: usize) -> Result<Self> {
        let gpu_buf = device
            .alloc_zeros::<u8>(dtype.storage_bytes(numel))
            .map_err(|e| BatchMatError::CudaError(format!("alloc_zeros: {e}")))?;
        Ok(Self::from_cuda(device, gpu_buf, device_idx, dtype, numel))
    }

    /// Underlying device buffer, if on a GPU.
    #[cfg(feature = "cuda")]
    pub fn as_cuda_slice(&self) -> Option<&CudaSlice<u8>> {
        match self.data.as_ref() {
            StorageData::Cuda { buffer, .. } => Some(buffer.as_ref()),
            StorageData::Cpu(_) => None,
        }
    }

    #[cfg(feature = "cuda")]
    pub fn from_cuda(
        device: Arc<CudaDevice>,
        buffer: CudaSlice<u8>,
        device_idx: usize,
        dtype: DType,
        numel: usize,
    ) -> Self {
        debug_assert!(buffer.len() >= dtype.storage_bytes(numel));
        Self {
            data: Arc::new(StorageData::Cuda {
                device,
                buffer: Arc::new(buffer),
                device_idx,
            }),
            dtype,
            device: Device::Cuda(device_idx),
            numel,
        }
    }
}
