use std::fmt;

use crate::dtype::DType;
use crate::device::Device;
use crate::element::Element;
use crate::error::BatchMatError;
use crate::shape::Shape;
use crate::storage::Storage;
use crate::Result;

/// A dense, contiguous, row-major array.
///
/// A rank-`r` tensor with `r ≥ 2` is read by the matmul engine as a batch of
/// `shape[..r-2].product()` matrices of shape `[shape[r-2], shape[r-1]]`.
///
/// # Examples
///
/// ```
/// use batchmat_core::Tensor;
///
/// let t = Tensor::from_vec(vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 1, 3]).unwrap();
/// assert_eq!(t.shape().batch_size(), 2);
///
/// // Reshape shares storage.
/// let flat = t.reshape(&[6]).unwrap();
/// assert_eq!(flat.as_slice::<f32>().unwrap().len(), 6);
/// ```
#[derive(Clone)]
pub struct Tensor {
    storage: Storage,
    shape: Shape,
}

impl Tensor {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Create a host tensor from typed data.
    pub fn from_vec<T: Element>(data: Vec<T>, shape: &[usize]) -> Result<Self> {
        let s = Shape::new(shape);
        if s.numel() != data.len() {
            return Err(BatchMatError::ShapeMismatch {
                expected: s.numel(),
                got: data.len(),
                shape: s,
            });
        }
        Ok(Self {
            storage: Storage::from_vec(data),
            shape: s,
        })
    }

    /// Create a host tensor from a borrowed slice.
    pub fn from_slice<T: Element>(data: &[T], shape: &[usize]) -> Result<Self> {
        Self::from_vec(data.to_vec(), shape)
    }

    /// Host tensor of zeros.
    pub fn zeros(shape: &[usize], dtype: DType) -> Self {
        let s = Shape::new(shape);
        Self {
            storage: Storage::zeros(dtype, s.numel()),
            shape: s,
        }
    }

    /// Wrap existing storage. The storage must hold exactly `shape.numel()`
    /// elements.
    pub fn from_storage(storage: Storage, shape: &[usize]) -> Result<Self> {
        let s = Shape::new(shape);
        if s.numel() != storage.numel() {
            return Err(BatchMatError::ShapeMismatch {
                expected: s.numel(),
                got: storage.numel(),
                shape: s,
            });
        }
        Ok(Self { storage, shape: s })
    }

    pub fn storage_ref(&self) -> &Storage {
        &self.storage
    }

    // =========================================================================
    // Properties
    // =========================================================================

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.ndim()
    }

    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    pub fn device(&self) -> Device {
        self.storage.device()
    }

    // =========================================================================
    // Data access
    // =========================================================================

    /// Typed host view. `None` on dtype mismatch or for GPU tensors.
    pub fn as_slice<T: Element>(&self) -> Option<&[T]> {
        self.storage.as_slice::<T>()
    }

    /// Typed mutable host view (copy-on-write if storage is shared).
    pub fn as_slice_mut<T: Element>(&mut self) -> Option<&mut [T]> {
        self.storage.as_slice_mut::<T>()
    }

    /// Copy the data out as a `Vec<T>`.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        self.as_slice::<T>().map(<[T]>::to_vec).ok_or_else(|| {
            BatchMatError::StorageError(format!(
                "cannot read {} tensor on {} as {}",
                self.dtype(),
                self.device(),
                T::DTYPE
            ))
        })
    }

    // =========================================================================
    // Shape operations
    // =========================================================================

    /// Reinterpret the shape without copying. Element count must match.
    pub fn reshape(&self, new_shape: &[usize]) -> Result<Tensor> {
        let resolved = self.shape.reshaped(new_shape).ok_or_else(|| {
            BatchMatError::InvalidReshape {
                numel: self.numel(),
                shape: Shape::new(new_shape),
            }
        })?;
        Ok(Tensor {
            storage: self.storage.clone(),
            shape: resolved,
        })
    }

    // =========================================================================
    // Device transfer
    // =========================================================================

    pub fn is_cpu(&self) -> bool {
        self.storage.is_cpu()
    }

    pub fn is_cuda(&self) -> bool {
        self.storage.is_cuda()
    }

    /// Move tensor to the specified device. No-op if already there.
    #[cfg(feature = "cuda")]
    pub fn to(&self, device: Device) -> Result<Tensor> {
        let storage = match device {
            Device::Cpu => self.storage.to_cpu()?,
            Device::Cuda(idx) => self.storage.to_cuda(idx)?,
        };
        Ok(Tensor {
            storage,
            shape: self.shape.clone(),
        })
    }

    #[cfg(feature = "cuda")]
    pub fn cuda(&self, device_idx: usize) -> Result<Tensor> {
        self.to(Device::Cuda(device_idx))
    }

    #[cfg(feature = "cuda")]
    pub fn cpu(&self) -> Result<Tensor> {
        self.to(Device::Cpu)
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("dtype", &self.dtype())
            .field("device", &self.device())
            .finish()
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tensor({}, dtype={}, device={})", self.shape, self.dtype(), self.device())
    }
}
