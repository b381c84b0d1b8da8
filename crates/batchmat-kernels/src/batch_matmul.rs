//! The batched matmul op: validation, degenerate cases and backend dispatch.

use batchmat_core::{
    f16, BatchMatError, Complex32, Complex64, DType, Device, DeviceKind, Element, Result, Shape, Tensor,
};

use crate::config::BatchMatMulConfig;
use crate::context::ExecContext;
use crate::cpu::{launch_cpu, DispatchReport, InnerBatchKernel};
use crate::reshape::MatMulShapes;

type CpuLaunchFn = fn(&ExecContext, &BatchMatMulConfig, &Tensor, &Tensor, &MatMulShapes, &mut Tensor) -> Result<DispatchReport>;

#[cfg(feature = "cuda")]
type GpuLaunchFn = fn(&Tensor, &Tensor, &MatMulShapes) -> Result<Tensor>;

/// A registered backend entry point.
#[derive(Clone, Copy)]
enum Kernel {
    Cpu(CpuLaunchFn),
    #[cfg(feature = "cuda")]
    Gpu(GpuLaunchFn),
}

fn lookup(device: DeviceKind, dtype: DType) -> Option<Kernel> {
    match (device, dtype) {
        (DeviceKind::Cpu, DType::F16) => Some(Kernel::Cpu(cpu_kernel::<f16>)),
        (DeviceKind::Cpu, DType::F32) => Some(Kernel::Cpu(cpu_kernel::<f32>)),
        (DeviceKind::Cpu, DType::F64) => Some(Kernel::Cpu(cpu_kernel::<f64>)),
        (DeviceKind::Cpu, DType::I32) => Some(Kernel::Cpu(cpu_kernel::<i32>)),
        (DeviceKind::Cpu, DType::C64) => Some(Kernel::Cpu(cpu_kernel::<Complex32>)),
        (DeviceKind::Cpu, DType::C128) => Some(Kernel::Cpu(cpu_kernel::<Complex64>)),
        #[cfg(feature = "cuda")]
        (DeviceKind::Gpu, DType::F16) => Some(Kernel::Gpu(crate::cuda::launch_tensors::<f16>)),
        #[cfg(feature = "cuda")]
        (DeviceKind::Gpu, DType::F32) => Some(Kernel::Gpu(crate::cuda::launch_tensors::<f32>)),
        #[cfg(feature = "cuda")]
        (DeviceKind::Gpu, DType::F64) => Some(Kernel::Gpu(crate::cuda::launch_tensors::<f64>)),
        #[cfg(feature = "cuda")]
        (DeviceKind::Gpu, DType::C64) => Some(Kernel::Gpu(crate::cuda::launch_tensors::<Complex32>)),
        #[cfg(feature = "cuda")]
        (DeviceKind::Gpu, DType::C128) => Some(Kernel::Gpu(crate::cuda::launch_tensors::<Complex64>)),
        _ => None,
    }
}

/// Dtypes with a kernel registered for `device` in this build.
pub fn supported_dtypes(device: Device) -> Vec<DType> {
    DType::ALL
        .iter()
        .copied()
        .filter(|&dtype| lookup(device.kind(), dtype).is_some())
        .collect()
}

fn cpu_kernel<T>(
    ctx: &ExecContext,
    config: &BatchMatMulConfig,
    x: &Tensor,
    y: &Tensor,
    shapes: &MatMulShapes,
    out: &mut Tensor,
) -> Result<DispatchReport>
where
    T: Element,
    T::Kind: InnerBatchKernel,
{
    let storage_err = |what: &str| BatchMatError::StorageError(format!("{what} is not a host {} buffer", T::DTYPE));
    let xs = x.as_slice::<T>().ok_or_else(|| storage_err("lhs"))?;
    let ys = y.as_slice::<T>().ok_or_else(|| storage_err("rhs"))?;
    let zs = out.as_slice_mut::<T>().ok_or_else(|| storage_err("output"))?;
    Ok(launch_cpu(&ctx.workers, config, xs, ys, shapes, zs))
}

fn alloc_output(device: Device, dtype: DType, shape: &Shape) -> Result<Tensor> {
    match device {
        Device::Cpu => Ok(Tensor::zeros(shape.dims(), dtype)),
        #[cfg(feature = "cuda")]
        Device::Cuda(idx) => {
            let dev = crate::cuda::get_device(idx)?;
            let storage = batchmat_core::Storage::cuda_zeros(dtype, shape.numel(), dev, idx)?;
            Tensor::from_storage(storage, shape.dims())
        }
        #[cfg(not(feature = "cuda"))]
        Device::Cuda(_) => Err(BatchMatError::UnsupportedKernel {
            device: DeviceKind::Gpu,
            dtype,
        }),
    }
}

/// `out[..., :, :] = adjoint?(x[..., :, :]) · adjoint?(y[..., :, :])`.
///
/// # Examples
///
/// ```
/// use batchmat_core::Tensor;
/// use batchmat_kernels::{BatchMatMul, ExecContext};
///
/// let x = Tensor::from_vec(vec![1.0f32, 2.0, 3.0, 4.0], &[1, 2, 2]).unwrap();
/// let y = Tensor::from_vec(vec![1.0f32, 0.0, 0.0, 1.0], &[1, 2, 2]).unwrap();
/// let z = BatchMatMul::new(false, false)
///     .compute(&ExecContext::default(), &x, &y)
///     .unwrap();
/// assert_eq!(z.to_vec::<f32>().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct BatchMatMul {
    adj_x: bool,
    adj_y: bool,
    config: Option<BatchMatMulConfig>,
}

impl BatchMatMul {
    pub fn new(adj_x: bool, adj_y: bool) -> Self {
        Self {
            adj_x,
            adj_y,
            config: None,
        }
    }

    /// Override the context's heuristics for this op.
    pub fn with_config(mut self, config: BatchMatMulConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn adj_x(&self) -> bool {
        self.adj_x
    }

    pub fn adj_y(&self) -> bool {
        self.adj_y
    }

    fn config<'a>(&'a self, ctx: &'a ExecContext) -> &'a BatchMatMulConfig {
        self.config.as_ref().unwrap_or(&ctx.config)
    }

    /// Validate a pair of operand shapes and return the output shape.
    pub fn output_shape(&self, x: &Shape, y: &Shape) -> Result<Shape> {
        Ok(MatMulShapes::plan(x, y, self.adj_x, self.adj_y)?.out)
    }

    /// Multiply two tensors on their (shared) device into a new tensor.
    pub fn compute(&self, ctx: &ExecContext, x: &Tensor, y: &Tensor) -> Result<Tensor> {
        if x.dtype() != y.dtype() {
            return Err(BatchMatError::DTypeMismatch {
                lhs: x.dtype(),
                rhs: y.dtype(),
            });
        }
        if x.device() != y.device() {
            return Err(BatchMatError::DeviceMismatch {
                lhs: x.device(),
                rhs: y.device(),
            });
        }
        let (device, dtype) = (x.device(), x.dtype());
        let kernel = lookup(device.kind(), dtype).ok_or(BatchMatError::UnsupportedKernel {
            device: device.kind(),
            dtype,
        })?;

        let shapes = MatMulShapes::plan(x.shape(), y.shape(), self.adj_x, self.adj_y)?;
        if shapes.is_empty_output() {
            tracing::trace!(out = %shapes.out, "empty output");
            return alloc_output(device, dtype, &shapes.out);
        }
        if shapes.is_empty_contraction() {
            tracing::trace!(out = %shapes.out, "empty operand, zero-filled output");
            return alloc_output(device, dtype, &shapes.out);
        }

        let [x_dims, y_dims, z_dims] = shapes.canonical()?;
        let x3 = x.reshape(x_dims.dims())?;
        let y3 = y.reshape(y_dims.dims())?;

        match kernel {
            Kernel::Cpu(launch) => {
                let mut z3 = Tensor::zeros(z_dims.dims(), dtype);
                launch(ctx, self.config(ctx), &x3, &y3, &shapes, &mut z3)?;
                z3.reshape(shapes.out.dims())
            }
            #[cfg(feature = "cuda")]
            Kernel::Gpu(launch) => launch(&x3, &y3, &shapes),
        }
    }

    /// Multiply host slices into a caller-owned output.
    ///
    /// `out` is left untouched when the output shape has no elements and is
    /// zero-filled when the contraction dimension is empty; neither case
    /// dispatches, so `None` is returned.
    pub fn compute_into<T>(
        &self,
        ctx: &ExecContext,
        x: &[T],
        x_shape: &[usize],
        y: &[T],
        y_shape: &[usize],
        out: &mut [T],
    ) -> Result<Option<DispatchReport>>
    where
        T: Element,
        T::Kind: InnerBatchKernel,
    {
        let (xs, ys) = (Shape::new(x_shape), Shape::new(y_shape));
        for (shape, len) in [(&xs, x.len()), (&ys, y.len())] {
            if shape.numel() != len {
                return Err(BatchMatError::ShapeMismatch {
                    shape: shape.clone(),
                    expected: shape.numel(),
                    got: len,
                });
            }
        }

        let shapes = MatMulShapes::plan(&xs, &ys, self.adj_x, self.adj_y)?;
        if out.len() != shapes.out.numel() {
            return Err(BatchMatError::ShapeMismatch {
                expected: shapes.out.numel(),
                got: out.len(),
                shape: shapes.out,
            });
        }
        if shapes.is_empty_output() {
            return Ok(None);
        }
        if shapes.is_empty_contraction() {
            out.fill(T::zero());
            return Ok(None);
        }

        Ok(Some(launch_cpu(&ctx.workers, self.config(ctx), x, y, &shapes, out)))
    }
}
