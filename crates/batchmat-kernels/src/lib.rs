//! # batchmat-kernels
//!
//! Execution engine for batched dense matrix multiplication.
//!
//! Provides:
//! - Shape validation and the canonical `[batch, rows, cols]` plan
//! - Cost-based choice between outer (batch) and inner (per-product)
//!   parallelism on a shared rayon pool
//! - Contraction kernels specialised at compile time for real and complex kinds
//! - A batched-GEMM launcher with a call-scoped scratch allocator, a
//!   host-emulated BLAS stream, and cuBLAS (behind `cuda` feature flag)
//! - The `BatchMatMul` op with its (device, dtype) dispatch table

pub mod batch_matmul;
pub mod config;
pub mod context;
pub mod cpu;
pub mod gpu;
pub mod reshape;
pub mod sharder;

#[cfg(feature = "cuda")]
pub mod cuda;

pub use batch_matmul::{supported_dtypes, BatchMatMul};
pub use config::BatchMatMulConfig;
pub use context::ExecContext;
pub use cpu::{choose_strategy, DispatchReport, Schedule, Strategy};
pub use reshape::MatMulShapes;
pub use sharder::CpuWorkers;
