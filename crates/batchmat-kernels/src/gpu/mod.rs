//! GPU execution: one batched GEMM per call through a [`BlasStream`].

pub mod host;
pub mod launch;
pub mod memory;
pub mod stream;

pub use host::{host_memory, launch_on_host, HostAllocator, HostBlasStream};
pub use launch::{gemm_params, launch};
pub use memory::{BlasScratchAllocator, DeviceMemory, ScratchAllocator, TempAllocator};
pub use stream::{BlasError, BlasStream, GemmBatched, GpuElement, Transpose};
