//! CPU backend: cost-based dispatch over the shared worker pool, and the
//! real/complex contraction kernels it drives.

pub mod contraction;
pub mod dispatch;

pub use contraction::InnerBatchKernel;
pub use dispatch::{choose_strategy, launch_cpu, DispatchReport, Schedule, Strategy};
