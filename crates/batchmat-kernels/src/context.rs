//! Execution handles supplied by the host framework.

use batchmat_core::Result;

use crate::config::BatchMatMulConfig;
use crate::sharder::CpuWorkers;

/// CPU worker pool plus the heuristics that drive scheduling on it.
#[derive(Debug, Clone, Default)]
pub struct ExecContext {
    pub workers: CpuWorkers,
    pub config: BatchMatMulConfig,
}

impl ExecContext {
    /// Validates `config` before accepting it.
    pub fn new(workers: CpuWorkers, config: BatchMatMulConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { workers, config })
    }

    /// Dedicated pool of `num_threads` workers with default heuristics.
    pub fn with_threads(num_threads: usize) -> Result<Self> {
        Ok(Self {
            workers: CpuWorkers::with_threads(num_threads)?,
            config: BatchMatMulConfig::default(),
        })
    }

    pub fn num_threads(&self) -> usize {
        self.workers.num_threads()
    }
}
