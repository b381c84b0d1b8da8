//! Tunable heuristics for the batched matmul engine.

use std::path::Path;

use batchmat_core::{BatchMatError, Result};
use serde::{Deserialize, Serialize};

/// Heuristic constants for CPU scheduling.
///
/// Defaults reproduce the long-standing behaviour of the engine; tests and
/// embedders override them to force a particular schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchMatMulConfig {
    /// Per-matrix cost (`rows * inner * cols`) above which outer, across-batch
    /// parallelism is abandoned in favour of parallelising each product.
    pub max_cost_outer_parallelism: u64,

    /// Minimum cost a shard must carry before the sharder splits the batch
    /// any further.
    pub min_cost_per_shard: u64,

    /// Threads withheld from outer sharding while inner parallelism is also
    /// enabled. Bounds the number of parallel contractions in flight on the
    /// shared pool to `num_threads - reserved_inner_threads`.
    pub reserved_inner_threads: usize,

    /// Output rows handed to each task when one product runs in parallel.
    pub inner_rows_per_task: usize,
}

impl Default for BatchMatMulConfig {
    fn default() -> Self {
        Self {
            max_cost_outer_parallelism: 128 * 256 * 256,
            min_cost_per_shard: 10_000,
            reserved_inner_threads: 1,
            inner_rows_per_task: 16,
        }
    }
}

impl BatchMatMulConfig {
    pub fn with_max_cost_outer_parallelism(mut self, cost: u64) -> Self {
        self.max_cost_outer_parallelism = cost;
        self
    }

    pub fn with_min_cost_per_shard(mut self, cost: u64) -> Self {
        self.min_cost_per_shard = cost;
        self
    }

    pub fn with_reserved_inner_threads(mut self, threads: usize) -> Self {
        self.reserved_inner_threads = threads;
        self
    }

    pub fn with_inner_rows_per_task(mut self, rows: usize) -> Self {
        self.inner_rows_per_task = rows;
        self
    }

    /// Reject values the scheduler cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.min_cost_per_shard == 0 {
            return Err(BatchMatError::InvalidConfig(
                "min_cost_per_shard must be > 0".into(),
            ));
        }
        if self.inner_rows_per_task == 0 {
            return Err(BatchMatError::InvalidConfig(
                "inner_rows_per_task must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| BatchMatError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            BatchMatError::InvalidConfig(format!("{}: {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }
}
