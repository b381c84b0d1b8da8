//! Cost-based choice between outer (across-batch) and inner (within-product)
//! parallelism.
//!
//! One huge product gains nothing from sharding the batch, and many tiny
//! products lose to the overhead of parallelising each one. Running
//! `num_threads` or more parallel contractions at once on the same bounded
//! pool has also been seen to deadlock, so while inner parallelism is on the
//! outer sharding withholds `reserved_inner_threads` workers. That bound is a
//! mitigation, not a proof of freedom from deadlock.

use batchmat_core::Element;

use super::contraction::{InnerBatchKernel, InnerContext};
use crate::config::BatchMatMulConfig;
use crate::reshape::MatMulShapes;
use crate::sharder::{shard, CpuWorkers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// All products run one after another on the calling thread, each
    /// allowed to use the whole pool.
    Inner,
    /// The batch is sharded across the pool.
    Outer,
}

/// Scheduling decision for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub strategy: Strategy,
    pub parallelize_inner: bool,
    /// Parallelism handed to the sharder (1 for [`Strategy::Inner`]).
    pub outer_threads: usize,
}

/// What a CPU launch actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub schedule: Schedule,
    pub shards: usize,
}

impl DispatchReport {
    pub fn strategy(&self) -> Strategy {
        self.schedule.strategy
    }
}

pub fn choose_strategy(
    batch: usize,
    cost_per_unit: u64,
    out_cols: usize,
    num_threads: usize,
    config: &BatchMatMulConfig,
) -> Schedule {
    if batch == 1 || (cost_per_unit > config.max_cost_outer_parallelism && out_cols > 1) {
        return Schedule {
            strategy: Strategy::Inner,
            parallelize_inner: true,
            outer_threads: 1,
        };
    }

    let parallelize_inner = num_threads > batch && out_cols > 1;
    let outer_threads = if parallelize_inner {
        num_threads.saturating_sub(config.reserved_inner_threads).max(1)
    } else {
        num_threads.max(1)
    };
    Schedule {
        strategy: Strategy::Outer,
        parallelize_inner,
        outer_threads,
    }
}

/// Run a validated, non-degenerate batch on the CPU.
///
/// `x`, `y` and `z` are the contiguous `[batch, rows, cols]` buffers
/// described by `shapes`.
pub fn launch_cpu<T>(
    workers: &CpuWorkers,
    config: &BatchMatMulConfig,
    x: &[T],
    y: &[T],
    shapes: &MatMulShapes,
    z: &mut [T],
) -> DispatchReport
where
    T: Element,
    T::Kind: InnerBatchKernel,
{
    let batch = shapes.batch;
    let cost_per_unit = shapes.cost_per_unit();
    let num_threads = workers.num_threads();
    let schedule = choose_strategy(batch, cost_per_unit, shapes.n, num_threads, config);

    let ctx = InnerContext {
        workers,
        parallelize_inner: schedule.parallelize_inner,
        rows_per_task: config.inner_rows_per_task.max(1),
    };

    let shards = match schedule.strategy {
        Strategy::Inner => {
            <T::Kind as InnerBatchKernel>::run(&ctx, x, y, shapes, 0..batch, z);
            1
        }
        Strategy::Outer => shard(
            workers,
            schedule.outer_threads,
            batch,
            cost_per_unit,
            config.min_cost_per_shard,
            z,
            shapes.out_matrix_len(),
            |range, z_shard| <T::Kind as InnerBatchKernel>::run(&ctx, x, y, shapes, range, z_shard),
        ),
    };

    let dtype = T::DTYPE;
    tracing::debug!(
        %dtype,
        batch,
        cost_per_unit,
        num_threads,
        strategy = ?schedule.strategy,
        parallelize_inner = schedule.parallelize_inner,
        outer_threads = schedule.outer_threads,
        shards,
        "batch matmul dispatched"
    );

    if shapes.adj_x {
        <T::Kind as InnerBatchKernel>::conjugate(workers, z);
    }

    DispatchReport { schedule, shards }
}
