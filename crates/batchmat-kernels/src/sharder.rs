//! Work sharding over the shared CPU worker pool.
//!
//! The engine never spawns threads of its own. It is handed a [`CpuWorkers`]
//! handle by its host and submits contiguous ranges of the batch to it,
//! blocking until every range has finished.

use std::ops::Range;
use std::sync::Arc;

use batchmat_core::{BatchMatError, Result};
use rayon::{Scope, ThreadPool, ThreadPoolBuilder};

/// Handle to a bounded worker pool shared with the rest of the process.
#[derive(Clone, Debug)]
pub struct CpuWorkers {
    pool: Option<Arc<ThreadPool>>,
}

impl CpuWorkers {
    /// Use rayon's global pool.
    pub fn global() -> Self {
        Self { pool: None }
    }

    /// Build a dedicated pool of `num_threads` workers.
    pub fn with_threads(num_threads: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads.max(1))
            .thread_name(|i| format!("batchmat-worker-{i}"))
            .build()
            .map_err(|e| BatchMatError::InvalidConfig(format!("thread pool: {e}")))?;
        Ok(Self::from_pool(Arc::new(pool)))
    }

    /// Share an existing pool owned by the host.
    pub fn from_pool(pool: Arc<ThreadPool>) -> Self {
        Self { pool: Some(pool) }
    }

    pub fn num_threads(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    /// Run `op` with this pool as the current rayon pool, so parallel
    /// iterators inside it use these workers.
    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    /// Fork-join scope on this pool; returns once every spawned task is done.
    pub fn scope<'scope, OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce(&Scope<'scope>) -> R + Send,
        R: Send,
    {
        match &self.pool {
            Some(pool) => pool.scope(op),
            None => rayon::scope(op),
        }
    }
}

impl Default for CpuWorkers {
    fn default() -> Self {
        Self::global()
    }
}

/// Number of shards `[0, total)` is cut into.
pub fn num_shards(max_parallelism: usize, total: usize, cost_per_unit: u64, min_cost_per_shard: u64) -> usize {
    let total_cost = (total as u64).saturating_mul(cost_per_unit);
    let by_cost = (total_cost / min_cost_per_shard.max(1)).min(usize::MAX as u64) as usize;
    by_cost.min(max_parallelism).max(1)
}

/// Split `[0, total)` into contiguous shards and run `work` on each.
///
/// `out` holds `total` units of `unit_len` elements each; every shard gets
/// the sub-slice covering exactly its own units, so shards never alias.
/// A single shard runs inline on the caller. Returns the shard count.
pub fn shard<T, F>(
    workers: &CpuWorkers,
    max_parallelism: usize,
    total: usize,
    cost_per_unit: u64,
    min_cost_per_shard: u64,
    out: &mut [T],
    unit_len: usize,
    work: F,
) -> usize
where
    T: Send,
    F: Fn(Range<usize>, &mut [T]) + Sync,
{
    debug_assert_eq!(out.len(), total * unit_len);
    if total == 0 {
        return 0;
    }

    let shards = num_shards(max_parallelism, total, cost_per_unit, min_cost_per_shard);
    let block = total.div_ceil(shards);
    if block >= total || unit_len == 0 {
        work(0..total, out);
        return 1;
    }

    let work = &work;
    let mut spawned = 0;
    workers.scope(|s| {
        for (i, chunk) in out.chunks_mut(block * unit_len).enumerate() {
            let start = i * block;
            let limit = (start + block).min(total);
            spawned += 1;
            s.spawn(move |_| {
                tracing::trace!(start, limit, "shard");
                work(start..limit, chunk);
            });
        }
    });
    spawned
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_num_shards_bounds() {
        // Cheap work: one shard regardless of threads.
        assert_eq!(num_shards(8, 10, 10, 10_000), 1);
        // Expensive work: capped by parallelism.
        assert_eq!(num_shards(8, 1000, 1_000_000, 10_000), 8);
        // In between: limited by cost.
        assert_eq!(num_shards(8, 3, 10_000, 10_000), 3);
        assert_eq!(num_shards(0, 3, 10_000, 10_000), 1);
    }

    #[test]
    fn test_inline_single_shard() {
        let workers = CpuWorkers::with_threads(4).unwrap();
        let mut out = vec![0usize; 6];
        let n = shard(&workers, 4, 3, 1, 10_000, &mut out, 2, |r, chunk| {
            assert_eq!(r, 0..3);
            chunk.fill(7);
        });
        assert_eq!(n, 1);
        assert!(out.iter().all(|&v| v == 7));
    }

    #[test]
    fn test_shards_cover_range_disjointly() {
        let workers = CpuWorkers::with_threads(3).unwrap();
        let total = 10;
        let unit = 4;
        let mut out = vec![usize::MAX; total * unit];
        let calls = AtomicUsize::new(0);
        let n = shard(&workers, 3, total, 1_000_000, 10_000, &mut out, unit, |r, chunk| {
            calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(chunk.len(), r.len() * unit);
            for (j, unit_out) in chunk.chunks_mut(unit).enumerate() {
                unit_out.fill(r.start + j);
            }
        });
        assert_eq!(n, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        for (i, unit_out) in out.chunks(unit).enumerate() {
            assert!(unit_out.iter().all(|&v| v == i));
        }
    }

    #[test]
    fn test_empty_range() {
        let workers = CpuWorkers::global();
        let mut out: Vec<u8> = Vec::new();
        assert_eq!(shard(&workers, 4, 0, 1, 1, &mut out, 3, |_, _| panic!("no work")), 0);
    }
}
