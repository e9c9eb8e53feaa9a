use anyhow::{ensure, Result};
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};

/// A `Sampler` defines the order in which a dataset is visited.
///
/// `iter(epoch)` returns a lazy sequence of items for that epoch. Seeded
/// samplers derive their RNG from `base_seed + epoch`, so the same epoch
/// replays the same order while successive epochs differ; the sampler itself
/// carries no mutable state across calls, which keeps independent iterations
/// (e.g. across epochs) from interfering with each other.
///
/// Implementations must be `Send + Sync` so one sampler instance can be
/// shared by loader worker threads.
pub trait Sampler: Send + Sync {
    type Item: Send + Sync;

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = Self::Item> + Send + '_>;
}

impl<S: Sampler + ?Sized> Sampler for Box<S> {
    type Item = S::Item;

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = Self::Item> + Send + '_> {
        (**self).iter(epoch)
    }
}

/// Yields indices in ascending order `0, 1, ..., dataset_size - 1`,
/// identically for every epoch.
#[derive(Debug, Clone)]
pub struct SequentialSampler {
    dataset_size: usize,
}

impl SequentialSampler {
    pub fn new(dataset_size: usize) -> Self {
        Self { dataset_size }
    }
}

impl Sampler for SequentialSampler {
    type Item = usize;

    fn iter(&self, _epoch: usize) -> Box<dyn Iterator<Item = usize> + Send + '_> {
        Box::new(0..self.dataset_size)
    }
}

/// Yields a uniform random permutation of `0..dataset_size`, without
/// replacement.
///
/// The permutation for an epoch is drawn from `StdRng` seeded with
/// `base_seed + epoch`: a fixed `base_seed` makes every run reproducible
/// while each epoch still sees the data in a fresh order.
#[derive(Debug, Clone)]
pub struct RandomSampler {
    dataset_size: usize,
    base_seed: u64,
}

impl RandomSampler {
    pub fn new(dataset_size: usize, base_seed: u64) -> Self {
        Self {
            dataset_size,
            base_seed,
        }
    }

    #[inline]
    fn rng_for_epoch(&self, epoch: usize) -> StdRng {
        StdRng::seed_from_u64(self.base_seed.wrapping_add(epoch as u64))
    }
}

impl Sampler for RandomSampler {
    type Item = usize;

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = usize> + Send + '_> {
        let mut indices: Vec<usize> = (0..self.dataset_size).collect();
        indices.shuffle(&mut self.rng_for_epoch(epoch));
        Box::new(indices.into_iter())
    }
}

/// Batches a global index stream so that every mini-batch stays within one
/// task's slice of a concatenated dataset.
///
/// The concatenation assigns each task a half-open range of global indices,
/// described by cumulative thresholds `[0, len(T1), len(T1)+len(T2), ...]`.
/// As indices arrive from the base sampler (in random or ascending order),
/// each is routed to the per-task buffer whose range contains it; a buffer
/// that reaches `batch_size` is emitted immediately and reset. Buffers for
/// different tasks therefore fill and flush independently, and batches from
/// different tasks interleave in whatever order the base sampler drives.
///
/// After the base sampler is exhausted, leftover partial batches are emitted
/// in task order unless `drop_last` is set.
///
/// Every index drawn from the base sampler appears in exactly one emitted
/// batch (minus dropped partials), and no batch ever spans two tasks.
///
/// # Panics
///
/// Iteration panics if the base sampler produces an index outside every
/// threshold range. The ranges partition `[0, total_size)` with no gaps, so
/// this can only happen when the sampler and the thresholds describe
/// different datasets, which is a programming error rather than a runtime
/// condition.
#[derive(Debug, Clone)]
pub struct MultiTaskBatchSampler<S> {
    sampler: S,
    batch_size: usize,
    drop_last: bool,
    thres_ranges: Vec<(usize, usize)>,
}

impl<S: Sampler<Item = usize>> MultiTaskBatchSampler<S> {
    /// Wraps `sampler`, partitioning its output along `cum_thresholds`.
    ///
    /// `cum_thresholds` must start at zero and be monotonically
    /// non-decreasing; equal consecutive entries encode an empty task, which
    /// simply contributes no batches.
    pub fn new(
        sampler: S,
        batch_size: usize,
        drop_last: bool,
        cum_thresholds: Vec<usize>,
    ) -> Result<Self> {
        ensure!(
            batch_size > 0,
            "batch_size must be > 0, but got batch_size={}",
            batch_size
        );
        ensure!(
            cum_thresholds.first() == Some(&0),
            "Cumulative thresholds must start at 0, got {:?}",
            cum_thresholds
        );
        ensure!(
            cum_thresholds.windows(2).all(|pair| pair[0] <= pair[1]),
            "Cumulative thresholds must be non-decreasing, got {:?}",
            cum_thresholds
        );

        // Pair consecutive thresholds into per-task half-open ranges.
        let thres_ranges = cum_thresholds
            .windows(2)
            .map(|pair| (pair[0], pair[1]))
            .collect();

        Ok(Self {
            sampler,
            batch_size,
            drop_last,
            thres_ranges,
        })
    }
}

impl<S: Sampler<Item = usize>> Sampler for MultiTaskBatchSampler<S> {
    type Item = Vec<usize>;

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = Vec<usize>> + Send + '_> {
        let mut indices = self.sampler.iter(epoch).fuse();
        let ranges = self.thres_ranges.clone();
        let batch_size = self.batch_size;
        let drop_last = self.drop_last;

        // Fresh buffers for every iteration; nothing survives across calls.
        let mut buffers: Vec<Vec<usize>> = vec![Vec::new(); ranges.len()];
        let mut flush_cursor = 0;

        Box::new(std::iter::from_fn(move || {
            for index in indices.by_ref() {
                // First matching range wins; ranges are disjoint by
                // construction so at most one can match.
                let task = ranges
                    .iter()
                    .position(|&(start, end)| start <= index && index < end)
                    .unwrap_or_else(|| {
                        panic!(
                            "Sampler produced index {} outside every task range {:?}",
                            index, ranges
                        )
                    });

                buffers[task].push(index);
                if buffers[task].len() == batch_size {
                    return Some(std::mem::take(&mut buffers[task]));
                }
            }

            // Base sampler exhausted: flush leftovers in task order.
            if !drop_last {
                while flush_cursor < buffers.len() {
                    let task = flush_cursor;
                    flush_cursor += 1;
                    if !buffers[task].is_empty() {
                        return Some(std::mem::take(&mut buffers[task]));
                    }
                }
            }
            None
        }))
    }
}
