//! Loader assembly: task datasets in, single-task batches out.

use crate::collator::{Collator, StackCollator};
use crate::dataset::{ConcatDataset, Dataset};
use crate::sampler::{MultiTaskBatchSampler, RandomSampler, Sampler, SequentialSampler};
use anyhow::{ensure, Context, Result};
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::config::DataLoaderConfig;
use super::iterator::DataLoaderIter;
use super::workers::WorkerPool;

/// Batch-producing view over a concatenation of task datasets.
///
/// Construction wires the whole pipeline: the datasets are concatenated,
/// their cumulative sizes become the task thresholds, a sequential or
/// seeded-random base sampler supplies the global index order, and a
/// [`MultiTaskBatchSampler`] partitions that order into single-task batches.
/// `iter()` then materializes each index batch through the collator.
///
/// The loader is `Send + Sync`; iterators borrow it and are single-threaded.
pub struct DataLoader<C = StackCollator> {
    dataset: Arc<ConcatDataset>,
    batch_sampler: Box<dyn Sampler<Item = Vec<usize>> + Send + Sync>,
    collator: C,
    config: DataLoaderConfig,
    current_epoch: AtomicUsize,
}

impl DataLoader<StackCollator> {
    /// Builds a multi-task loader with the default [`StackCollator`].
    ///
    /// `datasets` are the per-task datasets, in the order that defines the
    /// task index ranges. Batches never mix examples from two tasks, so
    /// tasks may disagree about feature shapes (e.g. a 2-source separation
    /// task next to a 1-source enhancement task).
    pub fn multitask(datasets: Vec<Box<dyn Dataset>>, config: DataLoaderConfig) -> Result<Self> {
        Self::multitask_with_collator(datasets, config, StackCollator)
    }
}

impl<C> DataLoader<C>
where
    C: Collator + Clone + Send + Sync + 'static,
{
    /// Builds a multi-task loader with a custom collator.
    pub fn multitask_with_collator(
        datasets: Vec<Box<dyn Dataset>>,
        mut config: DataLoaderConfig,
        collator: C,
    ) -> Result<Self> {
        ensure!(config.batch_size > 0, "Batch size must be greater than 0");
        ensure!(
            config.num_workers == 0 || config.prefetch_factor > 0,
            "Prefetch factor must be > 0 when using {} workers",
            config.num_workers
        );

        let dataset = ConcatDataset::new(datasets)?;
        let thresholds = dataset.cumulative_thresholds().to_vec();

        // Pin the seed at construction so every epoch of this loader derives
        // from the same base, even when the caller did not provide one.
        let effective_seed = config.seed.unwrap_or_else(|| rand::rng().random());
        config.seed = Some(effective_seed);

        let base: Box<dyn Sampler<Item = usize> + Send + Sync> = if config.shuffle {
            Box::new(RandomSampler::new(dataset.len(), effective_seed))
        } else {
            Box::new(SequentialSampler::new(dataset.len()))
        };

        let batch_sampler =
            MultiTaskBatchSampler::new(base, config.batch_size, config.drop_last, thresholds)
                .context("Failed to build the task-partitioned batch sampler")?;

        Ok(Self {
            dataset: Arc::new(dataset),
            batch_sampler: Box::new(batch_sampler),
            collator,
            config,
            current_epoch: AtomicUsize::new(0),
        })
    }

    /// Starts one epoch of iteration.
    ///
    /// Shuffling loaders advance an internal epoch counter so that every
    /// call reshuffles, deterministically under the configured seed.
    /// Unshuffled loaders replay the same ascending order each time.
    pub fn iter(&self) -> Result<DataLoaderIter<'_, C>> {
        let epoch = self.current_epoch.fetch_add(1, Ordering::SeqCst);
        let sampler_epoch = if self.config.shuffle { epoch } else { 0 };
        let batch_indices = self.batch_sampler.iter(sampler_epoch);

        if self.config.num_workers == 0 {
            Ok(DataLoaderIter::sync(
                &self.dataset,
                batch_indices,
                &self.collator,
                self.config.pin_memory,
            ))
        } else {
            let max_in_flight = self.config.num_workers * self.config.prefetch_factor;
            let pool = WorkerPool::spawn(
                self.config.num_workers,
                max_in_flight,
                self.dataset.clone(),
                self.collator.clone(),
                self.config.pin_memory,
            )
            .context("Failed to spawn the prefetch worker pool")?;

            Ok(DataLoaderIter::prefetch(
                pool,
                batch_indices,
                max_in_flight,
                self.config.timeout,
            ))
        }
    }

    /// The underlying concatenated dataset.
    pub fn dataset(&self) -> &ConcatDataset {
        &self.dataset
    }

    /// The resolved configuration, including the effective seed.
    pub fn config(&self) -> &DataLoaderConfig {
        &self.config
    }
}
