use crate::sample::Sample;
use anyhow::{bail, ensure, Result};
use std::sync::Arc;

/// Indexed access to a collection of [`Sample`]s.
///
/// Task datasets are opaque to the rest of the crate: the loader assembly
/// only reads their length, and batch materialization only calls `get`.
/// Implementations must be `Send + Sync` so a dataset can be shared across
/// loader worker threads behind an `Arc`.
pub trait Dataset: Send + Sync {
    /// Number of examples in the dataset.
    fn len(&self) -> usize;

    /// Returns the example at `index`. Errors on out-of-bounds access.
    fn get(&self, index: usize) -> Result<Sample>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A dataset holding all of its samples in memory.
///
/// Samples live in an `Arc<[Sample]>`, so cloning the dataset only bumps a
/// reference count and concurrent reads need no locking.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    samples: Arc<[Sample]>,
}

impl InMemoryDataset {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self {
            samples: samples.into(),
        }
    }
}

impl Dataset for InMemoryDataset {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, index: usize) -> Result<Sample> {
        match self.samples.get(index) {
            Some(sample) => Ok(sample.clone()),
            None => bail!(
                "Index {} out of bounds for dataset of size {}",
                index,
                self.samples.len()
            ),
        }
    }
}

/// Sequential concatenation of several task datasets.
///
/// Global index `i` maps deterministically to exactly one member dataset and
/// a local offset within it. The mapping is defined by cumulative thresholds
/// `[0, len(T1), len(T1)+len(T2), ...]`: member `k` owns the half-open range
/// `[thresholds[k], thresholds[k+1])`. Empty members produce empty ranges
/// and are skipped by the mapping.
pub struct ConcatDataset {
    datasets: Vec<Box<dyn Dataset>>,
    thresholds: Vec<usize>,
}

impl ConcatDataset {
    pub fn new(datasets: Vec<Box<dyn Dataset>>) -> Result<Self> {
        ensure!(
            !datasets.is_empty(),
            "ConcatDataset needs at least one member dataset"
        );

        // Running sum of member lengths, with a leading zero.
        let mut total = 0;
        let mut thresholds = Vec::with_capacity(datasets.len() + 1);
        thresholds.push(0);
        for dataset in &datasets {
            total += dataset.len();
            thresholds.push(total);
        }

        Ok(Self {
            datasets,
            thresholds,
        })
    }

    /// Cumulative size thresholds, one more entry than there are members.
    pub fn cumulative_thresholds(&self) -> &[usize] {
        &self.thresholds
    }

    /// Number of member datasets.
    pub fn num_tasks(&self) -> usize {
        self.datasets.len()
    }

    /// Resolves a global index to `(member, local_offset)`.
    fn locate(&self, index: usize) -> Result<(usize, usize)> {
        ensure!(
            index < self.len(),
            "Index {} out of bounds for concatenated dataset of size {}",
            index,
            self.len()
        );
        // First threshold strictly greater than `index` closes the owning
        // range; empty members never satisfy `start <= index < end`.
        let member = self.thresholds.partition_point(|&t| t <= index) - 1;
        Ok((member, index - self.thresholds[member]))
    }
}

impl Dataset for ConcatDataset {
    fn len(&self) -> usize {
        self.thresholds.last().copied().unwrap_or(0)
    }

    fn get(&self, index: usize) -> Result<Sample> {
        let (member, offset) = self.locate(index)?;
        self.datasets[member].get(offset)
    }
}
