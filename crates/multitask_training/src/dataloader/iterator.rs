//! Iterator over collated batches.

use crate::collator::Collator;
use crate::dataset::ConcatDataset;
use crate::minibatch::MiniBatch;
use anyhow::Result;
use std::time::Duration;

use super::workers::{materialize_batch, WorkerPool};

/// Iterator returned by [`DataLoader::iter`](super::DataLoader::iter),
/// yielding `Result<MiniBatch>` for one epoch.
pub struct DataLoaderIter<'a, C> {
    inner: IterImpl<'a, C>,
}

enum IterImpl<'a, C> {
    /// Materialize each batch in the calling thread.
    Sync {
        dataset: &'a ConcatDataset,
        batch_indices: Box<dyn Iterator<Item = Vec<usize>> + Send + 'a>,
        collator: &'a C,
        pin_memory: bool,
    },
    /// Keep a pipeline of batches in flight across a worker pool. Results
    /// surface in completion order, which may differ from submission order.
    Prefetch {
        pool: WorkerPool,
        batch_indices: Box<dyn Iterator<Item = Vec<usize>> + Send + 'a>,
        pending: usize,
        max_in_flight: usize,
        timeout: Duration,
    },
}

impl<'a, C: Collator> DataLoaderIter<'a, C> {
    pub(crate) fn sync(
        dataset: &'a ConcatDataset,
        batch_indices: Box<dyn Iterator<Item = Vec<usize>> + Send + 'a>,
        collator: &'a C,
        pin_memory: bool,
    ) -> Self {
        Self {
            inner: IterImpl::Sync {
                dataset,
                batch_indices,
                collator,
                pin_memory,
            },
        }
    }

    pub(crate) fn prefetch(
        pool: WorkerPool,
        batch_indices: Box<dyn Iterator<Item = Vec<usize>> + Send + 'a>,
        max_in_flight: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            inner: IterImpl::Prefetch {
                pool,
                batch_indices,
                pending: 0,
                max_in_flight,
                timeout,
            },
        }
    }
}

impl<C: Collator> Iterator for DataLoaderIter<'_, C> {
    type Item = Result<MiniBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            IterImpl::Sync {
                dataset,
                batch_indices,
                collator,
                pin_memory,
            } => {
                let indices = batch_indices.next()?;
                Some(materialize_batch(*dataset, &indices, *collator, *pin_memory))
            }

            IterImpl::Prefetch {
                pool,
                batch_indices,
                pending,
                max_in_flight,
                timeout,
            } => {
                // Keep the pipeline full.
                while *pending < *max_in_flight {
                    match batch_indices.next() {
                        Some(indices) => {
                            if let Err(e) = pool.submit(indices) {
                                return Some(Err(e));
                            }
                            *pending += 1;
                        }
                        None => break,
                    }
                }

                if *pending > 0 {
                    match pool.receive(*timeout) {
                        Ok(result) => {
                            *pending -= 1;
                            Some(result)
                        }
                        Err(e) => Some(Err(e)),
                    }
                } else {
                    None
                }
            }
        }
    }
}
