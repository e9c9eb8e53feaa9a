//! Thread pool for prefetching batches.
//!
//! Workers share the concatenated dataset behind an `Arc`, pull index
//! batches from a bounded task channel, and push collated results into a
//! bounded output channel. A pool is spawned fresh for each iteration of
//! the loader and torn down when the iterator is dropped.

use crate::collator::Collator;
use crate::dataset::{ConcatDataset, Dataset};
use crate::minibatch::MiniBatch;
use crate::sample::Sample;
use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

// How often idle workers wake up to check the shutdown flag.
const SHUTDOWN_POLL_MS: u64 = 100;

/// Fetches and collates one index batch against the concatenated dataset.
///
/// Shared by the synchronous iterator and the worker threads.
pub(crate) fn materialize_batch<C: Collator>(
    dataset: &ConcatDataset,
    indices: &[usize],
    collator: &C,
    pin_memory: bool,
) -> Result<MiniBatch> {
    let samples: Result<Vec<Sample>> = indices
        .iter()
        .map(|&index| {
            dataset
                .get(index)
                .with_context(|| format!("Failed to load sample at index {}", index))
        })
        .collect();

    let samples = samples?;
    let batch = collator
        .collate(&samples)
        .with_context(|| format!("Failed to collate batch of {} samples", samples.len()))?;

    Ok(if pin_memory {
        batch.pin_memory()
    } else {
        batch
    })
}

/// A fixed-size pool of batch-materialization threads.
///
/// Tasks are distributed through one shared bounded channel, results come
/// back in completion order. Dropping the pool signals shutdown and joins
/// every worker.
pub(crate) struct WorkerPool {
    workers: Vec<thread::JoinHandle<()>>,
    task_tx: Option<Sender<Vec<usize>>>,
    output_rx: Receiver<Result<MiniBatch>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    pub(crate) fn spawn<C>(
        num_workers: usize,
        buffer_size: usize,
        dataset: Arc<ConcatDataset>,
        collator: C,
        pin_memory: bool,
    ) -> Result<Self>
    where
        C: Collator + Clone + Send + Sync + 'static,
    {
        anyhow::ensure!(num_workers > 0, "Worker pool needs at least one worker");
        anyhow::ensure!(
            buffer_size > 0,
            "Worker pool buffer size must be > 0 to avoid deadlocks"
        );

        let (task_tx, task_rx) = bounded::<Vec<usize>>(buffer_size);
        let (output_tx, output_rx) = bounded::<Result<MiniBatch>>(buffer_size);
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            let task_rx = task_rx.clone();
            let output_tx = output_tx.clone();
            let shutdown = shutdown.clone();
            let dataset = dataset.clone();
            let collator = collator.clone();

            let handle = thread::Builder::new()
                .name(format!("batch-worker-{}", worker_id))
                .spawn(move || loop {
                    if shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                    match task_rx.recv_timeout(Duration::from_millis(SHUTDOWN_POLL_MS)) {
                        Ok(indices) => {
                            let result =
                                materialize_batch(&dataset, &indices, &collator, pin_memory)
                                    .with_context(|| format!("Worker {} failed", worker_id));
                            if output_tx.send(result).is_err() {
                                break; // consumer is gone
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                })
                .with_context(|| format!("Failed to spawn worker thread {}", worker_id))?;
            workers.push(handle);
        }

        Ok(Self {
            workers,
            task_tx: Some(task_tx),
            output_rx,
            shutdown,
        })
    }

    /// Queues one index batch for materialization. Blocks while the task
    /// channel is at capacity.
    pub(crate) fn submit(&self, indices: Vec<usize>) -> Result<()> {
        match &self.task_tx {
            Some(tx) => tx
                .send(indices)
                .map_err(|_| anyhow!("Worker task channel closed - workers may have crashed")),
            None => Err(anyhow!("Worker pool is shutting down")),
        }
    }

    /// Receives the next completed batch, whichever worker finished first.
    pub(crate) fn receive(&self, timeout: Duration) -> Result<Result<MiniBatch>> {
        self.output_rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => anyhow!(
                "Worker timeout after {:?} - possible deadlock or slow data loading",
                timeout
            ),
            RecvTimeoutError::Disconnected => {
                anyhow!("Worker channel disconnected - workers may have crashed")
            }
        })
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.task_tx.take(); // close the task channel
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
