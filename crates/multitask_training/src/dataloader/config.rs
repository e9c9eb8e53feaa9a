//! Configuration for loader behaviour.

use std::time::Duration;

/// Parameters controlling how batches are drawn and materialized.
///
/// Built with [`DataLoaderConfig::builder`]:
/// ```ignore
/// let config = DataLoaderConfig::builder()
///     .batch_size(32)
///     .shuffle(true)
///     .seed(42)
///     .num_workers(4)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct DataLoaderConfig {
    /// Number of examples per batch.
    pub batch_size: usize,
    /// Whether to draw a fresh uniform permutation of indices each epoch.
    pub shuffle: bool,
    /// Whether to discard per-task batches smaller than `batch_size`.
    pub drop_last: bool,
    /// Base RNG seed for reproducible shuffling. When unset, a seed is drawn
    /// at loader construction, so a single loader is still self-consistent
    /// across epochs.
    pub seed: Option<u64>,
    /// Number of prefetch threads (0 = materialize batches in the calling
    /// thread).
    pub num_workers: usize,
    /// Batches kept in flight per worker. Must be > 0 when workers are used.
    pub prefetch_factor: usize,
    /// Maximum time to wait for a batch from the workers before reporting
    /// an error.
    pub timeout: Duration,
    /// Move collated batches into page-locked memory before yielding them.
    pub pin_memory: bool,
}

impl Default for DataLoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            shuffle: false,
            drop_last: false,
            seed: None,
            num_workers: 0,
            prefetch_factor: 2,
            timeout: Duration::from_secs(30),
            pin_memory: false,
        }
    }
}

impl DataLoaderConfig {
    pub fn builder() -> DataLoaderConfigBuilder {
        DataLoaderConfigBuilder::default()
    }
}

/// Builder for [`DataLoaderConfig`] with method chaining.
#[derive(Debug, Default)]
pub struct DataLoaderConfigBuilder {
    config: DataLoaderConfig,
}

impl DataLoaderConfigBuilder {
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.config.shuffle = shuffle;
        self
    }

    pub fn drop_last(mut self, drop: bool) -> Self {
        self.config.drop_last = drop;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn num_workers(mut self, workers: usize) -> Self {
        self.config.num_workers = workers;
        self
    }

    pub fn prefetch_factor(mut self, factor: usize) -> Self {
        self.config.prefetch_factor = factor;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn pin_memory(mut self, pin: bool) -> Self {
        self.config.pin_memory = pin;
        self
    }

    pub fn build(self) -> DataLoaderConfig {
        self.config
    }
}
