//! Batch loading over a concatenation of task datasets.
//!
//! The loader coordinates the pieces defined elsewhere in the crate:
//!
//! ```text
//!  task datasets ──► ConcatDataset ──► cumulative thresholds
//!                         │                    │
//!                         │       Sequential/RandomSampler (base order)
//!                         │                    │
//!                         │        MultiTaskBatchSampler (per-task batches)
//!                         │                    │
//!                         └──────► DataLoader ─┴─► Collator ──► MiniBatch
//! ```
//!
//! Every yielded batch is assembled from a single task's examples; the
//! interleaving of tasks across batches follows the base sampling order.
//!
//! # Example
//!
//! ```ignore
//! let config = DataLoaderConfig::builder()
//!     .batch_size(16)
//!     .shuffle(true)
//!     .seed(42)
//!     .build();
//! let loader = DataLoader::multitask(vec![sep_dataset, enh_dataset], config)?;
//!
//! for epoch in 0..num_epochs {
//!     for batch in loader.iter()? {
//!         let batch: MiniBatch = batch?;
//!         // batch.get("mixture")?, batch.get("sources")?, ...
//!     }
//! }
//! ```
//!
//! With `num_workers > 0` the loader spawns a fresh thread pool per
//! iteration and keeps up to `num_workers * prefetch_factor` batches in
//! flight; batches then arrive in completion order rather than submission
//! order, still one task per batch.

mod config;
mod iterator;
mod loader;
mod workers;

pub use config::{DataLoaderConfig, DataLoaderConfigBuilder};
pub use iterator::DataLoaderIter;
pub use loader::DataLoader;
