//! Data-loading and loss-adaptation utilities for training a single
//! separation model on a mix of tasks: N-source separation and 1-source
//! enhancement.
//!
//! The two entry points are [`dataloader::DataLoader::multitask`], which
//! concatenates per-task datasets and batches them so that no mini-batch
//! ever mixes examples from different tasks, and
//! [`loss::MultiTaskLossWrapper`], which adapts a permutation-invariant
//! loss to the shared `n_src + 1` channel model head.

pub mod collator;
pub mod dataloader;
pub mod dataset;
pub mod loss;
pub mod minibatch;
pub mod sample;
pub mod sampler;

pub use collator::StackCollator;
pub use minibatch::MiniBatch;
pub use sample::Sample;
