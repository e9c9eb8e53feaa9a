use crate::collator::Collator;
use crate::sample::Sample;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use tch::{Device, Tensor};

/// A collated batch of examples, ready for a training step.
///
/// Each tensor has shape `[batch_size, ...]` with the remaining dimensions
/// taken from the individual samples; e.g. a batch of 4 separation examples
/// holds `"mixture"` as `[4, time]` and `"sources"` as `[4, n_src, time]`.
#[derive(Debug)]
pub struct MiniBatch {
    pub tensors: HashMap<String, Tensor>,
}

impl MiniBatch {
    /// Collates `samples` with the given [`Collator`].
    pub fn collate(samples: Vec<Sample>, collator: impl Collator) -> Result<Self> {
        collator.collate(&samples)
    }

    /// Number of examples in the batch.
    pub fn batch_size(&self) -> Result<i64> {
        self.tensors
            .values()
            .next()
            .map(|t| t.size()[0])
            .ok_or_else(|| anyhow!("Empty mini-batch"))
    }

    /// Returns the batched tensor for a feature.
    pub fn get(&self, feature: &str) -> Result<&Tensor> {
        self.tensors
            .get(feature)
            .ok_or_else(|| anyhow!("Feature '{}' not found in mini-batch", feature))
    }

    /// Iterates over the feature names of the batch.
    pub fn features(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    /// Copies every tensor to `device`.
    pub fn to_device(&self, device: Device) -> Self {
        Self {
            tensors: self
                .tensors
                .iter()
                .map(|(name, tensor)| (name.clone(), tensor.to_device(device)))
                .collect(),
        }
    }

    /// Moves every tensor into page-locked host memory, which speeds up
    /// subsequent host-to-device copies.
    pub fn pin_memory(&self) -> Self {
        Self {
            tensors: self
                .tensors
                .iter()
                .map(|(name, tensor)| (name.clone(), tensor.pin_memory(Device::Cpu)))
                .collect(),
        }
    }
}
