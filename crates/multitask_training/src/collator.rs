use crate::minibatch::MiniBatch;
use crate::sample::Sample;
use anyhow::{bail, Result};
use std::collections::{HashMap, HashSet};
use tch::Tensor;

/// A `Collator` combines a batch worth of [`Sample`]s into one [`MiniBatch`].
pub trait Collator: Send + Sync {
    fn collate(&self, samples: &[Sample]) -> Result<MiniBatch>;
}

/// Stacks per-feature tensors along a new leading batch dimension.
///
/// Fixed-length segments are the norm for separation training, so no padding
/// is applied: within a batch every sample must carry the same feature keys
/// and, per feature, the same tensor shape. With the task-partitioned batch
/// sampler this holds even when tasks disagree on their `sources` channel
/// count, because a batch never mixes tasks.
#[derive(Debug, Clone)]
pub struct StackCollator;

impl Collator for StackCollator {
    fn collate(&self, samples: &[Sample]) -> Result<MiniBatch> {
        if samples.is_empty() {
            bail!("Cannot collate an empty batch");
        }

        let first_keys: HashSet<&String> = samples[0].features.keys().collect();
        for (i, sample) in samples.iter().enumerate().skip(1) {
            let sample_keys: HashSet<&String> = sample.features.keys().collect();
            if sample_keys != first_keys {
                bail!(
                    "Sample #{} features {:?} do not match the batch features {:?}",
                    i,
                    sample_keys,
                    first_keys
                );
            }
        }

        let mut tensors = HashMap::with_capacity(first_keys.len());
        for key in first_keys {
            let to_stack: Vec<&Tensor> = samples
                .iter()
                .map(|sample| sample.features.get(key).expect("validated key"))
                .collect();

            let reference_shape = to_stack[0].size();
            for (i, tensor) in to_stack.iter().enumerate() {
                if tensor.size() != reference_shape {
                    bail!(
                        "Shape mismatch in sample {} for feature '{}': expected {:?}, got {:?}",
                        i,
                        key,
                        reference_shape,
                        tensor.size()
                    );
                }
            }

            tensors.insert(key.clone(), Tensor::stack(&to_stack, 0));
        }
        Ok(MiniBatch { tensors })
    }
}
