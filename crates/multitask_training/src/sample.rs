use anyhow::{anyhow, Result};
use std::collections::HashMap;
use tch::Tensor;

/// A single training example: a map from feature names to tensors.
///
/// For this crate's domain the common layouts are:
/// - separation example: `{"mixture": Tensor([time]), "sources": Tensor([n_src, time])}`
/// - enhancement example: `{"mixture": Tensor([time]), "sources": Tensor([1, time])}`
///
/// The map is deliberately untyped beyond the feature name so that task
/// datasets can attach whatever the training step needs (e.g. per-example
/// lengths for masking) without this crate having to know about it.
#[derive(Debug)]
pub struct Sample {
    pub features: HashMap<String, Tensor>,
}

/// Shallow clone: tensors share storage, only the reference is duplicated.
impl Clone for Sample {
    fn clone(&self) -> Self {
        let features = self
            .features
            .iter()
            .map(|(name, tensor)| (name.clone(), tensor.shallow_clone()))
            .collect();
        Self { features }
    }
}

/// Safety:
/// - `tch::Tensor` is declared `Send` and `Sync` in tch-rs itself
///   (see wrappers/tensor.rs in the tch source), and `String` is both.
/// - `HashMap` is `Send`/`Sync` whenever its keys and values are.
/// - All mutation of a `Sample` goes through `&mut self`; shared references
///   only permit concurrent reads.
unsafe impl Send for Sample {}
unsafe impl Sync for Sample {}

impl Sample {
    /// Builds a `Sample` from an already assembled feature map.
    pub fn new(features: HashMap<String, Tensor>) -> Self {
        Self { features }
    }

    /// Builds a `Sample` holding a single feature.
    ///
    /// Chain with [`with_feature`](Self::with_feature) for more.
    pub fn from_single(name: impl Into<String>, tensor: Tensor) -> Self {
        Self {
            features: HashMap::from([(name.into(), tensor)]),
        }
    }

    /// Adds or overwrites a feature.
    pub fn with_feature(mut self, name: impl Into<String>, tensor: Tensor) -> Self {
        self.features.insert(name.into(), tensor);
        self
    }

    /// Returns the tensor stored under `feature`.
    pub fn get(&self, feature: &str) -> Result<&Tensor> {
        self.features
            .get(feature)
            .ok_or_else(|| anyhow!("Feature '{}' not found in sample", feature))
    }

    /// Iterates over the feature names of this sample.
    pub fn features(&self) -> impl Iterator<Item = &str> {
        self.features.keys().map(String::as_str)
    }
}
