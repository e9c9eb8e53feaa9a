use multitask_training::dataset::Dataset;
use multitask_training::dataset::InMemoryDataset;
use multitask_training::minibatch::MiniBatch;
use multitask_training::sample::Sample;
use tch::{Device, Kind, Tensor};

pub const TIME: i64 = 8;

/// A task dataset whose examples are identifiable by value: example `i` of
/// task `tag` holds tensors filled with `tag * 100 + i`.
pub fn task_dataset(tag: i64, len: usize, n_src: i64) -> Box<dyn Dataset> {
    let samples = (0..len)
        .map(|i| {
            let value = (tag * 100 + i as i64) as f64;
            Sample::from_single(
                "mixture",
                Tensor::full(&[TIME], value, (Kind::Float, Device::Cpu)),
            )
            .with_feature(
                "sources",
                Tensor::full(&[n_src, TIME], value, (Kind::Float, Device::Cpu)),
            )
        })
        .collect();
    Box::new(InMemoryDataset::new(samples))
}

/// Reads the identifying value of every example in a collated batch.
pub fn batch_values(batch: &MiniBatch) -> Vec<i64> {
    let mixture = batch.get("mixture").unwrap();
    (0..batch.batch_size().unwrap())
        .map(|k| mixture.double_value(&[k, 0]) as i64)
        .collect()
}

/// The task tag an identifying value belongs to.
pub fn tag_of(value: i64) -> i64 {
    value / 100
}
