use anyhow::{ensure, Result};
use tch::Tensor;
use thiserror::Error;

/// Separation-mode estimate whose channel count disagrees with the target.
///
/// Fatal: it means the model head and the task configuration disagree, so
/// the caller gets the error immediately and nothing is retried. Reachable
/// from an `anyhow::Error` via `downcast_ref::<ShapeMismatch>()`.
#[derive(Debug, Error)]
#[error("separation estimate must carry {expected} source channels (n_src + 1), got {actual}")]
pub struct ShapeMismatch {
    pub expected: i64,
    pub actual: i64,
}

/// A loss that scores an estimate against targets under the best
/// source-to-target assignment.
///
/// `est_targets` and `targets` are `(batch, n_src, time)`; the return value
/// is the loss tensor together with the chosen permutation, one row of
/// target indices per batch element. The permutation search itself (which
/// assignments are tried, how ties break, whether the mean or the min is
/// reported) belongs entirely to the implementation; this crate only adapts
/// tensor shapes around it.
pub trait PermutationInvariantLoss: Send + Sync {
    fn forward(&self, est_targets: &Tensor, targets: &Tensor) -> Result<(Tensor, Tensor)>;
}

/// Adapts a [`PermutationInvariantLoss`] to a model head that always emits
/// `n_src + 1` channels: `n_src` separation channels plus one dedicated
/// enhancement channel at the end.
///
/// The task of a batch is read off the target's source dimension:
/// - one target source (enhancement): only the trailing estimate channel is
///   scored, reshaped to `(batch, 1, time)`;
/// - several target sources (separation): the estimate must carry exactly
///   `n_src + 1` channels ([`ShapeMismatch`] otherwise) and the trailing
///   enhancement channel is dropped before scoring.
///
/// One model can this way serve both objectives, batch by batch, with no
/// changes to the wrapped loss.
#[derive(Debug, Clone)]
pub struct MultiTaskLossWrapper<L> {
    loss: L,
}

impl<L: PermutationInvariantLoss> MultiTaskLossWrapper<L> {
    pub fn new(loss: L) -> Self {
        Self { loss }
    }
}

impl<L: PermutationInvariantLoss> PermutationInvariantLoss for MultiTaskLossWrapper<L> {
    fn forward(&self, est_targets: &Tensor, targets: &Tensor) -> Result<(Tensor, Tensor)> {
        ensure!(
            targets.dim() == 3,
            "Targets must be (batch, n_src, time), got shape {:?}",
            targets.size()
        );
        let n_src = targets.size()[1];

        if n_src == 1 {
            // Enhancement: score the dedicated trailing channel alone.
            let est = est_targets.select(1, -1).unsqueeze(1);
            self.loss.forward(&est, targets)
        } else {
            let est_src = est_targets.size()[1];
            if est_src != n_src + 1 {
                return Err(ShapeMismatch {
                    expected: n_src + 1,
                    actual: est_src,
                }
                .into());
            }
            // Separation: the enhancement channel is unused here.
            self.loss.forward(&est_targets.narrow(1, 0, n_src), targets)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind};

    /// Reference loss for exercising the adapter: mean-squared error under
    /// an exhaustive search over source-to-target assignments. Only suited
    /// to the tiny source counts used in tests.
    struct ExhaustiveMse;

    fn permutations(n: usize) -> Vec<Vec<usize>> {
        if n == 1 {
            return vec![vec![0]];
        }
        let mut all = Vec::new();
        for rest in permutations(n - 1) {
            for slot in 0..n {
                let mut perm: Vec<usize> = rest.iter().map(|&x| x + usize::from(x >= slot)).collect();
                perm.insert(0, slot);
                all.push(perm);
            }
        }
        all
    }

    impl PermutationInvariantLoss for ExhaustiveMse {
        fn forward(&self, est_targets: &Tensor, targets: &Tensor) -> Result<(Tensor, Tensor)> {
            ensure!(
                est_targets.size() == targets.size(),
                "Estimate shape {:?} does not match target shape {:?}",
                est_targets.size(),
                targets.size()
            );
            let batch = targets.size()[0];
            let n_src = targets.size()[1] as usize;

            let mut total = 0.0;
            let mut chosen: Vec<i64> = Vec::with_capacity(batch as usize * n_src);
            for b in 0..batch {
                let mut cost = vec![vec![0.0f64; n_src]; n_src];
                for (i, row) in cost.iter_mut().enumerate() {
                    for (j, cell) in row.iter_mut().enumerate() {
                        let diff =
                            est_targets.get(b).get(i as i64) - targets.get(b).get(j as i64);
                        *cell = diff.square().mean(Kind::Float).double_value(&[]);
                    }
                }

                let (mut best_cost, mut best_perm) = (f64::INFINITY, vec![0; n_src]);
                for perm in permutations(n_src) {
                    let c: f64 = perm.iter().enumerate().map(|(i, &j)| cost[i][j]).sum();
                    if c < best_cost {
                        best_cost = c;
                        best_perm = perm;
                    }
                }
                total += best_cost / n_src as f64;
                chosen.extend(best_perm.iter().map(|&j| j as i64));
            }

            let loss = Tensor::from(total / batch as f64);
            let perm = Tensor::from_slice(&chosen).reshape(&[batch, n_src as i64]);
            Ok((loss, perm))
        }
    }

    fn randn(shape: &[i64]) -> Tensor {
        Tensor::randn(shape, (Kind::Float, Device::Cpu))
    }

    #[test]
    fn enhancement_scores_only_the_trailing_channel() -> Result<()> {
        let wrapper = MultiTaskLossWrapper::new(ExhaustiveMse);

        let targets = randn(&[4, 1, 32]);
        // Channel 0 is noise; channel 1 (the enhancement slot) matches the
        // target exactly, so the adapted loss must be zero.
        let est = Tensor::stack(&[randn(&[4, 32]), targets.select(1, 0).shallow_clone()], 1);
        assert_eq!(est.size(), &[4, 2, 32]);

        let (loss, perm) = wrapper.forward(&est, &targets)?;
        assert!(loss.double_value(&[]) < 1e-10);
        assert_eq!(perm.size(), &[4, 1]);
        Ok(())
    }

    #[test]
    fn enhancement_ignores_the_separation_channels() -> Result<()> {
        let wrapper = MultiTaskLossWrapper::new(ExhaustiveMse);

        let targets = randn(&[2, 1, 16]);
        // Target signal placed in a *separation* channel must not help: the
        // adapter only ever exposes the trailing channel to the loss.
        let est = Tensor::stack(
            &[targets.select(1, 0).shallow_clone(), randn(&[2, 16])],
            1,
        );
        let (loss, _) = wrapper.forward(&est, &targets)?;
        assert!(loss.double_value(&[]) > 1e-4);
        Ok(())
    }

    #[test]
    fn separation_drops_the_trailing_channel_and_finds_the_permutation() -> Result<()> {
        let wrapper = MultiTaskLossWrapper::new(ExhaustiveMse);

        let targets = randn(&[4, 3, 32]);
        // Estimate carries the targets in rotated order plus a garbage
        // enhancement channel; the adapter trims the garbage and the loss
        // recovers the rotation.
        let est = Tensor::stack(
            &[
                targets.select(1, 1).shallow_clone(),
                targets.select(1, 2).shallow_clone(),
                targets.select(1, 0).shallow_clone(),
                randn(&[4, 32]),
            ],
            1,
        );
        assert_eq!(est.size(), &[4, 4, 32]);

        let (loss, perm) = wrapper.forward(&est, &targets)?;
        assert!(loss.double_value(&[]) < 1e-10);
        assert_eq!(perm.size(), &[4, 3]);
        for b in 0..4 {
            assert_eq!(perm.int64_value(&[b, 0]), 1);
            assert_eq!(perm.int64_value(&[b, 1]), 2);
            assert_eq!(perm.int64_value(&[b, 2]), 0);
        }
        Ok(())
    }

    #[test]
    fn separation_rejects_wrong_channel_count() {
        let wrapper = MultiTaskLossWrapper::new(ExhaustiveMse);

        let targets = randn(&[4, 3, 32]);
        let est = randn(&[4, 3, 32]); // should be 4 channels

        let err = wrapper.forward(&est, &targets).unwrap_err();
        let mismatch = err
            .downcast_ref::<ShapeMismatch>()
            .expect("error should downcast to ShapeMismatch");
        assert_eq!(mismatch.expected, 4);
        assert_eq!(mismatch.actual, 3);
    }

    #[test]
    fn rejects_non_3d_targets() {
        let wrapper = MultiTaskLossWrapper::new(ExhaustiveMse);
        let result = wrapper.forward(&randn(&[4, 2, 32]), &randn(&[4, 32]));
        assert!(result.is_err());
    }

    #[test]
    fn reference_loss_is_permutation_invariant() -> Result<()> {
        // Sanity-check the test harness itself: swapping estimate channels
        // must not change the reference loss.
        let targets = randn(&[2, 2, 16]);
        let swapped = Tensor::stack(
            &[
                targets.select(1, 1).shallow_clone(),
                targets.select(1, 0).shallow_clone(),
            ],
            1,
        );
        let (loss, perm) = ExhaustiveMse.forward(&swapped, &targets)?;
        assert!(loss.double_value(&[]) < 1e-10);
        assert_eq!(perm.int64_value(&[0, 0]), 1);
        assert_eq!(perm.int64_value(&[0, 1]), 0);
        Ok(())
    }
}
