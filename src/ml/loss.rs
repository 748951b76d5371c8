// Next-token cross-entropy that ignores padding targets.
//
//   loss = - sum_{t : target_t != pad} log p(target_t)
//          / max(1, #{t : target_t != pad})
//
// Burn's CrossEntropyLoss with pad tokens zeroes the padded terms
// but still divides by every position, which shrinks the loss of
// short sequences in a padded batch.

use burn::{prelude::*, tensor::activation::log_softmax};

/// logits: [batch, seq, vocab], target: [batch, seq] -> scalar [1]
pub fn next_token_loss<B: Backend>(
    logits: Tensor<B, 3>,
    target: Tensor<B, 2, Int>,
    pad_id: u32,
) -> Tensor<B, 1> {
    let [batch, seq, _] = logits.dims();

    let log_probs = log_softmax(logits, 2);
    let picked = log_probs
        .gather(2, target.clone().unsqueeze_dim::<3>(2))
        .reshape([batch, seq]);

    let keep  = target.equal_elem(pad_id as i64).bool_not().float();
    let count = keep.clone().sum().clamp_min(1.0);

    (picked * keep).sum().neg() / count
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn scalar(t: Tensor<TestBackend, 1>) -> f32 {
        t.into_scalar()
    }

    #[test]
    fn test_uniform_logits_give_log_vocab() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 3>::zeros([2, 3, 4], &device);
        let target = Tensor::<TestBackend, 2, Int>::from_ints([[1, 2, 3], [3, 2, 1]], &device);
        let loss = scalar(next_token_loss(logits, target, 0));
        assert!((loss - 4f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_pad_targets_do_not_count() {
        let device = Default::default();
        // Position 1 is confidently wrong, but its target is padding
        let logits = Tensor::<TestBackend, 3>::from_floats(
            [[[0.0, 0.0, 0.0, 0.0], [0.0, 50.0, 0.0, 0.0]]],
            &device,
        );
        let target = Tensor::<TestBackend, 2, Int>::from_ints([[3, 0]], &device);
        let loss = scalar(next_token_loss(logits, target, 0));
        assert!((loss - 4f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_all_padding_is_zero_not_nan() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 3>::zeros([1, 2, 4], &device);
        let target = Tensor::<TestBackend, 2, Int>::zeros([1, 2], &device);
        assert_eq!(scalar(next_token_loss(logits, target, 0)), 0.0);
    }

    #[test]
    fn test_confident_correct_prediction_is_near_zero() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 3>::from_floats([[[0.0, 0.0, 30.0]]], &device);
        let target = Tensor::<TestBackend, 2, Int>::from_ints([[2]], &device);
        assert!(scalar(next_token_loss(logits, target, 0)) < 1e-6);
    }
}
