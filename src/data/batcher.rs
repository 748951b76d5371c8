// ============================================================
// Layer 4 - MIDI Batcher
// ============================================================
// Implements Burn's Batcher trait to turn a Vec<TokenSequence>
// into tensors for the decoder.
//
// Sequences have different lengths, so padding happens here:
//   Input:  N sequences, lengths L1..LN
//   Output: MidiBatch with tensors of shape [N, max(Li)]
//
//   input_ids       right-padded with pad_id
//   attention_mask  1 = real token, 0 = padding
//
// Next-token view (MidiBatch::shift):
//   decoder_input = input_ids[:, :-1]
//   target        = input_ids[:, 1:]
//   padding_mask  = attention_mask[:, :-1] == 0
//
// Burn's attention masks are "true = ignore this position",
// the opposite sense of attention_mask.
//
// Reference: Burn Book §4 (Batcher)

use burn::{data::dataloader::batcher::Batcher, prelude::*};

use crate::data::dataset::TokenSequence;

// ─── MidiBatch ────────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct MidiBatch<B: Backend> {
    /// Token ids, shape [batch_size, seq_len]
    pub input_ids: Tensor<B, 2, Int>,

    /// 1 = real token, 0 = padding, shape [batch_size, seq_len]
    pub attention_mask: Tensor<B, 2, Int>,
}

/// A batch arranged for next-token prediction.
#[derive(Debug, Clone)]
pub struct ShiftedBatch<B: Backend> {
    /// [batch_size, seq_len - 1]
    pub decoder_input: Tensor<B, 2, Int>,
    /// [batch_size, seq_len - 1], decoder_input shifted left by one
    pub target: Tensor<B, 2, Int>,
    /// true where decoder_input is padding
    pub padding_mask: Tensor<B, 2, Bool>,
}

impl<B: Backend> MidiBatch<B> {
    pub fn shift(self) -> ShiftedBatch<B> {
        let [batch_size, seq_len] = self.input_ids.dims();
        let head = 0..seq_len.saturating_sub(1);
        let tail = 1.min(seq_len)..seq_len;

        let decoder_input = self.input_ids.clone().slice([0..batch_size, head.clone()]);
        let target        = self.input_ids.slice([0..batch_size, tail]);
        let padding_mask  = self.attention_mask.slice([0..batch_size, head]).equal_elem(0);

        ShiftedBatch { decoder_input, target, padding_mask }
    }
}

// ─── MidiBatcher ──────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct MidiBatcher<B: Backend> {
    pub device: B::Device,
    pub pad_id: u32,
}

impl<B: Backend> MidiBatcher<B> {
    pub fn new(device: B::Device, pad_id: u32) -> Self {
        Self { device, pad_id }
    }
}

/// Right-pad every sequence to the longest one.
/// Returns (flat ids, flat mask, seq_len).
pub fn pad_sequences(items: &[TokenSequence], pad_id: u32) -> (Vec<i32>, Vec<i32>, usize) {
    let seq_len = items.iter().map(TokenSequence::len).max().unwrap_or(0);
    let mut ids  = Vec::with_capacity(items.len() * seq_len);
    let mut mask = Vec::with_capacity(items.len() * seq_len);

    for item in items {
        let pad = seq_len - item.len();
        ids.extend(item.input_ids.iter().map(|&t| t as i32));
        ids.extend(std::iter::repeat(pad_id as i32).take(pad));
        mask.extend(std::iter::repeat(1).take(item.len()));
        mask.extend(std::iter::repeat(0).take(pad));
    }

    (ids, mask, seq_len)
}

impl<B: Backend> Batcher<TokenSequence, MidiBatch<B>> for MidiBatcher<B> {
    fn batch(&self, items: Vec<TokenSequence>) -> MidiBatch<B> {
        let batch_size = items.len();
        let (ids, mask, seq_len) = pad_sequences(&items, self.pad_id);

        let input_ids = Tensor::<B, 1, Int>::from_ints(ids.as_slice(), &self.device)
            .reshape([batch_size, seq_len]);
        let attention_mask = Tensor::<B, 1, Int>::from_ints(mask.as_slice(), &self.device)
            .reshape([batch_size, seq_len]);

        MidiBatch { input_ids, attention_mask }
    }
}
