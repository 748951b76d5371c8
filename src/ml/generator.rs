// ============================================================
// Layer 5 - Generator
// ============================================================
// Loads a trained checkpoint and samples new token sequences.
//
//   context  = last max_seq_len - 1 tokens
//   logits   = model(context)[last position]
//   next     = sample(softmax(logits / temperature))
//
// temperature <= 0 means greedy decoding (argmax).
// Generation stops at EOS or after max_new_tokens.

use anyhow::{anyhow, bail, Result};
use burn::prelude::*;
use rand::{distributions::WeightedIndex, prelude::Distribution, Rng};

use crate::infra::checkpoint::{CheckpointManager, ResumeStrategy};
use crate::ml::model::{MidiDecoder, MidiDecoderConfig};

type InferBackend = burn::backend::Wgpu;

pub struct Generator<B: Backend> {
    model:       MidiDecoder<B>,
    max_seq_len: usize,
    device:      B::Device,
}

impl Generator<InferBackend> {
    /// Load a checkpoint onto the default WGPU device.
    pub fn from_checkpoint(
        ckpt_manager: &CheckpointManager,
        strategy:     ResumeStrategy,
        vocab_size:   usize,
    ) -> Result<Self> {
        let device = burn::backend::wgpu::WgpuDevice::default();
        Self::from_checkpoint_on(ckpt_manager, strategy, vocab_size, device)
    }
}

impl<B: Backend> Generator<B> {
    pub fn new(model: MidiDecoder<B>, max_seq_len: usize, device: B::Device) -> Self {
        Self { model, max_seq_len, device }
    }

    pub fn from_checkpoint_on(
        ckpt_manager: &CheckpointManager,
        strategy:     ResumeStrategy,
        vocab_size:   usize,
        device:       B::Device,
    ) -> Result<Self> {
        let Some(entry) = ckpt_manager.resolve(strategy)? else {
            bail!("No checkpoint to generate from in '{}'", ckpt_manager.dir().display());
        };
        let manifest = ckpt_manager.load_manifest(&entry)?;

        let cfg = ckpt_manager.load_config()?;
        let model_cfg = MidiDecoderConfig::new(
            vocab_size, cfg.max_seq_len, cfg.d_model,
            cfg.num_heads, cfg.num_layers, cfg.d_ff, 0.0,
        );
        let model = ckpt_manager.load_model(&manifest, model_cfg.init::<B>(&device), &device)?;
        tracing::info!("Model loaded from checkpoint: epoch {}", manifest.epoch);

        Ok(Self::new(model, cfg.max_seq_len, device))
    }

    /// Extend `prompt` by up to `max_new_tokens` sampled ids.
    /// The returned sequence includes the prompt.
    pub fn generate(
        &self,
        prompt:         &[u32],
        max_new_tokens: usize,
        temperature:    f32,
        eos_id:         u32,
        rng:            &mut impl Rng,
    ) -> Result<Vec<u32>> {
        if prompt.is_empty() {
            bail!("Generation needs at least one prompt token");
        }
        let mut ids = prompt.to_vec();
        // The last position of the window predicts the next token
        let window = self.max_seq_len.saturating_sub(1).max(1);

        for _ in 0..max_new_tokens {
            let context = &ids[ids.len().saturating_sub(window)..];
            let logits  = self.next_logits(context)?;
            let next    = sample_next(&logits, temperature, rng)?;
            ids.push(next);
            if next == eos_id {
                break;
            }
        }

        tracing::debug!("Generated {} tokens", ids.len() - prompt.len());
        Ok(ids)
    }

    fn next_logits(&self, context: &[u32]) -> Result<Vec<f32>> {
        let seq_len = context.len();
        let flat: Vec<i32> = context.iter().map(|&x| x as i32).collect();
        let input = Tensor::<B, 1, Int>::from_ints(flat.as_slice(), &self.device).unsqueeze::<2>();

        let logits = self.model.forward(input, None); // [1, seq_len, vocab]
        let [_, _, vocab] = logits.dims();
        logits
            .slice([0..1, seq_len - 1..seq_len, 0..vocab])
            .reshape([vocab])
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| anyhow!("Cannot read logits: {e:?}"))
    }
}

/// Pick the next id from raw logits.
pub fn sample_next(logits: &[f32], temperature: f32, rng: &mut impl Rng) -> Result<u32> {
    if logits.is_empty() {
        bail!("Empty logits");
    }

    if temperature <= 0.0 {
        let best = logits
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0);
        return Ok(best as u32);
    }

    // Softmax with the max subtracted for numerical stability
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let weights: Vec<f64> = logits
        .iter()
        .map(|&l| (((l - max) / temperature) as f64).exp())
        .collect();
    let dist = WeightedIndex::new(&weights)?;
    Ok(dist.sample(rng) as u32)
}
