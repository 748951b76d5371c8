// ============================================================
// Layer 2 - GenerateUseCase
// ============================================================
// Samples a new piece from a trained checkpoint:
//
//   Step 1: Rebuild the model from train_config.json + checkpoint
//   Step 2: Sample from BOS until EOS or the token budget
//   Step 3: Convert the ids to MIDI (and dump the token strings)

use anyhow::Result;
use rand::{rngs::StdRng, SeedableRng};
use std::path::PathBuf;

use crate::application::convert_use_case::convert_to_midi;
use crate::infra::{
    checkpoint::{CheckpointManager, ResumeStrategy},
    tokenizer::RemiTokenizer,
};
use crate::ml::generator::Generator;

#[derive(Debug, Clone)]
pub struct GenerateUseCase {
    pub checkpoint_dir: PathBuf,
    pub checkpoint:     ResumeStrategy,
    pub output:         PathBuf,
    pub debug_tokens:   PathBuf,
    pub max_new_tokens: usize,
    pub temperature:    f32,
    pub seed:           u64,
}

impl GenerateUseCase {
    /// Returns the generated ids, BOS included.
    pub fn execute(&self) -> Result<Vec<u32>> {
        let tokenizer    = RemiTokenizer::new();
        let ckpt_manager = CheckpointManager::new(&self.checkpoint_dir)?;
        let generator    = Generator::from_checkpoint(&ckpt_manager, self.checkpoint, tokenizer.vocab_size())?;

        let mut rng = StdRng::seed_from_u64(self.seed);
        let ids = generator.generate(
            &[tokenizer.bos_id()],
            self.max_new_tokens,
            self.temperature,
            tokenizer.eos_id(),
            &mut rng,
        )?;

        convert_to_midi(&ids, &tokenizer, &self.output, &self.debug_tokens)?;
        Ok(ids)
    }
}
