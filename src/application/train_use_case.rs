// ============================================================
// Layer 2 - TrainUseCase
// ============================================================
// Orchestrates the full pretraining pipeline in order:
//
//   Step 1: Fetch + split the corpus if needed   (Layer 2 - prepare)
//   Step 2: Build the REMI tokenizer             (Layer 6 - infra)
//   Step 3: Tokenize train/validation windows    (Layer 4 - data)
//   Step 4: Save config + vocabulary             (Layer 6 - infra)
//   Step 5: Run the training loop                (Layer 5 - ml)
//
// Reference: Burn Book §5 (Training)

use anyhow::{bail, Result};
use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::application::prepare_use_case::PrepareUseCase;
use crate::data::{dataset::MidiDataset, splitter::subset_dir};
use crate::infra::{
    checkpoint::{CheckpointManager, ResumeStrategy},
    tokenizer::RemiTokenizer,
};
use crate::ml::trainer::{run_training, LossAverage, TrainingSummary};

/// Where the zipped corpus is downloaded from
pub const DEFAULT_CORPUS_URL: &str = "https://drive.google.com/uc?id=1BDEPaEWFEB2ADquS1VYp5iLZYVngw799";

// ─── Pretraining Configuration ───────────────────────────────────────────────
// Every knob of a run. Built once from the CLI, read-only afterwards,
// and saved next to the checkpoints so generation can rebuild the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PretrainConfig {
    pub corpus_url:     String,
    pub zip_path:       String,
    pub midi_dir:       String,
    pub data_dir:       String,
    pub checkpoint_dir: String,
    pub max_seq_len:    usize,
    pub batch_size:     usize,
    pub epochs:         usize,
    pub lr:             f64,
    pub save_every:     usize,
    pub log_interval:   usize,
    pub d_model:        usize,
    pub num_heads:      usize,
    pub num_layers:     usize,
    pub d_ff:           usize,
    pub dropout:        f64,
    pub seed:           u64,
    pub resume:         ResumeStrategy,
    pub loss_average:   LossAverage,
    /// None keeps the on-disk order of the training windows
    pub shuffle_seed:   Option<u64>,
    pub validate:       bool,
    pub num_workers:    usize,
}

impl Default for PretrainConfig {
    fn default() -> Self {
        Self {
            corpus_url:     DEFAULT_CORPUS_URL.to_string(),
            zip_path:       "midis.zip".to_string(),
            midi_dir:       "midis".to_string(),
            data_dir:       "pretrain_data".to_string(),
            checkpoint_dir: "pretrain_checkpoints".to_string(),
            max_seq_len:    1024,
            batch_size:     16,
            epochs:         20,
            lr:             1e-4,
            save_every:     2,
            log_interval:   500,
            d_model:        512,
            num_heads:      8,
            num_layers:     6,
            d_ff:           2048,
            dropout:        0.1,
            seed:           42,
            resume:         ResumeStrategy::Latest,
            loss_average:   LossAverage::GlobalStep,
            shuffle_seed:   None,
            validate:       false,
            num_workers:    1,
        }
    }
}

impl PretrainConfig {
    /// Reject settings the model or the data loader cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_seq_len <= 2 {
            bail!("max_seq_len ({}) must leave room for BOS and EOS", self.max_seq_len);
        }
        if self.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        if self.num_heads == 0 || self.d_model % self.num_heads != 0 {
            bail!("d_model ({}) must be divisible by num_heads ({})", self.d_model, self.num_heads);
        }
        Ok(())
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: PretrainConfig,
}

impl TrainUseCase {
    pub fn new(config: PretrainConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<TrainingSummary> {
        let cfg = &self.config;
        cfg.validate()?;

        // ── Step 1: Corpus on disk ────────────────────────────────────────────
        let tokenizer = RemiTokenizer::new();
        PrepareUseCase::from_config(cfg).execute(&tokenizer)?;

        // ── Step 2/3: Datasets ────────────────────────────────────────────────
        let data_dir = Path::new(&cfg.data_dir);
        let train = MidiDataset::from_dir(&subset_dir(data_dir, "train"), &tokenizer, cfg.max_seq_len)?;
        tracing::info!("Training windows: {} ({} tokens)", train.len(), train.token_count());

        let val = if cfg.validate {
            let val = MidiDataset::from_dir(&subset_dir(data_dir, "validation"), &tokenizer, cfg.max_seq_len)?;
            tracing::info!("Validation windows: {}", val.len());
            Some(val)
        } else {
            None
        };

        // ── Step 4: Save config for generation ────────────────────────────────
        let ckpt_manager = CheckpointManager::new(&cfg.checkpoint_dir)?;
        ckpt_manager.save_config(cfg)?;
        tokenizer.save_vocab(&ckpt_manager.dir().join("vocab.json"))?;

        // ── Step 5: Training loop (Layer 5) ───────────────────────────────────
        run_training(cfg, tokenizer.vocab_size(), tokenizer.pad_id(), train, val, &ckpt_manager)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_historical_constants() {
        let cfg = PretrainConfig::default();
        assert_eq!(cfg.batch_size, 16);
        assert_eq!(cfg.lr, 1e-4);
        assert_eq!(cfg.epochs, 20);
        assert_eq!(cfg.save_every, 2);
        assert_eq!(cfg.log_interval, 500);
        assert_eq!(cfg.max_seq_len, 1024);
        assert_eq!(cfg.checkpoint_dir, "pretrain_checkpoints");
        assert_eq!(cfg.resume, ResumeStrategy::Latest);
        assert_eq!(cfg.loss_average, LossAverage::GlobalStep);
        assert!(cfg.shuffle_seed.is_none());
    }

    #[test]
    fn test_config_json_round_trip() {
        let cfg = PretrainConfig { resume: ResumeStrategy::Epoch(6), shuffle_seed: Some(7), ..Default::default() };
        let json = serde_json::to_string(&cfg).unwrap();
        assert_eq!(serde_json::from_str::<PretrainConfig>(&json).unwrap(), cfg);
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(PretrainConfig::default().validate().is_ok());
    }

    #[test]
    fn test_unrunnable_settings_are_rejected() {
        let bad = [
            PretrainConfig { max_seq_len: 2, ..Default::default() },
            PretrainConfig { batch_size: 0, ..Default::default() },
            PretrainConfig { d_model: 510, num_heads: 8, ..Default::default() },
            PretrainConfig { num_heads: 0, ..Default::default() },
        ];
        for cfg in bad {
            assert!(cfg.validate().is_err(), "{cfg:?}");
        }
    }
}
