// ============================================================
// Layer 2 - PrepareUseCase
// ============================================================
// Gets the corpus ready for training:
//
//   Step 1: midis/ missing?              download + unzip
//   Step 2: pretrain_data/ missing?      80/10/10 split + chunk
//
// Both steps are skipped when their output directory already
// exists, so running `train` twice never re-downloads.

use anyhow::Result;
use std::path::PathBuf;

use crate::application::train_use_case::PretrainConfig;
use crate::data::{
    acquisition::{acquire_corpus, HttpFetcher},
    splitter::{split_pretrain_data, subset_dir},
};
use crate::domain::traits::CorpusFetcher;
use crate::infra::tokenizer::RemiTokenizer;

#[derive(Debug, Clone)]
pub struct PrepareUseCase {
    pub corpus_url:  String,
    pub zip_path:    PathBuf,
    pub midi_dir:    PathBuf,
    pub data_dir:    PathBuf,
    pub max_seq_len: usize,
}

impl PrepareUseCase {
    pub fn from_config(cfg: &PretrainConfig) -> Self {
        Self {
            corpus_url:  cfg.corpus_url.clone(),
            zip_path:    PathBuf::from(&cfg.zip_path),
            midi_dir:    PathBuf::from(&cfg.midi_dir),
            data_dir:    PathBuf::from(&cfg.data_dir),
            max_seq_len: cfg.max_seq_len,
        }
    }

    pub fn execute(&self, tokenizer: &RemiTokenizer) -> Result<()> {
        let fetcher = HttpFetcher::new()?;
        self.execute_with(&fetcher, tokenizer)
    }

    pub fn execute_with(&self, fetcher: &dyn CorpusFetcher, tokenizer: &RemiTokenizer) -> Result<()> {
        acquire_corpus(fetcher, &self.corpus_url, &self.zip_path, &self.midi_dir)?;

        if subset_dir(&self.data_dir, "train").exists() {
            tracing::info!("'{}' already split, skipping", self.data_dir.display());
            return Ok(());
        }
        split_pretrain_data(&self.midi_dir, &self.data_dir, tokenizer, self.max_seq_len)?;
        Ok(())
    }
}
