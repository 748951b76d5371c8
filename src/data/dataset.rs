use anyhow::{Context, Result};
use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::data::splitter::collect_midi_paths;
use crate::infra::tokenizer::RemiTokenizer;

/// One tokenized training window, framed as `BOS ... EOS`.
/// Sequences are unpadded; the batcher pads per batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSequence {
    pub input_ids: Vec<u32>,
}

impl TokenSequence {
    /// Wrap `ids` in BOS/EOS and cut the result to `max_seq_len`.
    pub fn framed(ids: &[u32], bos: u32, eos: u32, max_seq_len: usize) -> Self {
        let mut input_ids = Vec::with_capacity(ids.len() + 2);
        input_ids.push(bos);
        input_ids.extend_from_slice(ids);
        input_ids.push(eos);
        input_ids.truncate(max_seq_len);
        Self { input_ids }
    }

    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }
}

pub struct MidiDataset {
    sequences: Vec<TokenSequence>,
}

impl MidiDataset {
    pub fn from_sequences(sequences: Vec<TokenSequence>) -> Self {
        Self { sequences }
    }

    /// Tokenize every file up front. The first unreadable file fails the load.
    pub fn from_files(paths: &[PathBuf], tokenizer: &RemiTokenizer, max_seq_len: usize) -> Result<Self> {
        let bos = tokenizer.bos_id();
        let eos = tokenizer.eos_id();

        let sequences = paths
            .iter()
            .map(|p| {
                let ids = tokenizer
                    .encode_file(p)
                    .with_context(|| format!("Cannot tokenize '{}'", p.display()))?;
                Ok(TokenSequence::framed(&ids, bos, eos, max_seq_len))
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!("Loaded {} sequences", sequences.len());
        Ok(Self { sequences })
    }

    /// Every `*.mid` under `dir`, in walk order.
    pub fn from_dir(dir: &Path, tokenizer: &RemiTokenizer, max_seq_len: usize) -> Result<Self> {
        let paths = collect_midi_paths(dir)?;
        Self::from_files(&paths, tokenizer, max_seq_len)
    }

    pub fn token_count(&self) -> usize {
        self.sequences.iter().map(TokenSequence::len).sum()
    }
}

impl Dataset<TokenSequence> for MidiDataset {
    fn get(&self, index: usize) -> Option<TokenSequence> {
        self.sequences.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.sequences.len()
    }
}
