// ============================================================
// Layer 4 - Train/Validation/Test Splitter
// ============================================================
// Partitions the corpus file list 80% / 10% / 10%.
//
//   n_train = floor(0.8 * N)
//   n_valid = floor(0.1 * N)
//   n_test  = N - n_train - n_valid
//
// The three subsets are contiguous slices of the path list, in
// order. There is NO shuffle: the walk order decides which
// files land in which split, so a corpus laid out by artist or
// genre produces skewed splits. The walk is sorted by file name
// per directory, which at least makes the result reproducible
// across machines.
//
// Each subset is then re-chunked (see chunker.rs) into
//   <out_root>/dataset_train/
//   <out_root>/dataset_validation/
//   <out_root>/dataset_test/
// keeping the source's sub-directory layout so equal file
// names in different folders don't overwrite each other.
//
// Reference: Rust Book §8 (Vectors)

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

use crate::data::chunker::Chunker;
use crate::infra::tokenizer::RemiTokenizer;

/// Bars shared by consecutive training windows
pub const NUM_OVERLAP_BARS: usize = 2;

/// The three subsets of a corpus, in split order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusSplit<T> {
    pub train:      Vec<T>,
    pub validation: Vec<T>,
    pub test:       Vec<T>,
}

impl<T> CorpusSplit<T> {
    /// (subset name, items) in output order
    pub fn subsets(&self) -> [(&'static str, &[T]); 3] {
        [
            ("train",      &self.train),
            ("validation", &self.validation),
            ("test",       &self.test),
        ]
    }
}

/// Directory a subset's chunks are written to
pub fn subset_dir(out_root: &Path, subset: &str) -> PathBuf {
    out_root.join(format!("dataset_{subset}"))
}

/// Recursively list every `*.mid` file under `root`.
pub fn collect_midi_paths(root: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Cannot walk '{}'", root.display()))?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|e| e.to_str()) == Some("mid")
        {
            paths.push(entry.into_path());
        }
    }
    Ok(paths)
}

/// Split `items` 80/10/10 in order without shuffling.
pub fn split_corpus<T>(mut items: Vec<T>) -> CorpusSplit<T> {
    let total   = items.len();
    let n_train = total * 8 / 10;
    let n_valid = total / 10;

    // split_off(n) leaves [0..n) in place and returns [n..)
    let test       = items.split_off(n_train + n_valid);
    let validation = items.split_off(n_train);

    tracing::debug!(
        "Corpus split: {} train, {} validation, {} test",
        items.len(),
        validation.len(),
        test.len()
    );

    CorpusSplit { train: items, validation, test }
}

/// Split the raw corpus under `midi_root` and chunk each subset into `out_root`.
/// Any file that fails to tokenize aborts the whole run.
pub fn split_pretrain_data(
    midi_root:   &Path,
    out_root:    &Path,
    tokenizer:   &RemiTokenizer,
    max_seq_len: usize,
) -> Result<CorpusSplit<PathBuf>> {
    let paths = collect_midi_paths(midi_root)?;
    tracing::info!("Found {} MIDI files under '{}'", paths.len(), midi_root.display());

    let split   = split_corpus(paths);
    let chunker = Chunker::new(max_seq_len, NUM_OVERLAP_BARS)?;

    for (name, files) in split.subsets() {
        let dir = subset_dir(out_root, name);
        fs::create_dir_all(&dir).with_context(|| format!("Cannot create '{}'", dir.display()))?;
        let mut chunks = 0usize;
        for src in files {
            let relative = src
                .parent()
                .and_then(|p| p.strip_prefix(midi_root).ok())
                .unwrap_or_else(|| Path::new(""));
            chunks += chunker
                .chunk_file(tokenizer, src, &dir.join(relative))
                .with_context(|| format!("Failed to split '{}'", src.display()))?;
        }
        tracing::info!("{}: {} files -> {} chunks in '{}'", name, files.len(), chunks, dir.display());
    }

    Ok(split)
}
