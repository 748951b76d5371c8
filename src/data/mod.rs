// ============================================================
// Layer 4 - Data Pipeline
// ============================================================
// Everything from the zipped corpus to tensor batches.
//
//   midis.zip (remote)
//       │
//       ▼
//   acquisition   → download once, unzip into midis/
//       │
//       ▼
//   splitter      → 80/10/10 file split, in walk order
//       │
//       ▼
//   chunker       → bar-aligned windows with 2 bars of overlap
//       │           written to pretrain_data/dataset_*/
//       ▼
//   MidiDataset   → BOS + REMI ids + EOS per window
//       │
//       ▼
//   MidiBatcher   → right-padded tensor batches
//       │
//       ▼
//   DataLoader    → feeds the training loop
//
// music_metrics sits to the side: it scores MIDI files,
// usually generated ones.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Downloads and unpacks the raw corpus
pub mod acquisition;

/// Train/validation/test split of the corpus files
pub mod splitter;

/// Bar-aligned overlapping windows
pub mod chunker;

/// Implements Burn's Dataset trait for token sequences
pub mod dataset;

/// Implements Burn's Batcher trait with per-batch padding
pub mod batcher;

pub mod music_metrics;
