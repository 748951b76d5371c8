// ============================================================
// Layer 2 - Application / Use Cases
// ============================================================
// Orchestrates the other layers to accomplish one goal each
// (prepare data, train, generate, convert, score).
//
// Rules for this layer:
//   - No ML math or model code here
//   - No argument parsing or printing here (that's Layer 1)
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Download + split of the corpus
pub mod prepare_use_case;

// The pretraining workflow and its configuration
pub mod train_use_case;

// Sampling from a trained checkpoint
pub mod generate_use_case;

// Token ids → MIDI file
pub mod convert_use_case;

// Music metrics of MIDI files
pub mod metrics_use_case;
