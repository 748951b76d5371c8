// ============================================================
// Layer 6 - Infrastructure Layer
// ============================================================
// Cross-cutting concerns used by several other layers:
//
//   midi_io.rs    - MIDI bytes <-> NoteSequence (midly)
//   tokenizer.rs  - REMI vocabulary, NoteSequence <-> token ids
//   checkpoint.rs - model/optimizer state, checkpoint registry,
//                   saved training config
//   metrics.rs    - per-epoch CSV of losses
//   logging.rs    - tracing subscriber (stdout + log file)
//
// Reference: Rust Book §7 (Modules)
//            Burn Book §5 (Checkpointing)

/// Standard MIDI File reading and writing
pub mod midi_io;

/// REMI tokenizer
pub mod tokenizer;

/// Model checkpoint saving, loading and resume selection
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;

/// Process-wide tracing setup
pub mod logging;
