// ============================================================
// Layer 5 - ML / Model Layer (Burn)
// ============================================================
// All model, loss and training code lives here.
//
// What's in this layer:
//
//   model.rs      The decoder-only transformer:
//                 • Token + learned positional embeddings
//                 • Causal multi-head self-attention with
//                   padding mask
//                 • Feed-forward networks (GELU activation)
//                 • Post-norm residual blocks
//                 • Language-model head over the vocabulary
//
//   loss.rs       Next-token cross-entropy ignoring PAD targets
//
//   trainer.rs    The pretraining loop: resume, forward,
//                 backward, AdamW step, logging, checkpoints
//
//   generator.rs  Loads a checkpoint and samples new tokens
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Vaswani et al. (2017) Attention Is All You Need

/// Decoder-only transformer architecture
pub mod model;

/// Masked next-token loss
pub mod loss;

/// Training loop with checkpointing and resume
pub mod trainer;

/// Autoregressive sampling from a checkpoint
pub mod generator;
