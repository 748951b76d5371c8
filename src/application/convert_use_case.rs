// ============================================================
// Layer 2 - Token → MIDI conversion
// ============================================================
// Turns a list of token ids into a playable file.
//
//   Step 1: id → token string (fails on the first unknown id)
//   Step 2: token strings → debug dump, one per line
//   Step 3: ids → notes → MIDI file
//
// The debug dump is overwritten on every call.

use anyhow::{Context, Result};
use std::{fmt::Write as _, fs, path::Path};

use crate::infra::{midi_io, tokenizer::RemiTokenizer};

/// Write `token_ids` as a MIDI file at `dump_path`, and the token
/// strings to `debug_path`. Nothing is written if any id is unknown.
pub fn convert_to_midi(
    token_ids:  &[u32],
    tokenizer:  &RemiTokenizer,
    dump_path:  &Path,
    debug_path: &Path,
) -> Result<usize> {
    let tokens = tokenizer.ids_to_tokens(token_ids)?;

    let mut dump = String::new();
    for token in &tokens {
        writeln!(dump, "{token}")?;
    }
    fs::write(debug_path, dump)
        .with_context(|| format!("Cannot write '{}'", debug_path.display()))?;

    let notes = tokenizer.decode(token_ids)?;
    midi_io::write_notes(&notes, dump_path)?;
    tracing::info!(
        "Wrote {} notes from {} tokens to '{}'",
        notes.notes.len(),
        tokens.len(),
        dump_path.display()
    );
    Ok(notes.notes.len())
}

/// Parse whitespace or comma separated ids, as written by `generate`.
pub fn parse_token_ids(text: &str) -> Result<Vec<u32>> {
    text.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u32>().with_context(|| format!("'{s}' is not a token id")))
        .collect()
}
