// ============================================================
// Layer 4 - Bar Chunker
// ============================================================
// Re-segments long pieces into training windows that fit the
// model's context.
//
// Why bars and not raw token counts?
//   Cutting in the middle of a bar leaves the model a window
//   that starts with a dangling Pitch or Position. Windows here
//   always start on a `Bar` token.
//
// Sliding window with bar overlap
//   - fill a window with whole bars while it fits the budget
//   - the next window starts `overlap_bars` bars before the end
//     of the previous one, so musical context carries across
//   - every window covers at least one bar the previous did not
//
// Example with budget=10 tokens, overlap=2 bars,
// bar lengths [4, 3, 3, 2, 4]:
//   Window 1: bars 0..3   (4+3+3 = 10 tokens)
//   Window 2: bars 1..4   (3+3+2 = 8, adding bar 4 would be 12)
//   Window 3: bars 2..5   (3+2+4 = 9)
//
// A bar that alone exceeds the budget becomes its own window,
// truncated to the budget.
//
// The budget is max_seq_len - 2: the dataset adds BOS and EOS.

use anyhow::{bail, Context, Result};
use std::{ops::Range, path::Path};

use crate::infra::{midi_io, tokenizer::RemiTokenizer};

/// Tokens reserved for BOS/EOS framing by the dataset
const FRAMING_TOKENS: usize = 2;

pub struct Chunker {
    /// Maximum tokens per window
    budget: usize,
    /// Number of bars shared between adjacent windows
    overlap_bars: usize,
}

impl Chunker {
    /// Create a new Chunker for a model context of `max_seq_len`.
    /// Fails if `max_seq_len` leaves no room after BOS/EOS.
    pub fn new(max_seq_len: usize, overlap_bars: usize) -> Result<Self> {
        if max_seq_len <= FRAMING_TOKENS {
            bail!("max_seq_len ({}) must be greater than {}", max_seq_len, FRAMING_TOKENS);
        }
        Ok(Self { budget: max_seq_len - FRAMING_TOKENS, overlap_bars })
    }

    /// Split bar lengths (in tokens) into windows of bar indices.
    pub fn windows(&self, bar_lengths: &[usize]) -> Vec<Range<usize>> {
        let n = bar_lengths.len();
        let mut windows = Vec::new();
        let mut start   = 0usize;
        let mut covered = 0usize;

        while covered < n {
            let mut end = self.fill(bar_lengths, start);
            if end <= covered {
                // Overlap plus the next bar does not fit: drop the overlap
                start = covered;
                end   = self.fill(bar_lengths, start);
            }
            windows.push(start..end);
            covered = end;
            start   = end.saturating_sub(self.overlap_bars).max(start + 1);
        }

        windows
    }

    /// Largest `end` such that bars `start..end` fit, at least `start + 1`.
    fn fill(&self, bar_lengths: &[usize], start: usize) -> usize {
        let mut end = start;
        let mut len = 0usize;
        while end < bar_lengths.len() && len + bar_lengths[end] <= self.budget {
            len += bar_lengths[end];
            end += 1;
        }
        end.max(start + 1)
    }

    /// Cut a token stream into windows along its bar boundaries.
    /// `bar_starts` are the indices of the `Bar` tokens, ascending.
    pub fn chunk(&self, ids: &[u32], bar_starts: &[usize]) -> Vec<Vec<u32>> {
        if bar_starts.is_empty() {
            return Vec::new();
        }

        let bar_span = |b: usize| -> Range<usize> {
            let end = bar_starts.get(b + 1).copied().unwrap_or(ids.len());
            bar_starts[b]..end
        };
        let lengths: Vec<usize> = (0..bar_starts.len()).map(|b| bar_span(b).len()).collect();

        self.windows(&lengths)
            .into_iter()
            .map(|w| {
                let from = bar_span(w.start).start;
                let to   = bar_span(w.end - 1).end;
                let mut window = ids[from..to].to_vec();
                window.truncate(self.budget);
                window
            })
            .collect()
    }

    /// Tokenize `src`, cut it into windows and write each window as
    /// `<out_dir>/<stem>_<i>.mid`. Returns the number of files written.
    pub fn chunk_file(&self, tokenizer: &RemiTokenizer, src: &Path, out_dir: &Path) -> Result<usize> {
        let ids = tokenizer.encode_file(src)?;
        let stem = src
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("chunk");

        let windows = self.chunk(&ids, &tokenizer.bar_starts(&ids));
        for (i, window) in windows.iter().enumerate() {
            let notes = tokenizer.decode(window)?;
            let dest  = out_dir.join(format!("{stem}_{i}.mid"));
            midi_io::write_notes(&notes, &dest)
                .with_context(|| format!("Cannot write chunk {} of '{}'", i, src.display()))?;
        }

        tracing::debug!("'{}' -> {} chunks", src.display(), windows.len());
        Ok(windows.len())
    }
}
