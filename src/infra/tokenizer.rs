// ============================================================
// Layer 6 - REMI Tokenizer
// ============================================================
// Converts MIDI notes to integer token ids and back.
//
// Vocabulary layout (ids are assigned in this order):
//   PAD_None BOS_None EOS_None MASK_None   -> 0..4
//   Bar_None
//   Position_0 .. Position_31              (8 per beat, 4/4 bars)
//   Pitch_21 .. Pitch_108                  (piano range)
//   Velocity_<v>                           (32 bins over 1..=127)
//   Duration_<beats>.<pos>.8               (1..=64 positions)
//
// Encoding quantizes every note onset and length to the
// position grid; notes outside the piano range are dropped.
// Decoding ignores special tokens and skips any Pitch that is
// not followed by a Velocity and a Duration.
//
// The vocabulary is fixed, so the same tokenizer is rebuilt
// for training, generation and conversion; `save_vocab` writes
// it out as JSON purely for inspection.

use anyhow::{anyhow, Context, Result};
use std::{collections::HashMap, fs, ops::RangeInclusive, path::Path};

use crate::domain::note::{Note, NoteSequence};
use crate::domain::token::{RemiToken, Special, POSITIONS_PER_BAR, POSITIONS_PER_BEAT};
use crate::infra::midi_io::{self, TICKS_PER_QUARTER};

const PITCH_RANGE: RangeInclusive<u8> = 21..=108;
const NUM_VELOCITIES: u32 = 32;
const MAX_DURATION: u32 = 8 * POSITIONS_PER_BEAT;

pub struct RemiTokenizer {
    tokens:     Vec<RemiToken>,
    ids:        HashMap<RemiToken, u32>,
    velocities: Vec<u8>,
}

impl RemiTokenizer {
    pub fn new() -> Self {
        let velocities: Vec<u8> = (1..=NUM_VELOCITIES)
            .map(|i| (i as f64 * 127.0 / NUM_VELOCITIES as f64).round() as u8)
            .collect();

        let mut tokens: Vec<RemiToken> = Special::ALL.iter().map(|s| RemiToken::Special(*s)).collect();
        tokens.push(RemiToken::Bar);
        tokens.extend((0..POSITIONS_PER_BAR).map(RemiToken::Position));
        tokens.extend(PITCH_RANGE.map(RemiToken::Pitch));
        tokens.extend(velocities.iter().map(|v| RemiToken::Velocity(*v)));
        tokens.extend((1..=MAX_DURATION).map(RemiToken::Duration));

        let ids = tokens
            .iter()
            .enumerate()
            .map(|(id, tok)| (*tok, id as u32))
            .collect();

        Self { tokens, ids, velocities }
    }

    pub fn vocab_size(&self) -> usize {
        self.tokens.len()
    }

    pub fn pad_id(&self) -> u32 {
        self.special_id(Special::Pad)
    }

    pub fn bos_id(&self) -> u32 {
        self.special_id(Special::Bos)
    }

    pub fn eos_id(&self) -> u32 {
        self.special_id(Special::Eos)
    }

    pub fn bar_id(&self) -> u32 {
        self.ids[&RemiToken::Bar]
    }

    fn special_id(&self, special: Special) -> u32 {
        self.ids[&RemiToken::Special(special)]
    }

    pub fn token(&self, id: u32) -> Option<RemiToken> {
        self.tokens.get(id as usize).copied()
    }

    pub fn id(&self, token: RemiToken) -> Option<u32> {
        self.ids.get(&token).copied()
    }

    /// Map ids to tokens, failing on the first id outside the vocabulary.
    pub fn ids_to_tokens(&self, ids: &[u32]) -> Result<Vec<RemiToken>> {
        ids.iter()
            .enumerate()
            .map(|(i, &id)| {
                self.token(id).ok_or_else(|| anyhow!(
                    "Token id {id} at index {i} is outside the vocabulary (size {})",
                    self.vocab_size()
                ))
            })
            .collect()
    }

    /// Tokenize a MIDI file from disk.
    pub fn encode_file(&self, path: &Path) -> Result<Vec<u32>> {
        let seq = midi_io::read_notes(path)?;
        Ok(self.encode(&seq))
    }

    /// Tokenize a note sequence. An empty piece yields no tokens.
    pub fn encode(&self, seq: &NoteSequence) -> Vec<u32> {
        let ticks_per_position = seq.ticks_per_beat as f64 / POSITIONS_PER_BEAT as f64;

        // (absolute position, pitch, velocity, duration in positions)
        let mut events: Vec<(u32, u8, u8, u32)> = seq
            .notes
            .iter()
            .filter(|n| PITCH_RANGE.contains(&n.pitch))
            .map(|n| {
                let pos = (n.start as f64 / ticks_per_position).round() as u32;
                let dur = (n.duration as f64 / ticks_per_position).round() as u32;
                (pos, n.pitch, self.quantize_velocity(n.velocity), dur.clamp(1, MAX_DURATION))
            })
            .collect();
        events.sort_by_key(|(pos, pitch, ..)| (*pos, *pitch));

        let Some(last) = events.last() else {
            return Vec::new();
        };
        let last_bar = last.0 / POSITIONS_PER_BAR;

        let mut ids    = Vec::with_capacity(events.len() * 4 + last_bar as usize + 1);
        let mut events = events.into_iter().peekable();
        for bar in 0..=last_bar {
            ids.push(self.bar_id());
            let mut current: Option<u32> = None;
            while let Some(&(pos, pitch, vel, dur)) = events.peek() {
                if pos / POSITIONS_PER_BAR != bar {
                    break;
                }
                let in_bar = pos % POSITIONS_PER_BAR;
                if current != Some(in_bar) {
                    ids.push(self.ids[&RemiToken::Position(in_bar)]);
                    current = Some(in_bar);
                }
                ids.push(self.ids[&RemiToken::Pitch(pitch)]);
                ids.push(self.ids[&RemiToken::Velocity(vel)]);
                ids.push(self.ids[&RemiToken::Duration(dur)]);
                events.next();
            }
        }
        ids
    }

    /// Rebuild notes from token ids. Fails on ids outside the vocabulary.
    pub fn decode(&self, ids: &[u32]) -> Result<NoteSequence> {
        let tokens = self.ids_to_tokens(ids)?;
        let ticks_per_position = TICKS_PER_QUARTER as u32 / POSITIONS_PER_BEAT;

        let mut notes = Vec::new();
        let mut bar: Option<u32> = None;
        let mut position: Option<u32> = None;

        let mut i = 0;
        while i < tokens.len() {
            match tokens[i] {
                RemiToken::Bar => {
                    bar = Some(bar.map_or(0, |b| b + 1));
                    position = None;
                }
                RemiToken::Position(p) => position = Some(p),
                RemiToken::Pitch(pitch) => {
                    if let (Some(p), Some(RemiToken::Velocity(vel)), Some(RemiToken::Duration(dur))) =
                        (position, tokens.get(i + 1), tokens.get(i + 2))
                    {
                        let onset = bar.unwrap_or(0) * POSITIONS_PER_BAR + p;
                        notes.push(Note::new(
                            pitch,
                            *vel,
                            onset * ticks_per_position,
                            dur * ticks_per_position,
                        ));
                        i += 3;
                        continue;
                    }
                }
                _ => {}
            }
            i += 1;
        }

        Ok(NoteSequence::new(TICKS_PER_QUARTER, notes))
    }

    /// Indices of every `Bar_None` token.
    pub fn bar_starts(&self, ids: &[u32]) -> Vec<usize> {
        let bar = self.bar_id();
        ids.iter()
            .enumerate()
            .filter_map(|(i, &id)| (id == bar).then_some(i))
            .collect()
    }

    /// Write the vocabulary as a `{ "token": id }` JSON object.
    pub fn save_vocab(&self, path: &Path) -> Result<()> {
        let vocab: serde_json::Map<String, serde_json::Value> = self
            .tokens
            .iter()
            .enumerate()
            .map(|(id, tok)| (tok.to_string(), serde_json::json!(id)))
            .collect();
        fs::write(path, serde_json::to_string_pretty(&vocab)?)
            .with_context(|| format!("Cannot write vocabulary to '{}'", path.display()))?;
        tracing::debug!("Saved vocabulary ({} tokens) to '{}'", self.vocab_size(), path.display());
        Ok(())
    }

    /// Nearest velocity bin
    pub fn quantize_velocity(&self, velocity: u8) -> u8 {
        *self
            .velocities
            .iter()
            .min_by_key(|v| (**v as i16 - velocity as i16).abs())
            .unwrap_or(&velocity)
    }
}

impl Default for RemiTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn tok(t: &RemiTokenizer, token: RemiToken) -> u32 {
        t.id(token).unwrap()
    }

    #[test]
    fn test_vocab_layout() {
        let t = RemiTokenizer::new();
        // 4 specials + bar + 32 positions + 88 pitches + 32 velocities + 64 durations
        assert_eq!(t.vocab_size(), 4 + 1 + 32 + 88 + 32 + 64);
        assert_eq!(t.pad_id(), 0);
        assert_eq!(t.bos_id(), 1);
        assert_eq!(t.eos_id(), 2);
        assert_eq!(t.token(t.bar_id()), Some(RemiToken::Bar));
    }

    #[test]
    fn test_velocity_bins_are_distinct_and_reach_127() {
        let t = RemiTokenizer::new();
        let mut v = t.velocities.clone();
        v.dedup();
        assert_eq!(v.len(), 32);
        assert_eq!(*v.last().unwrap(), 127);
    }

    #[test]
    fn test_encode_one_bar() {
        let t   = RemiTokenizer::new();
        let seq = NoteSequence::new(480, vec![
            Note::new(60, 127, 0, 480),
            Note::new(64, 127, 0, 480),
            Note::new(67, 127, 480, 240),
        ]);
        let ids = t.encode(&seq);
        let expected = vec![
            tok(&t, RemiToken::Bar),
            tok(&t, RemiToken::Position(0)),
            tok(&t, RemiToken::Pitch(60)), tok(&t, RemiToken::Velocity(127)), tok(&t, RemiToken::Duration(8)),
            tok(&t, RemiToken::Pitch(64)), tok(&t, RemiToken::Velocity(127)), tok(&t, RemiToken::Duration(8)),
            tok(&t, RemiToken::Position(8)),
            tok(&t, RemiToken::Pitch(67)), tok(&t, RemiToken::Velocity(127)), tok(&t, RemiToken::Duration(4)),
        ];
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_empty_bars_are_emitted() {
        let t   = RemiTokenizer::new();
        // One note in the third bar (4 beats per bar)
        let seq = NoteSequence::new(480, vec![Note::new(60, 127, 480 * 8, 480)]);
        let ids = t.encode(&seq);
        assert_eq!(t.bar_starts(&ids), vec![0, 1, 2]);
    }

    #[test]
    fn test_encode_decode_keeps_grid_aligned_notes() {
        let t   = RemiTokenizer::new();
        let seq = NoteSequence::new(480, vec![
            Note::new(48, 127, 0, 1920),
            Note::new(72, 127, 960, 60),
            Note::new(74, 127, 1920 + 240, 480),
        ]);
        let decoded = t.decode(&t.encode(&seq)).unwrap();
        assert_eq!(decoded, seq);
    }

    #[test]
    fn test_out_of_range_pitch_is_dropped() {
        let t   = RemiTokenizer::new();
        let seq = NoteSequence::new(480, vec![Note::new(10, 100, 0, 480)]);
        assert!(t.encode(&seq).is_empty());
    }

    #[test]
    fn test_decode_rejects_unknown_id() {
        let t   = RemiTokenizer::new();
        let bad = t.vocab_size() as u32;
        let err = t.decode(&[t.bar_id(), bad]).unwrap_err();
        assert!(err.to_string().contains(&bad.to_string()));
    }

    #[test]
    fn test_decode_skips_incomplete_note() {
        let t   = RemiTokenizer::new();
        let ids = vec![
            t.bos_id(),
            tok(&t, RemiToken::Bar),
            tok(&t, RemiToken::Position(0)),
            tok(&t, RemiToken::Pitch(60)),
            tok(&t, RemiToken::Position(4)),
            tok(&t, RemiToken::Pitch(62)), tok(&t, RemiToken::Velocity(127)), tok(&t, RemiToken::Duration(2)),
            t.eos_id(),
        ];
        let seq = t.decode(&ids).unwrap();
        assert_eq!(seq.notes, vec![Note::new(62, 127, 4 * 60, 2 * 60)]);
    }
}
