// ============================================================
// Layer 4 - Music Evaluation Metrics
// ============================================================
// Six descriptive statistics of a MIDI file, used to eyeball
// generated samples against the corpus.
//
//   pitch_range           max pitch - min pitch
//   n_pitches_used        distinct pitches
//   n_pitch_classes_used  distinct pitches mod 12
//   polyphony             mean sounding pitches over ticks with >= 1
//   polyphony_rate        share of ticks with >= 2 sounding pitches
//   empty_beat_rate       share of beats with nothing sounding
//
// A pitch counts once per tick even when two notes of the same
// pitch overlap, so intervals are merged per pitch before the
// sweep over start/end events.

use anyhow::Result;
use serde::Serialize;
use std::{collections::BTreeMap, path::Path};

use crate::domain::note::NoteSequence;
use crate::infra::midi_io;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct MusicMetrics {
    pub pitch_range:          u8,
    pub n_pitches_used:       usize,
    pub n_pitch_classes_used: usize,
    pub polyphony:            f64,
    pub polyphony_rate:       f64,
    pub empty_beat_rate:      f64,
}

pub fn compute_music_metrics(path: &Path) -> Result<MusicMetrics> {
    let seq = midi_io::read_notes(path)?;
    Ok(music_metrics(&seq))
}

pub fn music_metrics(seq: &NoteSequence) -> MusicMetrics {
    if seq.is_empty() {
        return MusicMetrics::default();
    }

    let intervals = merged_intervals(seq);

    let lowest  = intervals.keys().next().copied().unwrap_or(0);
    let highest = intervals.keys().next_back().copied().unwrap_or(0);
    let mut classes = [false; 12];
    for pitch in intervals.keys() {
        classes[(pitch % 12) as usize] = true;
    }

    let (polyphony, polyphony_rate) = sweep(&intervals, seq.end_tick());

    MusicMetrics {
        pitch_range:          highest - lowest,
        n_pitches_used:       intervals.len(),
        n_pitch_classes_used: classes.iter().filter(|&&c| c).count(),
        polyphony,
        polyphony_rate,
        empty_beat_rate:      empty_beat_rate(&intervals, seq.ticks_per_beat, seq.end_tick()),
    }
}

/// Per pitch, the union of its note spans as sorted disjoint [start, end) pairs.
fn merged_intervals(seq: &NoteSequence) -> BTreeMap<u8, Vec<(u32, u32)>> {
    let mut by_pitch: BTreeMap<u8, Vec<(u32, u32)>> = BTreeMap::new();
    for note in &seq.notes {
        by_pitch.entry(note.pitch).or_default().push((note.start, note.end()));
    }

    for spans in by_pitch.values_mut() {
        spans.sort_unstable();
        let mut merged: Vec<(u32, u32)> = Vec::with_capacity(spans.len());
        for &(s, e) in spans.iter() {
            match merged.last_mut() {
                Some(last) if s <= last.1 => last.1 = last.1.max(e),
                _ => merged.push((s, e)),
            }
        }
        *spans = merged;
    }
    by_pitch
}

/// (mean sounding pitches while anything sounds, share of ticks with 2+ sounding)
fn sweep(intervals: &BTreeMap<u8, Vec<(u32, u32)>>, end_tick: u32) -> (f64, f64) {
    let mut events: Vec<(u32, i32)> = intervals
        .values()
        .flatten()
        .flat_map(|&(s, e)| [(s, 1), (e, -1)])
        .collect();
    events.sort_unstable();

    let mut active     = 0i32;
    let mut last_tick  = 0u32;
    let mut voiced     = 0u64;
    let mut weighted   = 0u64;
    let mut polyphonic = 0u64;

    for (tick, delta) in events {
        let span = u64::from(tick - last_tick);
        if active > 0 {
            voiced   += span;
            weighted += span * active as u64;
        }
        if active > 1 {
            polyphonic += span;
        }
        active += delta;
        last_tick = tick;
    }

    if voiced == 0 || end_tick == 0 {
        return (0.0, 0.0);
    }
    (weighted as f64 / voiced as f64, polyphonic as f64 / f64::from(end_tick))
}

fn empty_beat_rate(intervals: &BTreeMap<u8, Vec<(u32, u32)>>, ticks_per_beat: u16, end_tick: u32) -> f64 {
    let tpb = u32::from(ticks_per_beat.max(1));
    let n_beats = end_tick.div_ceil(tpb) as usize;
    if n_beats == 0 {
        return 0.0;
    }

    let mut occupied = vec![false; n_beats];
    for &(s, e) in intervals.values().flatten() {
        let first = (s / tpb) as usize;
        let last  = ((e - 1) / tpb) as usize;
        for beat in occupied.iter_mut().take(last + 1).skip(first) {
            *beat = true;
        }
    }

    occupied.iter().filter(|&&o| !o).count() as f64 / n_beats as f64
}
