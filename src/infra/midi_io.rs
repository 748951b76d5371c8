// ============================================================
// Layer 6 - MIDI File I/O
// ============================================================
// Reads Standard MIDI Files into a NoteSequence and writes a
// NoteSequence back out, using the `midly` crate.
//
// Reading:
//   - every track is walked, delta ticks accumulated into
//     absolute ticks
//   - NoteOn with velocity 0 counts as NoteOff
//   - overlapping notes of the same key on the same channel are
//     paired first-in first-out
//   - channel 10 (index 9) is percussion and is skipped
//   - notes still sounding when their track ends are dropped
//
// Writing produces SMF format 0 (one track) at 480 ticks per
// quarter with a single 120 BPM tempo event.
//
// Reference: midly crate documentation

use anyhow::{bail, Context, Result};
use midly::{
    num::{u15, u24, u28, u4, u7},
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind,
};
use std::{
    collections::{HashMap, VecDeque},
    fs,
    path::Path,
};

use crate::domain::note::{Note, NoteSequence};

/// Ticks per quarter note for files we write.
pub const TICKS_PER_QUARTER: u16 = 480;

/// 120 BPM expressed as microseconds per quarter note.
const DEFAULT_TEMPO_US: u32 = 500_000;

const DRUM_CHANNEL: u8 = 9;

/// Read and parse a MIDI file from disk.
pub fn read_notes(path: &Path) -> Result<NoteSequence> {
    let bytes = fs::read(path)
        .with_context(|| format!("Cannot read MIDI file '{}'", path.display()))?;
    parse_notes(&bytes)
        .with_context(|| format!("Cannot parse MIDI file '{}'", path.display()))
}

/// Parse an in-memory Standard MIDI File.
pub fn parse_notes(bytes: &[u8]) -> Result<NoteSequence> {
    let smf = Smf::parse(bytes)?;

    let ticks_per_beat = match smf.header.timing {
        Timing::Metrical(t) => t.as_int(),
        Timing::Timecode(..) => bail!("SMPTE-timed MIDI files are not supported"),
    };
    if ticks_per_beat == 0 {
        bail!("MIDI header declares 0 ticks per beat");
    }

    let mut notes = Vec::new();
    for track in &smf.tracks {
        // (channel, key) -> queue of (start tick, velocity)
        let mut sounding: HashMap<(u8, u8), VecDeque<(u32, u8)>> = HashMap::new();
        let mut tick: u32 = 0;

        for event in track {
            tick = tick.saturating_add(event.delta.as_int());

            let TrackEventKind::Midi { channel, message } = event.kind else {
                continue;
            };
            let channel = channel.as_int();
            if channel == DRUM_CHANNEL {
                continue;
            }

            match message {
                MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                    sounding
                        .entry((channel, key.as_int()))
                        .or_default()
                        .push_back((tick, vel.as_int()));
                }
                MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                    let pitch = key.as_int();
                    if let Some((start, velocity)) = sounding
                        .get_mut(&(channel, pitch))
                        .and_then(VecDeque::pop_front)
                    {
                        let duration = (tick - start).max(1);
                        notes.push(Note::new(pitch, velocity, start, duration));
                    }
                }
                _ => {}
            }
        }
    }

    Ok(NoteSequence::new(ticks_per_beat, notes))
}

/// Serialise a NoteSequence into SMF bytes.
pub fn to_midi_bytes(seq: &NoteSequence) -> Result<Vec<u8>> {
    let mut smf = Smf::new(Header::new(
        Format::SingleTrack,
        Timing::Metrical(u15::new(seq.ticks_per_beat)),
    ));

    // (tick, note-offs before note-ons at the same tick, message)
    let mut events: Vec<(u32, u8, MidiMessage)> = Vec::with_capacity(seq.notes.len() * 2);
    for note in &seq.notes {
        let key = u7::new(note.pitch.min(127));
        events.push((note.start, 1, MidiMessage::NoteOn { key, vel: u7::new(note.velocity.clamp(1, 127)) }));
        events.push((note.end(), 0, MidiMessage::NoteOff { key, vel: u7::new(0) }));
    }
    events.sort_by_key(|(tick, order, _)| (*tick, *order));

    let mut track = vec![TrackEvent {
        delta: u28::new(0),
        kind:  TrackEventKind::Meta(MetaMessage::Tempo(u24::new(DEFAULT_TEMPO_US))),
    }];

    let mut last_tick = 0u32;
    for (tick, _, message) in events {
        track.push(TrackEvent {
            delta: u28::new(tick - last_tick),
            kind:  TrackEventKind::Midi { channel: u4::new(0), message },
        });
        last_tick = tick;
    }
    track.push(TrackEvent {
        delta: u28::new(0),
        kind:  TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    smf.tracks.push(track);

    let mut buf = Vec::new();
    smf.write_std(&mut buf).context("Failed to encode MIDI")?;
    Ok(buf)
}

/// Write a NoteSequence to `path` as a MIDI file.
pub fn write_notes(seq: &NoteSequence, path: &Path) -> Result<()> {
    let bytes = to_midi_bytes(seq)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create directory '{}'", parent.display()))?;
    }
    fs::write(path, bytes)
        .with_context(|| format!("Cannot write MIDI file '{}'", path.display()))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_parse_keeps_notes() {
        let seq = NoteSequence::new(TICKS_PER_QUARTER, vec![
            Note::new(60, 80, 0, 480),
            Note::new(64, 90, 0, 480),
            Note::new(67, 70, 480, 960),
        ]);
        let bytes  = to_midi_bytes(&seq).unwrap();
        let parsed = parse_notes(&bytes).unwrap();
        assert_eq!(parsed, seq);
    }

    #[test]
    fn test_repeated_key_pairs_fifo() {
        // Same key struck twice before the first release
        let mut smf = Smf::new(Header::new(Format::SingleTrack, Timing::Metrical(u15::new(96))));
        let on  = |d: u32| TrackEvent {
            delta: u28::new(d),
            kind:  TrackEventKind::Midi {
                channel: u4::new(0),
                message: MidiMessage::NoteOn { key: u7::new(60), vel: u7::new(100) },
            },
        };
        let off = |d: u32| TrackEvent {
            delta: u28::new(d),
            kind:  TrackEventKind::Midi {
                channel: u4::new(0),
                message: MidiMessage::NoteOn { key: u7::new(60), vel: u7::new(0) },
            },
        };
        smf.tracks.push(vec![on(0), on(10), off(10), off(10)]);
        let mut buf = Vec::new();
        smf.write_std(&mut buf).unwrap();

        let parsed = parse_notes(&buf).unwrap();
        assert_eq!(parsed.ticks_per_beat, 96);
        assert_eq!(parsed.notes, vec![Note::new(60, 100, 0, 20), Note::new(60, 100, 10, 20)]);
    }

    #[test]
    fn test_drum_channel_is_skipped() {
        let mut smf = Smf::new(Header::new(Format::SingleTrack, Timing::Metrical(u15::new(480))));
        let ev = |d: u32, vel: u8| TrackEvent {
            delta: u28::new(d),
            kind:  TrackEventKind::Midi {
                channel: u4::new(DRUM_CHANNEL),
                message: MidiMessage::NoteOn { key: u7::new(36), vel: u7::new(vel) },
            },
        };
        smf.tracks.push(vec![ev(0, 100), ev(120, 0)]);
        let mut buf = Vec::new();
        smf.write_std(&mut buf).unwrap();

        assert!(parse_notes(&buf).unwrap().is_empty());
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(parse_notes(b"not a midi file").is_err());
    }

    #[test]
    fn test_zero_ticks_per_beat_is_an_error() {
        let mut smf = Smf::new(Header::new(Format::SingleTrack, Timing::Metrical(u15::new(0))));
        smf.tracks.push(vec![TrackEvent {
            delta: u28::new(0),
            kind:  TrackEventKind::Meta(MetaMessage::EndOfTrack),
        }]);
        let mut buf = Vec::new();
        smf.write_std(&mut buf).unwrap();

        let err = parse_notes(&buf).unwrap_err();
        assert!(err.to_string().contains("0 ticks per beat"));
    }
}
