// ============================================================
// Layer 3 - Note Domain Types
// ============================================================
// A piece of music reduced to what the tokenizer and the
// evaluation metrics need: pitched notes on an absolute tick
// timeline with a known ticks-per-beat resolution.
//
// Drums, controllers and tempo changes are not represented.

use serde::{Deserialize, Serialize};

/// One sounding note. Times are absolute MIDI ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub pitch:    u8,
    pub velocity: u8,
    pub start:    u32,
    pub duration: u32,
}

impl Note {
    pub fn new(pitch: u8, velocity: u8, start: u32, duration: u32) -> Self {
        Self { pitch, velocity, start, duration }
    }

    /// Tick at which the note stops sounding (exclusive)
    pub fn end(&self) -> u32 {
        self.start + self.duration
    }
}

/// All notes of a piece, sorted by (start, pitch).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteSequence {
    /// Pulses per quarter note from the MIDI header
    pub ticks_per_beat: u16,
    pub notes:          Vec<Note>,
}

impl NoteSequence {
    pub fn new(ticks_per_beat: u16, mut notes: Vec<Note>) -> Self {
        notes.sort_by_key(|n| (n.start, n.pitch));
        Self { ticks_per_beat, notes }
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Tick of the last note-off, 0 for an empty piece
    pub fn end_tick(&self) -> u32 {
        self.notes.iter().map(Note::end).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notes_are_sorted_on_construction() {
        let seq = NoteSequence::new(480, vec![
            Note::new(64, 80, 480, 240),
            Note::new(67, 80, 0, 480),
            Note::new(60, 80, 0, 480),
        ]);
        let order: Vec<u8> = seq.notes.iter().map(|n| n.pitch).collect();
        assert_eq!(order, vec![60, 67, 64]);
    }

    #[test]
    fn test_end_tick() {
        let seq = NoteSequence::new(480, vec![
            Note::new(60, 80, 0, 960),
            Note::new(62, 80, 480, 240),
        ]);
        assert_eq!(seq.end_tick(), 960);
        assert_eq!(NoteSequence::new(480, Vec::new()).end_tick(), 0);
    }
}
