// ============================================================
// Layer 3 - REMI Tokens
// ============================================================
// REMI ("REvamped MIDI") describes music as a flat stream of
// events. Each bar opens with a `Bar` token, each onset inside
// the bar with a `Position` token, and each note is the triple
// `Pitch`, `Velocity`, `Duration`.
//
// Example (one bar, a C major triad on beat 1 then an E):
//   Bar_None
//   Position_0  Pitch_60 Velocity_80 Duration_1.0.8
//               Pitch_64 Velocity_80 Duration_1.0.8
//               Pitch_67 Velocity_80 Duration_1.0.8
//   Position_8  Pitch_64 Velocity_80 Duration_2.0.8
//
// The string form matches the naming used by REMI vocabularies
// elsewhere so dumped token files stay readable.
//
// Reference: Huang & Yang (2020) Pop Music Transformer

use std::fmt;

/// Positions (sub-beat steps) per beat; also the duration resolution.
pub const POSITIONS_PER_BEAT: u32 = 8;

/// Bars are assumed to be 4/4.
pub const BEATS_PER_BAR: u32 = 4;

pub const POSITIONS_PER_BAR: u32 = POSITIONS_PER_BEAT * BEATS_PER_BAR;

/// Special tokens, in vocabulary order (PAD must stay at id 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Special {
    Pad,
    Bos,
    Eos,
    Mask,
}

impl Special {
    pub const ALL: [Special; 4] = [Special::Pad, Special::Bos, Special::Eos, Special::Mask];

    fn name(self) -> &'static str {
        match self {
            Special::Pad  => "PAD",
            Special::Bos  => "BOS",
            Special::Eos  => "EOS",
            Special::Mask => "MASK",
        }
    }
}

/// One entry of the REMI vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemiToken {
    Special(Special),
    Bar,
    /// Onset inside the bar, `0..POSITIONS_PER_BAR`
    Position(u32),
    /// MIDI key number
    Pitch(u8),
    /// Quantized velocity bin value
    Velocity(u8),
    /// Length in positions (1/8 beat units)
    Duration(u32),
}

impl fmt::Display for RemiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemiToken::Special(s)  => write!(f, "{}_None", s.name()),
            RemiToken::Bar         => write!(f, "Bar_None"),
            RemiToken::Position(p) => write!(f, "Position_{p}"),
            RemiToken::Pitch(p)    => write!(f, "Pitch_{p}"),
            RemiToken::Velocity(v) => write!(f, "Velocity_{v}"),
            RemiToken::Duration(d) => write!(
                f,
                "Duration_{}.{}.{}",
                d / POSITIONS_PER_BEAT,
                d % POSITIONS_PER_BEAT,
                POSITIONS_PER_BEAT
            ),
        }
    }
}
