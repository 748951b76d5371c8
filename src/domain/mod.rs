// ============================================================
// Layer 3 - Domain Layer
// ============================================================
// Plain Rust types describing music and tokens, plus the traits
// the outer layers implement.
//
// Rules for this layer:
//   - NO Burn framework types
//   - NO file I/O or network calls
//   - Only structs, enums and traits
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// A note event and a whole piece as a list of notes
pub mod note;

// REMI token kinds and their string form
pub mod token;

// Core abstractions (traits) that other layers implement
pub mod traits;
