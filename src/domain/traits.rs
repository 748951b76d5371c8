// ============================================================
// Layer 3 - Core Traits (Abstractions)
// ============================================================
// The acquisition step talks to the network through a trait so
// the "skip if already present" and "exactly one download"
// rules can be tested without touching the network.
//
// Implementations:
//   - HttpFetcher (data::acquisition) -> reqwest blocking client
//   - test doubles that write a local zip and count calls
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;
use std::path::Path;

// ─── CorpusFetcher ────────────────────────────────────────────────────────────
/// Anything that can download a remote archive to a local file.
pub trait CorpusFetcher {
    /// Download `url` and write the body to `dest`, replacing it.
    fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}
