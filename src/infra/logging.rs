// ============================================================
// Layer 6 - Logging
// ============================================================
// Installs the global tracing subscriber once at process start.
//
// Two sinks receive the same events:
//   - stdout, human readable
//   - an append-only log file (no ANSI colours), so a run that
//     dies still leaves its history behind
//
// The level comes from RUST_LOG when set, otherwise
// `midi_pretrain=info`.

use anyhow::{Context, Result};
use std::{fs::OpenOptions, path::Path, sync::Mutex};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init(log_file: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("Cannot open log file '{}'", log_file.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("midi_pretrain=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .try_init()
        .context("Logging was already initialised")?;

    Ok(())
}
