// ============================================================
// Layer 2 - Music metrics report
// ============================================================
// Scores one MIDI file, or every file under a directory, and
// renders the result as JSON for the CLI to print.

use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::data::{
    music_metrics::{compute_music_metrics, MusicMetrics},
    splitter::collect_midi_paths,
};

#[derive(Debug, Clone, Serialize)]
pub struct FileMetrics {
    pub path:    PathBuf,
    #[serde(flatten)]
    pub metrics: MusicMetrics,
}

/// Metrics for `path`, or for every `*.mid` beneath it when it is a directory.
pub fn evaluate(path: &Path) -> Result<Vec<FileMetrics>> {
    let files = if path.is_dir() {
        collect_midi_paths(path)?
    } else {
        vec![path.to_path_buf()]
    };

    files
        .into_iter()
        .map(|p| {
            let metrics = compute_music_metrics(&p)?;
            Ok(FileMetrics { path: p, metrics })
        })
        .collect()
}

pub fn to_json(report: &[FileMetrics]) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::note::{Note, NoteSequence};
    use crate::infra::midi_io;
    use tempfile::tempdir;

    #[test]
    fn test_directory_report_has_one_entry_per_file() {
        let tmp  = tempdir().unwrap();
        let song = NoteSequence::new(480, vec![Note::new(60, 90, 0, 480), Note::new(67, 90, 0, 480)]);
        midi_io::write_notes(&song, &tmp.path().join("a.mid")).unwrap();
        midi_io::write_notes(&song, &tmp.path().join("b.mid")).unwrap();

        let report = evaluate(tmp.path()).unwrap();
        assert_eq!(report.len(), 2);

        let json: serde_json::Value = serde_json::from_str(&to_json(&report).unwrap()).unwrap();
        assert_eq!(json[0]["pitch_range"], 7);
        assert_eq!(json[1]["n_pitches_used"], 2);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(evaluate(Path::new("does/not/exist.mid")).is_err());
    }
}
