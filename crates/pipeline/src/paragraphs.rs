//! Shared `paragraphs.json` read-modify-write for `format_paragraphs`,
//! `edit_paragraphs`, and `evaluate_paragraphs`. Every
//! writer goes through a sibling temp file, then rename, to tolerate
//! crash-mid-write.

use std::path::Path;

use chapterforge_core::{ParagraphRecord, StageError};

/// Missing file reads as unstarted; this is the one reader in the pipeline
/// that treats absence as `Ok(vec![])` rather than an error.
pub fn read_paragraphs(path: &Path) -> Result<Vec<ParagraphRecord>, StageError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&content).map_err(StageError::from)
}

/// Writes to a temp file in the same directory as `path`, then renames over
/// it, so a crash mid-write never leaves a truncated `paragraphs.json`.
pub fn write_paragraphs(path: &Path, records: &[ParagraphRecord]) -> Result<(), StageError> {
    let dir = path.parent().ok_or_else(|| {
        StageError::Bug(format!("paragraphs path {path:?} has no parent directory"))
    })?;
    let json = serde_json::to_string_pretty(records)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    use std::io::Write;
    tmp.write_all(json.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path)
        .map_err(|e| StageError::TransientRemote(format!("failed to persist paragraphs.json: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chapterforge_core::EvaluationStatus;
    use tempfile::tempdir;

    fn sample() -> ParagraphRecord {
        ParagraphRecord {
            index: 0,
            original: "hello world".to_string(),
            prompt: "edit this".to_string(),
            edited: None,
            evaluation_status: EvaluationStatus::Pending,
            rating: None,
            critique: None,
            full_evaluation_output: None,
            regeneration_prompt: None,
        }
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("paragraphs.json");
        assert_eq!(read_paragraphs(&path).unwrap().len(), 0);
    }

    #[test]
    fn round_trips_through_atomic_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("paragraphs.json");
        write_paragraphs(&path, &[sample()]).unwrap();
        let read_back = read_paragraphs(&path).unwrap();
        assert_eq!(read_back.len(), 1);
        assert_eq!(read_back[0].original, "hello world");
    }

    #[test]
    fn file_is_always_parseable_json_after_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("paragraphs.json");
        write_paragraphs(&path, &[sample(), sample()]).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let _: serde_json::Value = serde_json::from_str(&content).unwrap();
    }
}
