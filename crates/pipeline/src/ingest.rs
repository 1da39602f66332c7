//! Ingestion entry point: creates a Recording (if
//! not already present for that source id) and a Job with all Stage records
//! in `pending`.

use chapterforge_core::{Job, StageError, Store};

/// The last non-empty path segment of a URL, used as the source identifier
/// recordings are deduplicated on.
pub fn source_id_from_url(url: &str) -> Result<String, StageError> {
    url.trim_end_matches('/')
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .map(|s| s.to_string())
        .ok_or_else(|| StageError::PreconditionUnmet(format!("could not parse a source id from {url}")))
}

pub fn ingest(store: &Store, url: &str, start_seconds: i64, end_seconds: i64) -> Result<Job, StageError> {
    let source_id = source_id_from_url(url)?;
    let recording = store.get_or_create_recording(&source_id, url)?;
    store.create_job(recording.id, start_seconds, end_seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_trailing_path_segment() {
        assert_eq!(
            source_id_from_url("https://example/v/AAAAAAAAAAA").unwrap(),
            "AAAAAAAAAAA"
        );
    }

    #[test]
    fn tolerates_trailing_slash() {
        assert_eq!(
            source_id_from_url("https://example/v/AAAAAAAAAAA/").unwrap(),
            "AAAAAAAAAAA"
        );
    }

    #[test]
    fn ingest_creates_recording_and_job_with_pending_stages() {
        let store = Store::open_in_memory().unwrap();
        let job = ingest(&store, "https://example/v/AAAAAAAAAAA", 60, 120).unwrap();
        let stages = store.list_stages_for_job(job.id).unwrap();
        assert_eq!(stages.len(), chapterforge_core::STAGE_CATALOG.len());
    }
}
