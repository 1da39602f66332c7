//! Deterministic per-job directory and filenames. The path
//! builder is a pure function; the one side effect (`create_dir_all`) lives
//! at Job creation, not here.

use std::path::{Path, PathBuf};

use crate::models::Job;

pub const AUDIO_FULL_NAME: &str = "audio_full";
pub const AUDIO_SEGMENT_NAME: &str = "audio_segment.mp3";
pub const WHISPER_TRANSCRIPT_NAME: &str = "whisper_transcript.txt";
pub const FORMATTED_TRANSCRIPT_NAME: &str = "formatted_transcript.txt";
pub const METADATA_NAME: &str = "metadata.json";
pub const PARAGRAPHS_NAME: &str = "paragraphs.json";
pub const FINISHED_DOCUMENT_NAME: &str = "finished_document.txt";
pub const CHAPTER_AUDIT_NAME: &str = "chapter_audit.txt";

/// `<root>/jobs/<ulid>_<id>/`
pub fn job_dir(root: &Path, job: &Job) -> PathBuf {
    root.join("jobs").join(job.dir_name())
}

/// `download_audio`'s output basename carries the source extension, so the
/// caller supplies it (e.g. `"m4a"`, `"mp3"`).
pub fn audio_full_path(root: &Path, job: &Job, ext: &str) -> PathBuf {
    job_dir(root, job).join(format!("{AUDIO_FULL_NAME}.{ext}"))
}

pub fn audio_segment_path(root: &Path, job: &Job) -> PathBuf {
    job_dir(root, job).join(AUDIO_SEGMENT_NAME)
}

pub fn whisper_transcript_path(root: &Path, job: &Job) -> PathBuf {
    job_dir(root, job).join(WHISPER_TRANSCRIPT_NAME)
}

pub fn formatted_transcript_path(root: &Path, job: &Job) -> PathBuf {
    job_dir(root, job).join(FORMATTED_TRANSCRIPT_NAME)
}

pub fn metadata_path(root: &Path, job: &Job) -> PathBuf {
    job_dir(root, job).join(METADATA_NAME)
}

pub fn paragraphs_path(root: &Path, job: &Job) -> PathBuf {
    job_dir(root, job).join(PARAGRAPHS_NAME)
}

pub fn finished_document_path(root: &Path, job: &Job) -> PathBuf {
    job_dir(root, job).join(FINISHED_DOCUMENT_NAME)
}

pub fn chapter_audit_path(root: &Path, job: &Job) -> PathBuf {
    job_dir(root, job).join(CHAPTER_AUDIT_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Job;
    use chrono::Utc;

    fn sample_job() -> Job {
        Job {
            id: 7,
            ulid: "01ARZ3NDEKTSV4RRFFQ69G5FAV".to_string(),
            recording_id: 1,
            start_seconds: 0,
            end_seconds: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn job_dir_matches_layout() {
        let job = sample_job();
        let root = Path::new("/tmp/root");
        assert_eq!(
            job_dir(root, &job),
            PathBuf::from("/tmp/root/jobs/01ARZ3NDEKTSV4RRFFQ69G5FAV_7")
        );
    }

    #[test]
    fn all_basenames_stay_inside_job_dir() {
        let job = sample_job();
        let root = Path::new("/tmp/root");
        let dir = job_dir(root, &job);
        for p in [
            audio_segment_path(root, &job),
            whisper_transcript_path(root, &job),
            formatted_transcript_path(root, &job),
            metadata_path(root, &job),
            paragraphs_path(root, &job),
            finished_document_path(root, &job),
            chapter_audit_path(root, &job),
        ] {
            assert!(p.starts_with(&dir));
        }
    }
}
