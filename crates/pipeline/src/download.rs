//! `download_audio` and `extract_segment` executors. The actual download
//! tool and trim library are external collaborators; these
//! traits are the seam stage executors depend on, with a default
//! implementation shelling out to `yt-dlp` / `ffmpeg`.

use std::path::Path;
use std::process::Command;

use chapterforge_core::{artifact, Config, StageError, StageState, Store};
use serde_json::Value;
use tracing::warn;

use crate::executor::{check_predecessor, Advance, StageExecutor};

/// Video metadata fetched alongside the download, persisted onto the
/// Recording row so downstream stages (`build_chapter`'s upload date line)
/// have it.
#[derive(Debug, Default)]
pub struct VideoMetadata {
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub duration_seconds: Option<i64>,
    pub upload_date: Option<String>,
    pub description: Option<String>,
}

pub trait AudioDownloader: Send + Sync {
    /// Downloads `url` into `dest_dir`, returning the file extension of the
    /// audio it produced (e.g. `"m4a"`) and whatever video metadata could be
    /// fetched alongside it.
    fn download(&self, url: &str, dest_dir: &Path) -> Result<(String, VideoMetadata), StageError>;
}

pub trait AudioTrimmer: Send + Sync {
    /// Trims `src` to `[start_seconds, end_seconds)` (millisecond precision,
    /// inclusive-exclusive), writing the result to `dest`. `end_seconds ==
    /// 0` means "until end of audio".
    fn trim(&self, src: &Path, dest: &Path, start_seconds: i64, end_seconds: i64) -> Result<(), StageError>;
}

/// Shells out to `yt-dlp -x` to extract audio from a source URL.
pub struct YtDlpDownloader;

impl AudioDownloader for YtDlpDownloader {
    fn download(&self, url: &str, dest_dir: &Path) -> Result<(String, VideoMetadata), StageError> {
        let output_template = dest_dir.join(format!("{}.%(ext)s", artifact::AUDIO_FULL_NAME));
        let status = Command::new("yt-dlp")
            .arg("-x")
            .arg("--audio-format")
            .arg("best")
            .arg("-o")
            .arg(&output_template)
            .arg(url)
            .status()
            .map_err(|e| StageError::TransientRemote(format!("failed to spawn yt-dlp: {e}")))?;
        if !status.success() {
            return Err(StageError::TransientRemote(format!(
                "yt-dlp exited with {status}"
            )));
        }
        let ext = find_downloaded_extension(dest_dir)?;
        let metadata = fetch_video_metadata(url);
        Ok((ext, metadata))
    }
}

/// Fetches video metadata without downloading, via `yt-dlp --dump-json`. A
/// failure here is non-fatal: the audio is already on disk, so this only
/// leaves the Recording's metadata fields unset.
fn fetch_video_metadata(url: &str) -> VideoMetadata {
    let output = match Command::new("yt-dlp")
        .arg("--dump-json")
        .arg("--skip-download")
        .arg(url)
        .output()
    {
        Ok(o) if o.status.success() => o,
        Ok(o) => {
            warn!(
                status = %o.status,
                stderr = %String::from_utf8_lossy(&o.stderr),
                "yt-dlp --dump-json exited non-zero, recording metadata will be unset"
            );
            return VideoMetadata::default();
        }
        Err(e) => {
            warn!(error = %e, "failed to spawn yt-dlp --dump-json, recording metadata will be unset");
            return VideoMetadata::default();
        }
    };
    let info: Value = match serde_json::from_slice(&output.stdout) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "failed to parse yt-dlp --dump-json output");
            return VideoMetadata::default();
        }
    };
    VideoMetadata {
        title: info.get("title").and_then(Value::as_str).map(str::to_string),
        uploader: info.get("uploader").and_then(Value::as_str).map(str::to_string),
        duration_seconds: info.get("duration").and_then(Value::as_i64),
        upload_date: info.get("upload_date").and_then(Value::as_str).map(str::to_string),
        description: info.get("description").and_then(Value::as_str).map(str::to_string),
    }
}

fn find_downloaded_extension(dest_dir: &Path) -> Result<String, StageError> {
    let prefix = format!("{}.", artifact::AUDIO_FULL_NAME);
    for entry in std::fs::read_dir(dest_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(ext) = name.strip_prefix(&prefix) {
            return Ok(ext.to_string());
        }
    }
    Err(StageError::TransientRemote(
        "yt-dlp did not produce an audio_full.* file".to_string(),
    ))
}

/// Shells out to `ffmpeg` to trim the full audio to the Job's time window.
pub struct FfmpegTrimmer;

impl AudioTrimmer for FfmpegTrimmer {
    fn trim(&self, src: &Path, dest: &Path, start_seconds: i64, end_seconds: i64) -> Result<(), StageError> {
        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-y")
            .arg("-i")
            .arg(src)
            .arg("-ss")
            .arg(start_seconds.to_string());
        if end_seconds > 0 {
            cmd.arg("-to").arg(end_seconds.to_string());
        }
        let status = cmd
            .arg(dest)
            .status()
            .map_err(|e| StageError::TransientRemote(format!("failed to spawn ffmpeg: {e}")))?;
        if !status.success() {
            return Err(StageError::TransientRemote(format!(
                "ffmpeg exited with {status}"
            )));
        }
        Ok(())
    }
}

pub struct DownloadAudioExecutor {
    pub downloader: Box<dyn AudioDownloader>,
}

impl StageExecutor for DownloadAudioExecutor {
    fn stage_name(&self) -> &'static str {
        "download_audio"
    }

    fn advance(&self, store: &Store, config: &Config, job_id: i64) -> Result<Advance, StageError> {
        let stage = store.get_stage(job_id, self.stage_name())?;
        if stage.state == StageState::Success {
            return Ok(Advance::NoOp);
        }
        store.claim_stage(job_id, self.stage_name())?;

        let (job, recording) = store.get_job_with_recording(job_id)?;
        let dir = artifact::job_dir(&config.root, &job);
        std::fs::create_dir_all(&dir)?;

        match self.downloader.download(&recording.webpage_url, &dir) {
            Ok((ext, metadata)) => {
                store.update_recording_metadata(
                    recording.id,
                    metadata.title.as_deref(),
                    metadata.uploader.as_deref(),
                    metadata.duration_seconds,
                    metadata.upload_date.as_deref(),
                    metadata.description.as_deref(),
                )?;
                let path = artifact::audio_full_path(&config.root, &job, &ext);
                store.complete_stage(job_id, self.stage_name(), Some(&path.to_string_lossy()))?;
            }
            Err(e) => {
                store.fail_stage(job_id, self.stage_name(), &e.to_string(), 30)?;
            }
        }
        Ok(Advance::Ran)
    }
}

/// Deletes the full-length audio once its trimmed segment is safe on disk.
/// Shells out to `shred -uz` to overwrite before unlinking; falls back to a
/// plain `remove_file` (logged as such) when `shred` isn't on `PATH`.
fn secure_delete_file(path: &Path) {
    if !path.exists() {
        return;
    }
    match Command::new("shred").arg("-uz").arg(path).status() {
        Ok(status) if status.success() => {}
        Ok(status) => warn!(?path, %status, "shred exited non-zero deleting full audio"),
        Err(_) => match std::fs::remove_file(path) {
            Ok(()) => warn!(?path, "shred not found, deleted full audio with a plain remove_file"),
            Err(e) => warn!(?path, error = %e, "failed to delete full audio after segment extraction"),
        },
    }
}

pub struct ExtractSegmentExecutor {
    pub trimmer: Box<dyn AudioTrimmer>,
}

impl StageExecutor for ExtractSegmentExecutor {
    fn stage_name(&self) -> &'static str {
        "extract_segment"
    }

    fn advance(&self, store: &Store, config: &Config, job_id: i64) -> Result<Advance, StageError> {
        let stage = store.get_stage(job_id, self.stage_name())?;
        if stage.state == StageState::Success {
            return Ok(Advance::NoOp);
        }
        if check_predecessor(store, job_id, self.stage_name()).is_err() {
            return Ok(Advance::NoOp);
        }
        store.claim_stage(job_id, self.stage_name())?;

        let job = store.get_job(job_id)?;
        let download_stage = store.get_stage(job_id, "download_audio")?;
        let src = match download_stage.output_path {
            Some(p) => std::path::PathBuf::from(p),
            None => {
                store.fail_stage(
                    job_id,
                    self.stage_name(),
                    "download_audio has no output_path",
                    30,
                )?;
                return Ok(Advance::Ran);
            }
        };
        let dest = artifact::audio_segment_path(&config.root, &job);

        match self.trimmer.trim(&src, &dest, job.start_seconds, job.end_seconds) {
            Ok(()) => {
                secure_delete_file(&src);
                store.complete_stage(job_id, self.stage_name(), Some(&dest.to_string_lossy()))?;
            }
            Err(e) => {
                store.fail_stage(job_id, self.stage_name(), &e.to_string(), 30)?;
            }
        }
        Ok(Advance::Ran)
    }
}
