//! Remote Transcription Coordinator: Deploy/Poll/Retrieve
//! against a networked worker, correlated solely by the Job's ULID. Timeouts
//! mirror the original's 60s deploy/retrieve, 10s poll split.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use chapterforge_core::StageError;

const DEPLOY_TIMEOUT: Duration = Duration::from_secs(60);
const POLL_TIMEOUT: Duration = Duration::from_secs(10);
const RETRIEVE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, PartialEq, Eq)]
pub enum PollStatus {
    Completed,
    Running,
    Failed,
}

#[derive(Deserialize)]
struct DeployResponse {
    status: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    status: String,
}

pub struct RemoteTranscriptionCoordinator {
    client: reqwest::blocking::Client,
    base_url: String,
    whisper_model: String,
}

impl RemoteTranscriptionCoordinator {
    pub fn new(base_url: String, whisper_model: String) -> Self {
        RemoteTranscriptionCoordinator {
            client: reqwest::blocking::Client::new(),
            base_url,
            whisper_model,
        }
    }

    /// `POST <base>/new-job` with the audio file, model name, and ULID. A
    /// `200` with `{"status": "deployed"}` is the only success outcome.
    pub fn deploy(&self, audio_path: &Path, ulid: &str) -> Result<(), StageError> {
        let bytes = std::fs::read(audio_path)?;
        let file_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio_segment.mp3".to_string());
        let part = reqwest::blocking::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::blocking::multipart::Form::new()
            .part("file", part)
            .text("whisper_model", self.whisper_model.clone())
            .text("ulid_", ulid.to_string());

        let url = format!("{}/new-job", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .timeout(DEPLOY_TIMEOUT)
            .multipart(form)
            .send()
            .map_err(|e| StageError::TransientRemote(format!("deploy request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(StageError::TransientRemote(format!(
                "deploy returned status {}",
                response.status()
            )));
        }
        let body: DeployResponse = response
            .json()
            .map_err(|e| StageError::TransientRemote(format!("deploy response parse failed: {e}")))?;
        if body.status != "deployed" {
            return Err(StageError::TransientRemote(format!(
                "deploy returned unexpected status {:?}",
                body.status
            )));
        }
        Ok(())
    }

    /// `GET <base>/report-job-status/<ulid>`.
    pub fn poll(&self, ulid: &str) -> Result<PollStatus, StageError> {
        let url = format!(
            "{}/report-job-status/{}",
            self.base_url.trim_end_matches('/'),
            ulid
        );
        let response = self
            .client
            .get(&url)
            .timeout(POLL_TIMEOUT)
            .send()
            .map_err(|e| StageError::TransientRemote(format!("poll request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(StageError::TransientRemote(format!(
                "poll returned status {}",
                response.status()
            )));
        }
        let body: StatusResponse = response
            .json()
            .map_err(|e| StageError::TransientRemote(format!("poll response parse failed: {e}")))?;

        Ok(match body.status.as_str() {
            "completed" => PollStatus::Completed,
            "failed" => PollStatus::Failed,
            _ => PollStatus::Running,
        })
    }

    /// `GET <base>/retrieve-job/<ulid>` — the response body is the
    /// transcript text itself.
    pub fn retrieve(&self, ulid: &str) -> Result<String, StageError> {
        let url = format!(
            "{}/retrieve-job/{}",
            self.base_url.trim_end_matches('/'),
            ulid
        );
        let response = self
            .client
            .get(&url)
            .timeout(RETRIEVE_TIMEOUT)
            .send()
            .map_err(|e| StageError::TransientRemote(format!("retrieve request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(StageError::TransientRemote(format!(
                "retrieve returned status {}",
                response.status()
            )));
        }
        response
            .text()
            .map_err(|e| StageError::TransientRemote(format!("retrieve body read failed: {e}")))
    }
}
