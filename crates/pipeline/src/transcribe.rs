//! `transcribe` executor: delegates to the Remote Transcription Coordinator.
//! Most of this stage's life is spent in `running` while the remote worker
//! operates; this executor's `advance` drives one deploy-or-poll step, not
//! the whole round trip.

use chapterforge_core::{artifact, Config, StageError, StageState, Store};

use crate::coordinator::{PollStatus, RemoteTranscriptionCoordinator};
use crate::executor::{check_predecessor, Advance, StageExecutor};

pub struct TranscribeExecutor {
    pub coordinator: RemoteTranscriptionCoordinator,
}

impl StageExecutor for TranscribeExecutor {
    fn stage_name(&self) -> &'static str {
        "transcribe"
    }

    fn advance(&self, store: &Store, config: &Config, job_id: i64) -> Result<Advance, StageError> {
        let stage = store.get_stage(job_id, self.stage_name())?;
        let job = store.get_job(job_id)?;

        match stage.state {
            StageState::Success => Ok(Advance::NoOp),
            StageState::Pending | StageState::Failed => {
                if check_predecessor(store, job_id, self.stage_name()).is_err() {
                    return Ok(Advance::NoOp);
                }
                store.claim_stage(job_id, self.stage_name())?;

                let segment_stage = store.get_stage(job_id, "extract_segment")?;
                let audio_path = match segment_stage.output_path {
                    Some(p) => std::path::PathBuf::from(p),
                    None => {
                        store.fail_stage(
                            job_id,
                            self.stage_name(),
                            "extract_segment has no output_path",
                            30,
                        )?;
                        return Ok(Advance::Ran);
                    }
                };

                match self.coordinator.deploy(&audio_path, &job.ulid) {
                    Ok(()) => {
                        // Deploy accepted: stage stays `running` until Poll
                        // observes completion.
                    }
                    Err(e) => {
                        store.fail_stage(job_id, self.stage_name(), &e.to_string(), 30)?;
                    }
                }
                Ok(Advance::Ran)
            }
            StageState::Running => {
                match self.coordinator.poll(&job.ulid) {
                    Ok(PollStatus::Running) => Ok(Advance::NoOp),
                    Ok(PollStatus::Completed) => {
                        match self.coordinator.retrieve(&job.ulid) {
                            Ok(transcript) => {
                                let path = artifact::whisper_transcript_path(&config.root, &job);
                                std::fs::write(&path, transcript)?;
                                store.complete_stage(
                                    job_id,
                                    self.stage_name(),
                                    Some(&path.to_string_lossy()),
                                )?;
                            }
                            Err(e) => {
                                store.fail_stage(job_id, self.stage_name(), &e.to_string(), 30)?;
                            }
                        }
                        Ok(Advance::Ran)
                    }
                    Ok(PollStatus::Failed) => {
                        store.fail_stage(
                            job_id,
                            self.stage_name(),
                            "remote worker reported job failed",
                            120,
                        )?;
                        Ok(Advance::Ran)
                    }
                    Err(_) => {
                        // Transient poll failure: leave the stage `running`
                        // for the next poll round
                        Ok(Advance::NoOp)
                    }
                }
            }
            StageState::Blocked => Ok(Advance::NoOp),
        }
    }
}
