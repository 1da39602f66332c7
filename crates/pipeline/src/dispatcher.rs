//! The Dispatcher: the three entry points the CLI calls to move Jobs through
//! their Stages. The stage-name match arm exists once, in `build_executors`,
//! not at every call site.

use std::collections::HashMap;
use std::sync::Arc;

use chapterforge_core::{Config, StageError, Store};
use chapterforge_llm::{GeminiClient, LanguageModel, OllamaClient};
use tracing::{error, info, info_span, warn};

use crate::chapter::BuildChapterExecutor;
use crate::coordinator::RemoteTranscriptionCoordinator;
use crate::download::{DownloadAudioExecutor, ExtractSegmentExecutor, FfmpegTrimmer, YtDlpDownloader};
use crate::edit::EditParagraphsExecutor;
use crate::evaluate::EvaluateParagraphsExecutor;
use crate::executor::{Advance, StageExecutor};
use crate::format_paragraphs::FormatParagraphsExecutor;
use crate::metadata::ExtractMetadataExecutor;
use crate::transcribe::TranscribeExecutor;

pub struct Dispatcher {
    store: Arc<Store>,
    config: Config,
    executors: HashMap<&'static str, Box<dyn StageExecutor>>,
}

fn build_executors(config: &Config) -> HashMap<&'static str, Box<dyn StageExecutor>> {
    let primary: Arc<dyn LanguageModel> = Arc::new(
        GeminiClient::new(config.gemini_api_key.clone().unwrap_or_default()),
    );
    let secondary: Arc<dyn LanguageModel> = Arc::new(OllamaClient::new(config.ollama_url.clone()));
    let coordinator = RemoteTranscriptionCoordinator::new(
        config.worker_url.clone(),
        config.whisper_model.clone(),
    );

    let mut executors: HashMap<&'static str, Box<dyn StageExecutor>> = HashMap::new();
    executors.insert(
        "download_audio",
        Box::new(DownloadAudioExecutor {
            downloader: Box::new(YtDlpDownloader),
        }),
    );
    executors.insert(
        "extract_segment",
        Box::new(ExtractSegmentExecutor {
            trimmer: Box::new(FfmpegTrimmer),
        }),
    );
    executors.insert("transcribe", Box::new(TranscribeExecutor { coordinator }));
    executors.insert(
        "format_paragraphs",
        Box::new(FormatParagraphsExecutor {
            lm: secondary.clone(),
        }),
    );
    executors.insert(
        "extract_metadata",
        Box::new(ExtractMetadataExecutor { lm: primary.clone() }),
    );
    executors.insert(
        "edit_paragraphs",
        Box::new(EditParagraphsExecutor {
            lm: secondary.clone(),
        }),
    );
    executors.insert(
        "evaluate_paragraphs",
        Box::new(EvaluateParagraphsExecutor {
            lm: secondary.clone(),
        }),
    );
    executors.insert(
        "build_chapter",
        Box::new(BuildChapterExecutor { primary, secondary }),
    );
    executors
}

impl Dispatcher {
    pub fn new(store: Arc<Store>, config: Config) -> Self {
        let executors = build_executors(&config);
        Dispatcher {
            store,
            config,
            executors,
        }
    }

    /// Builds a Dispatcher against a caller-supplied executor table instead
    /// of the concrete network-backed clients — for tests that need to
    /// script stage behavior without a language-model endpoint or remote
    /// worker.
    pub fn with_executors(
        store: Arc<Store>,
        config: Config,
        executors: HashMap<&'static str, Box<dyn StageExecutor>>,
    ) -> Self {
        Dispatcher {
            store,
            config,
            executors,
        }
    }

    /// Reclaims Stages abandoned by a crashed prior process. Call once at
    /// startup, before any `list_eligible`/`advance_one`/`advance_all` call.
    pub fn reclaim_abandoned(&self) -> Result<usize, StageError> {
        self.store.reclaim_abandoned()
    }

    pub fn list_eligible(&self, stage: &str) -> Result<Vec<i64>, StageError> {
        self.store.list_eligible(stage)
    }

    /// Runs one executor call for `(job_id, stage)`.
    pub fn advance_one(&self, job_id: i64, stage: &str) -> Result<Advance, StageError> {
        let executor = self
            .executors
            .get(stage)
            .ok_or_else(|| StageError::Bug(format!("no executor registered for stage {stage}")))?;

        let span = info_span!("advance_one", job_id, stage);
        let _enter = span.enter();
        info!("advancing stage");

        match executor.advance(&self.store, &self.config, job_id) {
            Ok(advance) => Ok(advance),
            Err(e) => {
                warn!(error = %e, "stage executor returned an error");
                Err(e)
            }
        }
    }

    /// Loops over eligible Jobs for `stage`. Halts immediately on a
    /// `QuotaExhausted` signal; any other failure just moves on to the next
    /// Job.
    pub fn advance_all(&self, stage: &str) -> Result<usize, StageError> {
        let job_ids = self.list_eligible(stage)?;
        let mut advanced = 0;
        for job_id in job_ids {
            match self.advance_one(job_id, stage) {
                Ok(Advance::Ran) => advanced += 1,
                Ok(Advance::NoOp) => {}
                Err(e) if e.halts_batch() => {
                    error!(job_id, stage, error = %e, "halting batch");
                    return Err(e);
                }
                Err(e) => {
                    error!(job_id, stage, error = %e, "stage failed, continuing to next job");
                }
            }
        }
        Ok(advanced)
    }
}
