use std::sync::{Arc, Mutex};

use chapterforge_core::{Config, StageState, Store};
use chapterforge_llm::{LanguageModel, LmError, LmErrorKind, LmResult};
use chapterforge_pipeline::executor::StageExecutor;
use chapterforge_pipeline::ingest::ingest;
use chapterforge_pipeline::metadata::ExtractMetadataExecutor;
use tempfile::tempdir;

/// A language model whose replies are scripted per call, in order. Lets
/// tests drive quota-exhaustion and regeneration scenarios without a
/// network.
struct ScriptedLm {
    replies: Mutex<Vec<LmResult>>,
}

impl ScriptedLm {
    fn new(replies: Vec<LmResult>) -> Self {
        ScriptedLm {
            replies: Mutex::new(replies),
        }
    }
}

impl LanguageModel for ScriptedLm {
    fn submit_prompt(&self, _prompt: &str) -> LmResult {
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Ok("stub reply".to_string());
        }
        replies.remove(0)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

fn setup_through_format_paragraphs(store: &Store, config: &Config) -> i64 {
    let job = ingest(store, "https://example/v/AAAAAAAAAAA", 60, 120).unwrap();
    let dir = chapterforge_core::artifact::job_dir(&config.root, &job);
    std::fs::create_dir_all(&dir).unwrap();

    for stage in ["download_audio", "extract_segment", "transcribe"] {
        store.claim_stage(job.id, stage).unwrap();
        store.complete_stage(job.id, stage, Some("/dev/null")).unwrap();
    }

    let formatted_path = chapterforge_core::artifact::formatted_transcript_path(&config.root, &job);
    std::fs::write(&formatted_path, "The transcript body.").unwrap();
    store.claim_stage(job.id, "format_paragraphs").unwrap();
    store
        .complete_stage(job.id, "format_paragraphs", Some(&formatted_path.to_string_lossy()))
        .unwrap();

    job.id
}

#[test]
fn quota_exhaustion_halts_metadata_extraction_and_preserves_filled_categories() {
    let dir = tempdir().unwrap();
    let config = Config::for_root(dir.path().to_path_buf());
    let store = Store::open_in_memory().unwrap();
    let job_id = setup_through_format_paragraphs(&store, &config);

    // title succeeds, then thesis's three drafts succeed but the decision
    // call hits quota.
    let lm = ScriptedLm::new(vec![
        Ok("A Generated Title".to_string()),
        Ok("draft one".to_string()),
        Ok("draft two".to_string()),
        Ok("draft three".to_string()),
        Err(LmError::new(LmErrorKind::Quota, "quota exceeded for today")),
    ]);
    let executor = ExtractMetadataExecutor { lm: Arc::new(lm) };

    let result = executor.advance(&store, &config, job_id);
    assert!(matches!(result, Err(chapterforge_core::StageError::QuotaExhausted(_))));

    let meta_path = chapterforge_core::artifact::metadata_path(&config.root, &store.get_job(job_id).unwrap());
    let metadata: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&meta_path).unwrap()).unwrap();
    assert_eq!(metadata["title"], "A Generated Title");
    assert!(metadata.get("thesis").is_none());

    let stage = store.get_stage(job_id, "extract_metadata").unwrap();
    assert_eq!(stage.state, StageState::Failed);
}

#[test]
fn non_quota_category_failure_is_marked_and_loop_continues() {
    let dir = tempdir().unwrap();
    let config = Config::for_root(dir.path().to_path_buf());
    let store = Store::open_in_memory().unwrap();
    let job_id = setup_through_format_paragraphs(&store, &config);

    let lm = ScriptedLm::new(vec![
        Err(LmError::new(LmErrorKind::Transport, "connection reset")),
        Ok("a fine thesis".to_string()),
        Ok("a fine thesis".to_string()),
        Ok("a fine thesis".to_string()),
        Ok("the best one".to_string()),
        Ok("a summary".to_string()),
        Ok("an outline".to_string()),
        Ok("neutral".to_string()),
        Ok("full text".to_string()),
    ]);
    let executor = ExtractMetadataExecutor { lm: Arc::new(lm) };
    executor.advance(&store, &config, job_id).unwrap();

    let meta_path = chapterforge_core::artifact::metadata_path(&config.root, &store.get_job(job_id).unwrap());
    let metadata: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&meta_path).unwrap()).unwrap();
    assert!(metadata["title"].as_str().unwrap().starts_with("ERROR:"));

    let stage = store.get_stage(job_id, "extract_metadata").unwrap();
    assert_eq!(stage.state, StageState::Failed);
}
