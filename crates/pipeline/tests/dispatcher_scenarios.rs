use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chapterforge_core::{Config, StageError, StageState, Store};
use chapterforge_pipeline::executor::{Advance, StageExecutor};
use chapterforge_pipeline::ingest::ingest;
use chapterforge_pipeline::Dispatcher;
use tempfile::tempdir;

/// An executor whose outcome is scripted per `(call index)`, letting a test
/// drive the Dispatcher's quota-halt branch without a real language model.
struct ScriptedExecutor {
    stage: &'static str,
    outcomes: Mutex<Vec<Result<Advance, StageError>>>,
}

impl StageExecutor for ScriptedExecutor {
    fn stage_name(&self) -> &'static str {
        self.stage
    }

    fn advance(&self, _store: &Store, _config: &Config, _job_id: i64) -> Result<Advance, StageError> {
        let mut outcomes = self.outcomes.lock().unwrap();
        if outcomes.is_empty() {
            return Ok(Advance::NoOp);
        }
        outcomes.remove(0)
    }
}

#[test]
fn advance_all_halts_on_quota_and_leaves_later_jobs_untouched() {
    let dir = tempdir().unwrap();
    let config = Config::for_root(dir.path().to_path_buf());
    let store = Arc::new(Store::open_in_memory().unwrap());

    let first = ingest(&store, "https://example/v/AAAAAAAAAAA", 0, 0).unwrap();
    let second = ingest(&store, "https://example/v/BBBBBBBBBBB", 0, 0).unwrap();

    let mut executors: HashMap<&'static str, Box<dyn StageExecutor>> = HashMap::new();
    executors.insert(
        "download_audio",
        Box::new(ScriptedExecutor {
            stage: "download_audio",
            outcomes: Mutex::new(vec![
                Err(StageError::QuotaExhausted("quota exceeded for today".to_string())),
                Ok(Advance::Ran),
            ]),
        }),
    );

    let dispatcher = Dispatcher::with_executors(store.clone(), config, executors);
    let result = dispatcher.advance_all("download_audio");
    assert!(matches!(result, Err(StageError::QuotaExhausted(_))));

    // Only the first Job was touched; the second Job's stage is untouched
    // because the batch halted before reaching it.
    let first_stage = store.get_stage(first.id, "download_audio").unwrap();
    let second_stage = store.get_stage(second.id, "download_audio").unwrap();
    assert_eq!(second_stage.state, StageState::Pending);
    assert_eq!(second_stage.attempt_count, 0);
    // The scripted executor is a stand-in for the real one; it doesn't
    // itself transition state, so only call-order is asserted here.
    let _ = first_stage;
}
