//! The common per-stage executor contract: given a Job id,
//! advance its stage if eligible, otherwise no-op. The Dispatcher holds one
//! of these per stage name so the stage-name match arm exists once, at table
//! construction, not at every call site.

use chapterforge_core::{Config, StageError, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// The executor performed work and transitioned the stage.
    Ran,
    /// Preconditions were not met, or the stage was already `success`.
    NoOp,
}

pub trait StageExecutor: Send + Sync {
    fn stage_name(&self) -> &'static str;

    fn advance(&self, store: &Store, config: &Config, job_id: i64) -> Result<Advance, StageError>;
}

/// Checks the common precondition all executors but the first stage share:
/// the preceding stage must be `success`. Returns `Ok(())` when eligible,
/// `Err(PreconditionUnmet)` otherwise (callers turn this into a silent
/// no-op).
pub fn check_predecessor(store: &Store, job_id: i64, stage_name: &str) -> Result<(), StageError> {
    if let Some(prev) = chapterforge_core::stage_defs::predecessor(stage_name) {
        let prev_stage = store.get_stage(job_id, prev)?;
        if prev_stage.state != chapterforge_core::StageState::Success {
            return Err(StageError::PreconditionUnmet(format!(
                "{prev} has not succeeded for job {job_id}"
            )));
        }
    }
    Ok(())
}
