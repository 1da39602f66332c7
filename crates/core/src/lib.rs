pub mod artifact;
pub mod config;
pub mod error;
pub mod models;
pub mod stage_defs;
pub mod store;

pub use config::Config;
pub use error::StageError;
pub use models::{EvaluationStatus, Job, ParagraphRecord, Recording, Stage, StageState};
pub use stage_defs::{stage_def, StageDef, STAGE_CATALOG};
pub use store::Store;

use std::fs;
use std::path::Path;

/// Creates the project root, the `jobs/` and `logs/` subdirectories, and the
/// SQLite database, returning an opened `Store`.
pub fn init_project(root: &Path) -> Result<Store, StageError> {
    fs::create_dir_all(root.join("jobs"))?;
    fs::create_dir_all(root.join("logs"))?;
    Store::open(&root.join("chapterforge.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn init_project_creates_layout_and_opens_store() {
        let dir = tempdir().unwrap();
        let store = init_project(dir.path()).unwrap();
        assert!(dir.path().join("jobs").is_dir());
        assert!(dir.path().join("logs").is_dir());
        let rec = store.get_or_create_recording("x", "u").unwrap();
        assert_eq!(rec.source_id, "x");
    }
}
