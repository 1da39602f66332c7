//! Entity types for the persistence store: `Recording`, `Job`, `Stage`, and
//! the `StageState` enum from the data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum StageState {
    Pending,
    Running,
    Blocked,
    Success,
    Failed,
}

impl StageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageState::Pending => "pending",
            StageState::Running => "running",
            StageState::Blocked => "blocked",
            StageState::Success => "success",
            StageState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(StageState::Pending),
            "running" => Some(StageState::Running),
            "blocked" => Some(StageState::Blocked),
            "success" => Some(StageState::Success),
            "failed" => Some(StageState::Failed),
            _ => None,
        }
    }
}

/// Metadata about a source media item. Created once per distinct source id,
/// never mutated after creation apart from the optional refresh fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    pub id: i64,
    pub source_id: String,
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub duration_seconds: Option<i64>,
    pub upload_date: Option<String>,
    pub webpage_url: String,
    pub description: Option<String>,
    pub channel_id: Option<String>,
    pub channel_url: Option<String>,
    pub thumbnail: Option<String>,
    pub was_live: Option<bool>,
    pub live_status: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One processing run of a Recording over `[start_seconds, end_seconds)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub ulid: String,
    pub recording_id: i64,
    pub start_seconds: i64,
    pub end_seconds: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// `<ulid>_<id>`, the directory-name component from the artifact layout.
    pub fn dir_name(&self) -> String {
        format!("{}_{}", self.ulid, self.id)
    }
}

/// The execution record of one named phase of one Job. `(job_id, stage_name)`
/// is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    pub id: i64,
    pub job_id: i64,
    pub stage_name: String,
    pub state: StageState,
    pub attempt_count: i64,
    pub last_error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub next_eligible_at: Option<DateTime<Utc>>,
    pub output_path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationStatus {
    Pending,
    Passed,
    Failed,
    Regenerated,
}

impl EvaluationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationStatus::Pending => "pending",
            EvaluationStatus::Passed => "passed",
            EvaluationStatus::Failed => "failed",
            EvaluationStatus::Regenerated => "regenerated",
        }
    }
}

impl Default for EvaluationStatus {
    fn default() -> Self {
        EvaluationStatus::Pending
    }
}

/// One entry of `paragraphs.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParagraphRecord {
    pub index: u32,
    pub original: String,
    pub prompt: String,
    pub edited: Option<String>,
    #[serde(default)]
    pub evaluation_status: EvaluationStatus,
    #[serde(default)]
    pub rating: Option<i64>,
    #[serde(default)]
    pub critique: Option<String>,
    #[serde(default)]
    pub full_evaluation_output: Option<String>,
    #[serde(default)]
    pub regeneration_prompt: Option<String>,
}

impl ParagraphRecord {
    /// `edited` is null or holds an error marker string.
    pub fn needs_edit(&self) -> bool {
        match &self.edited {
            None => true,
            Some(text) => text.starts_with("ERROR:"),
        }
    }
}

/// Metadata artifact categories, in the fixed generation order.
pub const METADATA_CATEGORIES: [&str; 6] =
    ["title", "thesis", "summary", "outline", "tone", "main_text"];
