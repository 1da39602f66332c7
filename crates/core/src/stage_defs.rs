//! The static, build-time-known stage catalog. Adding a
//! stage means adding a row here, not a configuration change.

#[derive(Debug, Clone, Copy)]
pub struct StageDef {
    pub name: &'static str,
    pub depends_on: Option<&'static str>,
    pub auto_retry: bool,
    pub max_attempts: u32,
}

pub const STAGE_CATALOG: &[StageDef] = &[
    StageDef {
        name: "download_audio",
        depends_on: None,
        auto_retry: true,
        max_attempts: 5,
    },
    StageDef {
        name: "extract_segment",
        depends_on: Some("download_audio"),
        auto_retry: true,
        max_attempts: 5,
    },
    StageDef {
        name: "transcribe",
        depends_on: Some("extract_segment"),
        auto_retry: true,
        max_attempts: 5,
    },
    StageDef {
        name: "format_paragraphs",
        depends_on: Some("transcribe"),
        auto_retry: true,
        max_attempts: 5,
    },
    StageDef {
        name: "extract_metadata",
        depends_on: Some("format_paragraphs"),
        auto_retry: true,
        max_attempts: 5,
    },
    StageDef {
        name: "edit_paragraphs",
        depends_on: Some("extract_metadata"),
        auto_retry: true,
        max_attempts: 5,
    },
    StageDef {
        name: "evaluate_paragraphs",
        depends_on: Some("edit_paragraphs"),
        auto_retry: true,
        max_attempts: 5,
    },
    StageDef {
        name: "build_chapter",
        depends_on: Some("evaluate_paragraphs"),
        auto_retry: false,
        max_attempts: 1,
    },
];

pub fn stage_def(name: &str) -> Option<&'static StageDef> {
    STAGE_CATALOG.iter().find(|s| s.name == name)
}

/// The stage immediately preceding `name` in catalog order, if any.
pub fn predecessor(name: &str) -> Option<&'static str> {
    stage_def(name).and_then(|s| s.depends_on)
}

/// Backoff schedule for `failed` stages, indexed by attempt count (capped at
/// the last entry): `{0, 30s, 2min, 10min, 1h}`.
pub const BACKOFF_SCHEDULE_SECS: [i64; 5] = [0, 30, 120, 600, 3600];

pub fn backoff_seconds(attempt_count: i64) -> i64 {
    let idx = (attempt_count.max(0) as usize).min(BACKOFF_SCHEDULE_SECS.len() - 1);
    BACKOFF_SCHEDULE_SECS[idx]
}
