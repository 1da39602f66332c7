//! `build_chapter` executor: assembles the final document
//! from the passed paragraphs and polished metadata, falling back from the
//! primary language-model endpoint to the secondary on failure.

use std::sync::Arc;

use chapterforge_core::{artifact, Config, StageError, StageState, Store};
use chapterforge_llm::LanguageModel;
use chrono::NaiveDate;
use regex::Regex;
use serde_json::Value;

use tracing::{info, warn};

use crate::executor::{check_predecessor, Advance, StageExecutor};
use crate::paragraphs::read_paragraphs;

/// Strips literal `[...]` markers and collapses runs of blank lines.
pub fn clean_polished_text(text: &str) -> String {
    let bracket_re = Regex::new(r"\[[^\[\]]*\]").unwrap();
    let without_brackets = bracket_re.replace_all(text, "");
    let blank_run_re = Regex::new(r"\n{3,}").unwrap();
    blank_run_re
        .replace_all(without_brackets.trim(), "\n\n")
        .to_string()
}

/// `upload_date` as stored (commonly `YYYYMMDD`) formatted `DD Month, YYYY`.
/// Falls back to the raw string when it doesn't parse.
pub fn format_upload_date(upload_date: &str) -> String {
    NaiveDate::parse_from_str(upload_date, "%Y%m%d")
        .map(|d| d.format("%d %B, %Y").to_string())
        .unwrap_or_else(|_| upload_date.to_string())
}

fn submit_with_fallback(
    primary: &dyn LanguageModel,
    secondary: &dyn LanguageModel,
    prompt: &str,
) -> Result<String, StageError> {
    match primary.submit_prompt(prompt) {
        Ok(text) => Ok(text),
        Err(primary_err) => secondary.submit_prompt(prompt).map_err(|secondary_err| {
            StageError::TransientRemote(format!(
                "primary endpoint failed ({}); secondary also failed ({})",
                primary_err.message, secondary_err.message
            ))
        }),
    }
}

pub struct BuildChapterExecutor {
    pub primary: Arc<dyn LanguageModel>,
    pub secondary: Arc<dyn LanguageModel>,
}

impl StageExecutor for BuildChapterExecutor {
    fn stage_name(&self) -> &'static str {
        "build_chapter"
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
        let recording = store.get_recording(job.recording_id)?;
        let meta_path = artifact::metadata_path(&config.root, &job);
        let paragraphs_path = artifact::paragraphs_path(&config.root, &job);

        let records = read_paragraphs(&paragraphs_path)?;
        if records.iter().any(|r| r.edited.is_none()) {
            store.fail_stage(
                job_id,
                self.stage_name(),
                "not every paragraph has a non-null edited value",
                120,
            )?;
            return Ok(Advance::Ran);
        }

        let metadata: Value = if meta_path.exists() {
            serde_json::from_str(&std::fs::read_to_string(&meta_path)?)?
        } else {
            Value::Null
        };
        let get_meta = |key: &str| -> String {
            metadata.get(key).and_then(|v| v.as_str()).unwrap_or_default().to_string()
        };
        let thesis = get_meta("thesis");
        let tone = get_meta("tone");
        let outline = get_meta("outline");
        let summary = get_meta("summary");
        let title = get_meta("title");

        let concatenated: String = records
            .iter()
            .filter_map(|r| r.edited.clone())
            .collect::<Vec<_>>()
            .join("\n\n");

        let polish_prompt = format!(
            "Polish the following transcript into publication-ready prose. Thesis: {thesis}\nTone: {tone}\nOutline: {outline}\n\nText:\n{concatenated}"
        );
        let polished = match submit_with_fallback(self.primary.as_ref(), self.secondary.as_ref(), &polish_prompt) {
            Ok(text) => clean_polished_text(&text),
            Err(e) => {
                store.fail_stage(job_id, self.stage_name(), &e.to_string(), 120)?;
                return Ok(Advance::Ran);
            }
        };

        let fidelity_prompt = format!(
            "Compare the polished text to the original paragraphs and flag any meaning drift:\n\nOriginal:\n{concatenated}\n\nPolished:\n{polished}"
        );
        let readiness_prompt = format!("Assess whether this text is publication-ready:\n\n{polished}");
        // Audit prompts are advisory; failures here don't block the stage, but
        // their outputs are presented rather than thrown away.
        let fidelity_audit = submit_with_fallback(self.primary.as_ref(), self.secondary.as_ref(), &fidelity_prompt);
        let readiness_audit = submit_with_fallback(self.primary.as_ref(), self.secondary.as_ref(), &readiness_prompt);
        let audit_report = format!(
            "Fidelity audit:\n{}\n\nReadiness audit:\n{}\n",
            fidelity_audit.as_deref().unwrap_or("(audit failed)"),
            readiness_audit.as_deref().unwrap_or("(audit failed)"),
        );
        match &fidelity_audit {
            Ok(text) => info!(job_id, %text, "fidelity audit"),
            Err(e) => warn!(job_id, error = %e, "fidelity audit failed"),
        }
        match &readiness_audit {
            Ok(text) => info!(job_id, %text, "readiness audit"),
            Err(e) => warn!(job_id, error = %e, "readiness audit failed"),
        }
        let audit_path = artifact::chapter_audit_path(&config.root, &job);
        std::fs::write(&audit_path, audit_report)?;

        let upload_date = recording
            .upload_date
            .as_deref()
            .map(format_upload_date)
            .unwrap_or_default();

        let document = format!(
            "{title}\n{upload_date}\nThesis: {thesis}\nSummary: {summary}\nSermon\n{polished}\n"
        );

        let out_path = artifact::finished_document_path(&config.root, &job);
        std::fs::write(&out_path, document)?;
        store.complete_stage(job_id, self.stage_name(), Some(&out_path.to_string_lossy()))?;
        Ok(Advance::Ran)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_bracket_markers() {
        assert_eq!(clean_polished_text("Hello [pause] world."), "Hello  world.");
    }

    #[test]
    fn collapses_blank_line_runs() {
        let collapsed = clean_polished_text("para one\n\n\n\npara two");
        assert_eq!(collapsed, "para one\n\npara two");
    }

    #[test]
    fn formats_yyyymmdd_upload_date() {
        assert_eq!(format_upload_date("20240115"), "15 January, 2024");
    }

    #[test]
    fn unparseable_upload_date_passes_through() {
        assert_eq!(format_upload_date("not-a-date"), "not-a-date");
    }
}
