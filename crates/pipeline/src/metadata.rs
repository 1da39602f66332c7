//! `extract_metadata` executor: fills `metadata.json`'s six
//! categories, one language-model prompt per category, with a triple-draft
//! consensus for `thesis` and a quota-exceeded halt signal.

use std::collections::HashMap;
use std::sync::Arc;

use chapterforge_core::{artifact, Config, StageError, StageState, Store, METADATA_CATEGORIES};
use chapterforge_llm::LanguageModel;
use serde_json::Value;

use crate::executor::{check_predecessor, Advance, StageExecutor};

const ERROR_MARKER_PREFIX: &str = "ERROR:";

pub fn is_error_marker(value: &Value) -> bool {
    value
        .as_str()
        .map(|s| s.starts_with(ERROR_MARKER_PREFIX))
        .unwrap_or(false)
}

fn thesis_prompt(transcript: &str) -> String {
    format!("State the central thesis of this transcript in one sentence:\n\n{transcript}")
}

/// Looks up the language-model prompt for a metadata category. `other`
/// firing means `METADATA_CATEGORIES` grew a category this function wasn't
/// updated for — a programmer error, reported as `StageError::Bug` rather
/// than a panic so the Dispatcher can record it and move on.
fn category_prompt(category: &str, transcript: &str) -> Result<String, StageError> {
    match category {
        "title" => Ok(format!("Suggest a concise title for this transcript:\n\n{transcript}")),
        "thesis" => Ok(thesis_prompt(transcript)),
        "summary" => Ok(format!("Summarize this transcript in a short paragraph:\n\n{transcript}")),
        "outline" => Ok(format!("Produce a bullet-point outline of this transcript:\n\n{transcript}")),
        "tone" => Ok(format!("Describe the speaker's tone in one word:\n\n{transcript}")),
        "main_text" => Ok(format!(
            "Reproduce the following sermon text verbatim, correcting only obvious transcription errors and leaving the wording otherwise untouched:\n\n{transcript}"
        )),
        other => Err(StageError::Bug(format!(
            "no prompt builder registered for metadata category {other:?}"
        ))),
    }
}

/// Three independent drafts, then a decision prompt picks the best.
fn generate_thesis_with_consensus(
    lm: &dyn LanguageModel,
    transcript: &str,
) -> Result<String, chapterforge_llm::LmError> {
    let prompt = thesis_prompt(transcript);
    let mut drafts = Vec::with_capacity(3);
    for _ in 0..3 {
        drafts.push(lm.submit_prompt(&prompt)?);
    }
    let decision_prompt = format!(
        "Here are three candidate thesis statements. Reply with only the single best one, verbatim.\n\n1) {}\n\n2) {}\n\n3) {}",
        drafts[0], drafts[1], drafts[2]
    );
    lm.submit_prompt(&decision_prompt)
}

pub struct ExtractMetadataExecutor {
    pub lm: Arc<dyn LanguageModel>,
}

impl StageExecutor for ExtractMetadataExecutor {
    fn stage_name(&self) -> &'static str {
        "extract_metadata"
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
        let format_stage = store.get_stage(job_id, "format_paragraphs")?;
        let transcript_path = match format_stage.output_path {
            Some(p) => std::path::PathBuf::from(p),
            None => {
                store.fail_stage(
                    job_id,
                    self.stage_name(),
                    "format_paragraphs has no output_path",
                    30,
                )?;
                return Ok(Advance::Ran);
            }
        };
        let transcript = std::fs::read_to_string(&transcript_path)?;

        let meta_path = artifact::metadata_path(&config.root, &job);
        let mut metadata: HashMap<String, Value> = if meta_path.exists() {
            let content = std::fs::read_to_string(&meta_path)?;
            serde_json::from_str(&content)?
        } else {
            HashMap::new()
        };

        for category in METADATA_CATEGORIES {
            let present = metadata
                .get(category)
                .map(|v| !v.is_null() && !is_error_marker(v))
                .unwrap_or(false);
            if present {
                continue;
            }

            let result = if category == "thesis" {
                generate_thesis_with_consensus(self.lm.as_ref(), &transcript)
            } else {
                let prompt = match category_prompt(category, &transcript) {
                    Ok(p) => p,
                    Err(e) => {
                        std::fs::write(&meta_path, serde_json::to_string_pretty(&metadata)?)?;
                        store.fail_stage(job_id, self.stage_name(), &e.to_string(), 120)?;
                        return Err(e);
                    }
                };
                self.lm.submit_prompt(&prompt)
            };

            match result {
                Ok(text) => {
                    metadata.insert(category.to_string(), Value::String(text));
                }
                Err(e) if e.is_quota() => {
                    // Halt the whole categories loop, leaving already-filled
                    // categories intact, and surface QuotaExhausted so the
                    // Dispatcher halts the batch.
                    std::fs::write(&meta_path, serde_json::to_string_pretty(&metadata)?)?;
                    store.fail_stage(
                        job_id,
                        self.stage_name(),
                        &format!("quota exceeded generating {category}: {}", e.message),
                        3600,
                    )?;
                    return Err(StageError::QuotaExhausted(e.message));
                }
                Err(e) => {
                    metadata.insert(
                        category.to_string(),
                        Value::String(format!("{ERROR_MARKER_PREFIX} {}", e.message)),
                    );
                }
            }
        }

        std::fs::write(&meta_path, serde_json::to_string_pretty(&metadata)?)?;

        let all_filled = METADATA_CATEGORIES.iter().all(|c| {
            metadata
                .get(*c)
                .map(|v| !v.is_null() && !is_error_marker(v))
                .unwrap_or(false)
        });

        if all_filled {
            store.complete_stage(job_id, self.stage_name(), Some(&meta_path.to_string_lossy()))?;
        } else {
            store.fail_stage(
                job_id,
                self.stage_name(),
                "one or more metadata categories failed",
                120,
            )?;
        }
        Ok(Advance::Ran)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_marker_detection() {
        assert!(is_error_marker(&Value::String("ERROR: boom".to_string())));
        assert!(!is_error_marker(&Value::String("a fine thesis".to_string())));
        assert!(!is_error_marker(&Value::Null));
    }
}
