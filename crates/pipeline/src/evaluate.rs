//! `evaluate_paragraphs` executor: rates each paragraph's
//! edit and immediately regenerates anything scoring below threshold.
//! Paragraphs left `regenerated` wait on an external human-confirmation
//! flow before this stage can be considered `success`.

use std::sync::Arc;

use chapterforge_core::{artifact, Config, EvaluationStatus, ParagraphRecord, StageError, StageState, Store};
use chapterforge_llm::LanguageModel;
use regex::Regex;
use serde_json::Value;

use crate::executor::{check_predecessor, Advance, StageExecutor};
use crate::paragraphs::{read_paragraphs, write_paragraphs};

const PASS_THRESHOLD: i64 = 8;
const DEFAULT_TONE: &str = "neutral";

pub struct EvaluationReply {
    pub rating: Option<i64>,
    pub critique: Option<String>,
}

/// Parses a reply containing `Rating: <integer>` and a
/// `CRITIQUE FOR REDO: <text>` block.
pub fn parse_evaluation_reply(reply: &str) -> EvaluationReply {
    let rating_re = Regex::new(r"(?i)rating:\s*(-?\d+)").unwrap();
    let critique_re = Regex::new(r"(?is)critique for redo:\s*(.+)").unwrap();

    let rating = rating_re
        .captures(reply)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<i64>().ok());
    let critique = critique_re
        .captures(reply)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string());

    EvaluationReply { rating, critique }
}

fn build_evaluation_prompt(
    record: &ParagraphRecord,
    previous_edited: &str,
    next_edited: &str,
    thesis: &str,
    tone: &str,
) -> String {
    format!(
        "Evaluate this paragraph edit. Reply with a line `Rating: <integer 1-10>` and, if the rating is below {PASS_THRESHOLD}, a line `CRITIQUE FOR REDO: <guidance>`.\n\nThesis: {thesis}\nTone: {tone}\n\nPrevious paragraph (edited, for context): {previous_edited}\nOriginal: {}\nEdited: {}\nNext paragraph (edited, for context): {next_edited}",
        record.original,
        record.edited.clone().unwrap_or_default(),
    )
}

fn build_regeneration_prompt(original_prompt: &str, critique: &str) -> String {
    format!(
        "{original_prompt}\n\nA previous attempt at this paragraph was rejected with the following critique. Revise accordingly:\n{critique}"
    )
}

fn read_thesis(meta_path: &std::path::Path) -> Result<String, StageError> {
    if !meta_path.exists() {
        return Ok(String::new());
    }
    let content = std::fs::read_to_string(meta_path)?;
    let metadata: Value = serde_json::from_str(&content)?;
    Ok(metadata
        .get("thesis")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string())
}

fn read_tone(meta_path: &std::path::Path) -> Result<String, StageError> {
    if !meta_path.exists() {
        return Ok(DEFAULT_TONE.to_string());
    }
    let content = std::fs::read_to_string(meta_path)?;
    let metadata: Value = serde_json::from_str(&content)?;
    Ok(metadata
        .get("tone")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_TONE)
        .to_string())
}

pub struct EvaluateParagraphsExecutor {
    pub lm: Arc<dyn LanguageModel>,
}

impl StageExecutor for EvaluateParagraphsExecutor {
    fn stage_name(&self) -> &'static str {
        "evaluate_paragraphs"
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
        let paragraphs_path = artifact::paragraphs_path(&config.root, &job);
        let meta_path = artifact::metadata_path(&config.root, &job);
        let mut records = read_paragraphs(&paragraphs_path)?;

        let thesis = read_thesis(&meta_path)?;
        let tone = read_tone(&meta_path)?;
        let edited_texts: Vec<String> = records
            .iter()
            .map(|r| r.edited.clone().unwrap_or_default())
            .collect();

        for i in 0..records.len() {
            if records[i].evaluation_status == EvaluationStatus::Passed {
                continue;
            }
            let previous_edited = if i == 0 { "" } else { &edited_texts[i - 1] };
            let next_edited = if i + 1 < records.len() { &edited_texts[i + 1] } else { "" };
            let prompt = build_evaluation_prompt(&records[i], previous_edited, next_edited, &thesis, &tone);

            match self.lm.submit_prompt(&prompt) {
                Ok(reply) => {
                    let parsed = parse_evaluation_reply(&reply);
                    records[i].full_evaluation_output = Some(reply);
                    records[i].rating = parsed.rating;
                    records[i].critique = parsed.critique.clone();

                    let passed = parsed.rating.map(|r| r >= PASS_THRESHOLD).unwrap_or(false);
                    if passed {
                        records[i].evaluation_status = EvaluationStatus::Passed;
                    } else {
                        let critique = parsed.critique.unwrap_or_default();
                        let regen_prompt = build_regeneration_prompt(&records[i].prompt, &critique);
                        match self.lm.submit_prompt(&regen_prompt) {
                            Ok(revised) => {
                                records[i].edited = Some(revised);
                                records[i].evaluation_status = EvaluationStatus::Regenerated;
                                records[i].regeneration_prompt = Some(regen_prompt);
                            }
                            Err(_) => {
                                records[i].evaluation_status = EvaluationStatus::Failed;
                            }
                        }
                    }
                }
                Err(_) => {
                    records[i].evaluation_status = EvaluationStatus::Failed;
                }
            }
            write_paragraphs(&paragraphs_path, &records)?;
        }

        let all_passed = records
            .iter()
            .all(|r| r.evaluation_status == EvaluationStatus::Passed);
        if all_passed {
            store.complete_stage(
                job_id,
                self.stage_name(),
                Some(&paragraphs_path.to_string_lossy()),
            )?;
        } else {
            store.fail_stage(
                job_id,
                self.stage_name(),
                "one or more paragraphs are not yet passed",
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
    fn parses_rating_and_critique() {
        let reply = "Some preamble.\nRating: 5\nCRITIQUE FOR REDO: tighten the opening clause.";
        let parsed = parse_evaluation_reply(reply);
        assert_eq!(parsed.rating, Some(5));
        assert_eq!(parsed.critique.as_deref(), Some("tighten the opening clause."));
    }

    #[test]
    fn missing_critique_is_none() {
        let parsed = parse_evaluation_reply("Rating: 9");
        assert_eq!(parsed.rating, Some(9));
        assert_eq!(parsed.critique, None);
    }
}
