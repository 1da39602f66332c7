//! `edit_paragraphs` executor: creates `paragraphs.json` on
//! first run, then drives each paragraph through the local language model
//! one edit at a time, saving after every success.

use std::sync::Arc;

use chapterforge_core::{artifact, Config, EvaluationStatus, ParagraphRecord, StageError, StageState, Store};
use chapterforge_llm::LanguageModel;
use serde_json::Value;

use crate::executor::{check_predecessor, Advance, StageExecutor};
use crate::paragraphs::{read_paragraphs, write_paragraphs};

const ERROR_MARKER_PREFIX: &str = "ERROR:";
const DEFAULT_TONE: &str = "neutral";

fn prompt_template(position: usize, total: usize) -> &'static str {
    if position == 0 && total > 1 {
        "This is the opening paragraph of a transcript. Edit it for clarity and flow, in a {tone} tone, setting up what follows.\n\nTarget paragraph:\n{target}\n\nNext paragraph (for context only, do not edit):\n{next}"
    } else if position == total - 1 && total > 1 {
        "This is the closing paragraph of a transcript. Edit it for clarity and flow, in a {tone} tone, bringing the piece to a close.\n\nPrevious paragraph (for context only, do not edit):\n{previous}\n\nTarget paragraph:\n{target}"
    } else {
        "Edit the following paragraph for clarity and flow, in a {tone} tone, keeping continuity with its neighbors.\n\nPrevious paragraph (for context only, do not edit):\n{previous}\n\nTarget paragraph:\n{target}\n\nNext paragraph (for context only, do not edit):\n{next}"
    }
}

fn build_prompt(position: usize, total: usize, previous: &str, target: &str, next: &str, tone: &str) -> String {
    prompt_template(position, total)
        .replace("{previous}", previous)
        .replace("{target}", target)
        .replace("{next}", next)
        .replace("{tone}", tone)
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

/// Splits the formatted transcript on blank-line boundaries into fresh
/// `ParagraphRecord`s with their editor prompt already built.
fn initial_paragraph_records(transcript: &str, tone: &str) -> Vec<ParagraphRecord> {
    let blocks: Vec<&str> = transcript
        .split("\n\n")
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .collect();
    let total = blocks.len();
    blocks
        .iter()
        .enumerate()
        .map(|(i, block)| {
            let previous = if i == 0 { "" } else { blocks[i - 1] };
            let next = if i + 1 < total { blocks[i + 1] } else { "" };
            ParagraphRecord {
                index: i as u32,
                original: block.to_string(),
                prompt: build_prompt(i, total, previous, block, next, tone),
                edited: None,
                evaluation_status: EvaluationStatus::Pending,
                rating: None,
                critique: None,
                full_evaluation_output: None,
                regeneration_prompt: None,
            }
        })
        .collect()
}

pub struct EditParagraphsExecutor {
    pub lm: Arc<dyn LanguageModel>,
}

impl StageExecutor for EditParagraphsExecutor {
    fn stage_name(&self) -> &'static str {
        "edit_paragraphs"
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
        if records.is_empty() {
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
            let tone = read_tone(&meta_path)?;
            records = initial_paragraph_records(&transcript, &tone);
            write_paragraphs(&paragraphs_path, &records)?;
        }

        for record in records.iter_mut() {
            if !record.needs_edit() {
                continue;
            }
            match self.lm.submit_prompt(&record.prompt) {
                Ok(text) => record.edited = Some(text),
                Err(e) => record.edited = Some(format!("{ERROR_MARKER_PREFIX} {}", e.message)),
            }
            write_paragraphs(&paragraphs_path, &records)?;
        }

        let all_edited = records.iter().all(|r| !r.needs_edit());
        if all_edited {
            store.complete_stage(
                job_id,
                self.stage_name(),
                Some(&paragraphs_path.to_string_lossy()),
            )?;
        } else {
            store.fail_stage(
                job_id,
                self.stage_name(),
                "one or more paragraphs failed to edit",
                120,
            )?;
        }
        Ok(Advance::Ran)
    }
}
