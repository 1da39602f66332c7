//! `format_paragraphs` executor: cleans the raw transcript,
//! then asks a language model where each paragraph should break.

use std::sync::Arc;

use chapterforge_core::{artifact, Config, StageError, StageState, Store};
use chapterforge_llm::LanguageModel;
use regex::Regex;

use crate::executor::{check_predecessor, Advance, StageExecutor};

/// Sentences per chunk sent to the language model by default.
pub const CHUNK_SIZE: usize = 25;
/// Prior formed paragraphs carried as context into the next chunk.
pub const CARRY_OVER_PARAGRAPHS: usize = 1;
/// A break index below this, with sentences remaining, is treated as a stub
/// and ignored.
const STUB_GUARD: usize = 3;

/// Joins soft line-wraps inside sentences, collapses whitespace, and
/// deduplicates immediate phrase repetitions ("X X" -> "X").
pub fn clean_transcript(raw: &str) -> String {
    let joined: String = raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let whitespace_re = Regex::new(r"\s+").unwrap();
    let collapsed = whitespace_re.replace_all(&joined, " ").trim().to_string();

    dedupe_repeated_phrases(&collapsed)
}

/// Iteratively collapses `"X X"` into `"X"` for single-word runs, matching
/// `original_source/newMain/services/formatter.py`'s dedup rule.
fn dedupe_repeated_phrases(text: &str) -> String {
    let re = Regex::new(r"(?i)\b(\w+)\s+\1\b").unwrap();
    let mut current = text.to_string();
    loop {
        let next = re.replace_all(&current, "$1").to_string();
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Splits on `.`, `?`, `!` followed by whitespace, keeping the punctuation
/// attached to its sentence.
pub fn split_sentences(text: &str) -> Vec<String> {
    let boundary_re = Regex::new(r"[.?!]\s+").unwrap();
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in boundary_re.find_iter(text) {
        let end = m.end() - (m.len() - 1); // keep the punctuation, drop the trailing whitespace
        let sentence = text[start..end].trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        start = m.end();
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

/// Parses the first integer found in the model's reply, clamped to
/// `[0, chunk_len]`.
pub fn parse_break_index(reply: &str, chunk_len: usize) -> usize {
    let digits_re = Regex::new(r"-?\d+").unwrap();
    let parsed = digits_re
        .find(reply)
        .and_then(|m| m.as_str().parse::<i64>().ok())
        .unwrap_or(chunk_len as i64);
    parsed.clamp(0, chunk_len as i64) as usize
}

/// Given a break index returned by the model and how many sentences remain
/// in the chunk, decides how many sentences to actually consume, applying a
/// stub-paragraph guard against models that return a trivially small index
/// while sentences remain.
pub fn resolve_advance(break_index: usize, chunk_len: usize, more_sentences_remain: bool) -> usize {
    if break_index < STUB_GUARD && more_sentences_remain {
        chunk_len
    } else if break_index == 0 {
        chunk_len
    } else {
        break_index
    }
}

pub struct FormatParagraphsExecutor {
    pub lm: Arc<dyn LanguageModel>,
}

impl StageExecutor for FormatParagraphsExecutor {
    fn stage_name(&self) -> &'static str {
        "format_paragraphs"
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
        let transcribe_stage = store.get_stage(job_id, "transcribe")?;
        let raw_path = match transcribe_stage.output_path {
            Some(p) => std::path::PathBuf::from(p),
            None => {
                store.fail_stage(
                    job_id,
                    self.stage_name(),
                    "transcribe has no output_path",
                    30,
                )?;
                return Ok(Advance::Ran);
            }
        };

        let raw = std::fs::read_to_string(&raw_path)?;
        let cleaned = clean_transcript(&raw);
        let sentences = split_sentences(&cleaned);

        let mut paragraphs: Vec<String> = Vec::new();
        let mut i = 0;
        while i < sentences.len() {
            let end = (i + CHUNK_SIZE).min(sentences.len());
            let chunk = &sentences[i..end];
            let chunk_len = chunk.len();
            let more_remain = end < sentences.len();

            let carry_over = paragraphs
                .iter()
                .rev()
                .take(CARRY_OVER_PARAGRAPHS)
                .rev()
                .cloned()
                .collect::<Vec<_>>()
                .join("\n\n");

            let prompt = format!(
                "Previous paragraph(s):\n{carry_over}\n\nChunk:\n{}\n\nAt which zero-based index in this chunk should a new paragraph begin?",
                chunk.join(" ")
            );

            // Falls back to "take the whole chunk" on any language-model
            // failure
            let break_index = match self.lm.submit_prompt(&prompt) {
                Ok(reply) => parse_break_index(&reply, chunk_len),
                Err(_) => chunk_len,
            };
            let advance_by = resolve_advance(break_index, chunk_len, more_remain).max(1);

            let taken = &chunk[..advance_by.min(chunk_len)];
            paragraphs.push(taken.join(" "));
            i += advance_by.min(chunk_len);
        }

        let formatted = paragraphs.join("\n\n");
        let out_path = artifact::formatted_transcript_path(&config.root, &job);
        std::fs::write(&out_path, &formatted)?;
        store.complete_stage(job_id, self.stage_name(), Some(&out_path.to_string_lossy()))?;
        Ok(Advance::Ran)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupes_immediate_word_repetition() {
        assert_eq!(dedupe_repeated_phrases("the the cat sat sat down"), "the cat sat down");
    }

    #[test]
    fn break_index_below_guard_advances_full_chunk_when_more_remain() {
        assert_eq!(resolve_advance(2, 25, true), 25);
    }

    #[test]
    fn break_index_at_chunk_length_takes_whole_chunk() {
        assert_eq!(resolve_advance(25, 25, false), 25);
    }

    #[test]
    fn break_index_mid_chunk_advances_by_index() {
        assert_eq!(resolve_advance(14, 25, true), 14);
    }

    #[test]
    fn parse_break_index_finds_first_integer() {
        assert_eq!(parse_break_index("I'd say index 7 seems right.", 25), 7);
    }

    #[test]
    fn parse_break_index_falls_back_to_chunk_len_on_no_digits() {
        assert_eq!(parse_break_index("no number here", 25), 25);
    }

    #[test]
    fn split_sentences_splits_on_terminal_punctuation() {
        let sentences = split_sentences("Hello there. How are you? Fine!");
        assert_eq!(sentences, vec!["Hello there.", "How are you?", "Fine!"]);
    }
}
