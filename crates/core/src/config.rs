//! Process-wide configuration from environment variables.
//!
//! `Settings` is the raw, possibly-partial env-sourced data; `Config` is the
//! validated, immutable struct built from it once at startup and handed by
//! reference to every component that needs it.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::StageError;

#[derive(Debug, Deserialize)]
struct Settings {
    chapterforge_root: Option<String>,
    chapterforge_worker_url: Option<String>,
    chapterforge_whisper_model: Option<String>,
    gemini_api_key: Option<String>,
    chapterforge_ollama_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub root: PathBuf,
    pub worker_url: String,
    pub whisper_model: String,
    pub gemini_api_key: Option<String>,
    pub ollama_url: String,
}

impl Config {
    pub fn db_path(&self) -> PathBuf {
        self.root.join("chapterforge.db")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Loads a `.env` file from the current directory if present, then reads
    /// the `CHAPTERFORGE_*` / `GEMINI_API_KEY` environment variables into a
    /// frozen `Config`.
    pub fn load() -> Result<Config, StageError> {
        let _ = dotenvy::dotenv();

        let builder = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .try_parsing(true)
                    .prefix_separator("_")
                    .separator("__"),
            );
        let raw = builder
            .build()
            .map_err(|e| StageError::Bug(format!("config load failed: {e}")))?;

        let settings: Settings = raw
            .try_deserialize()
            .map_err(|e| StageError::Bug(format!("config deserialize failed: {e}")))?;

        Ok(Config {
            root: settings
                .chapterforge_root
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            worker_url: settings
                .chapterforge_worker_url
                .unwrap_or_else(|| "http://127.0.0.1:8008".to_string()),
            whisper_model: settings
                .chapterforge_whisper_model
                .unwrap_or_else(|| "large".to_string()),
            gemini_api_key: settings.gemini_api_key,
            ollama_url: settings
                .chapterforge_ollama_url
                .unwrap_or_else(|| "http://127.0.0.1:11434".to_string()),
        })
    }

    /// Builds a `Config` directly, bypassing environment loading — for tests
    /// that need a project root under a `tempfile::tempdir()`.
    pub fn for_root(root: PathBuf) -> Config {
        Config {
            root,
            worker_url: "http://127.0.0.1:8008".to_string(),
            whisper_model: "large".to_string(),
            gemini_api_key: None,
            ollama_url: "http://127.0.0.1:11434".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_root_sets_defaults() {
        let cfg = Config::for_root(PathBuf::from("/tmp/proj"));
        assert_eq!(cfg.db_path(), PathBuf::from("/tmp/proj/chapterforge.db"));
        assert_eq!(cfg.whisper_model, "large");
    }
}
