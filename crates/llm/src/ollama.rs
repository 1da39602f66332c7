//! Local language-model endpoint, modeled on the Ollama `/api/generate` call.

use serde::Deserialize;
use serde_json::json;

use crate::{LanguageModel, LmError, LmErrorKind, LmResult};

const DEFAULT_MODEL: &str = "llama3";

pub struct OllamaClient {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaClient {
    pub fn new(base_url: String) -> Self {
        OllamaClient {
            client: reqwest::blocking::Client::new(),
            base_url,
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

impl LanguageModel for OllamaClient {
    fn submit_prompt(&self, prompt: &str) -> LmResult {
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| LmError::new(LmErrorKind::Transport, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(LmError::new(
                LmErrorKind::Other,
                format!("status {status}: {text}"),
            ));
        }

        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| LmError::new(LmErrorKind::Parse, e.to_string()))?;
        Ok(parsed.response)
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}
