//! Primary cloud language-model endpoint, modeled on the Gemini
//! `generateContent` call.

use serde_json::json;

use crate::{LanguageModel, LmError, LmErrorKind, LmResult};

const DEFAULT_MODEL: &str = "gemini-2.5-pro";

pub struct GeminiClient {
    client: reqwest::blocking::Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        GeminiClient {
            client: reqwest::blocking::Client::new(),
            api_key,
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

impl LanguageModel for GeminiClient {
    fn submit_prompt(&self, prompt: &str) -> LmResult {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );

        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
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
            let kind = if status.as_u16() == 429 || crate::looks_like_quota_error(&text) {
                LmErrorKind::Quota
            } else {
                LmErrorKind::Other
            };
            return Err(LmError::new(kind, format!("status {status}: {text}")));
        }

        let body: serde_json::Value = response
            .json()
            .map_err(|e| LmError::new(LmErrorKind::Parse, e.to_string()))?;

        body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| {
                LmError::new(
                    LmErrorKind::Parse,
                    "no candidate text in Gemini response".to_string(),
                )
            })
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}
