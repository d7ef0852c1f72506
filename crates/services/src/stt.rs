//! Whisper transcription

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use voicebot_config::ServicesConfig;
use voicebot_core::{Result, SpeechToText};

use crate::client::ApiClient;
use crate::ServiceError;

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// OpenAI `/audio/transcriptions` client
pub struct OpenAiStt {
    client: ApiClient,
    model: String,
}

impl OpenAiStt {
    pub fn new(client: ApiClient, config: &ServicesConfig) -> Self {
        Self {
            client,
            model: config.stt_model.clone(),
        }
    }

    fn form(&self, wav: &[u8], language: &str) -> Form {
        let file = Part::bytes(wav.to_vec())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .unwrap_or_else(|_| Part::bytes(wav.to_vec()).file_name("audio.wav"));

        let form = Form::new()
            .text("model", self.model.clone())
            .text("response_format", "json")
            .part("file", file);

        if language.is_empty() {
            form
        } else {
            form.text("language", language.to_string())
        }
    }

    async fn request(&self, wav: &[u8], language: &str) -> std::result::Result<String, ServiceError> {
        let response = self
            .client
            .send(|| {
                self.client
                    .post("/audio/transcriptions")
                    .multipart(self.form(wav, language))
            })
            .await?;

        let body: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;
        Ok(body.text)
    }
}

#[async_trait]
impl SpeechToText for OpenAiStt {
    async fn transcribe(&self, wav: Vec<u8>, language: &str) -> Result<String> {
        tracing::debug!(model = %self.model, bytes = wav.len(), language, "Transcribing");
        self.request(&wav, language)
            .await
            .map_err(|e| e.into_core(&self.model))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
