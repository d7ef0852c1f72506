//! Speech synthesis returning raw PCM

use async_trait::async_trait;
use serde::Serialize;
use voicebot_config::ServicesConfig;
use voicebot_core::{AudioRaw, Result, TextToSpeech};

use crate::client::ApiClient;
use crate::ServiceError;

/// The `pcm` response format is 24 kHz mono 16-bit little-endian
pub const PCM_SAMPLE_RATE: u32 = 24000;

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'static str,
}

/// OpenAI `/audio/speech` client
pub struct OpenAiTts {
    client: ApiClient,
    model: String,
    voice: String,
}

impl OpenAiTts {
    pub fn new(client: ApiClient, config: &ServicesConfig) -> Self {
        Self {
            client,
            model: config.tts_model.clone(),
            voice: config.voice.clone(),
        }
    }

    fn request<'a>(&'a self, text: &'a str) -> SpeechRequest<'a> {
        SpeechRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            response_format: "pcm",
        }
    }

    async fn fetch(&self, text: &str) -> std::result::Result<Vec<u8>, ServiceError> {
        let request = self.request(text);
        let response = self
            .client
            .send(|| self.client.post("/audio/speech").json(&request))
            .await?;

        let mut pcm = response.bytes().await?.to_vec();
        if pcm.len() % 2 != 0 {
            tracing::warn!(bytes = pcm.len(), "Dropping trailing byte of odd-length PCM");
            pcm.pop();
        }
        Ok(pcm)
    }
}

#[async_trait]
impl TextToSpeech for OpenAiTts {
    async fn synthesize(&self, text: &str) -> Result<AudioRaw> {
        tracing::debug!(model = %self.model, voice = %self.voice, chars = text.len(), "Synthesizing");
        let pcm = self.fetch(text).await.map_err(|e| e.into_core(&self.model))?;
        Ok(AudioRaw::mono(pcm, PCM_SAMPLE_RATE))
    }

    fn sample_rate(&self) -> u32 {
        PCM_SAMPLE_RATE
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
