//! Remote collaborators over an OpenAI-compatible HTTP API
//!
//! - `OpenAiStt`: Whisper transcription (`/audio/transcriptions`)
//! - `OpenAiLlm`: streaming chat completions (`/chat/completions`)
//! - `OpenAiTts`: speech synthesis as raw PCM (`/audio/speech`)
//!
//! All three share one `ApiClient`, which applies the per-call timeout and
//! retries transient failures with exponential backoff.

pub mod client;
pub mod llm;
pub mod sse;
pub mod stt;
pub mod tts;

pub use client::ApiClient;
pub use llm::OpenAiLlm;
pub use stt::OpenAiStt;
pub use tts::OpenAiTts;

use std::sync::Arc;

use thiserror::Error;
use voicebot_config::ServicesConfig;
use voicebot_core::{LanguageModel, SpeechToText, TextToSpeech};

/// Service errors
#[derive(Error, Debug, Clone)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ServiceError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Network(_) | ServiceError::Timeout => true,
            ServiceError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Convert into a core error attributed to `service`
    pub fn into_core(self, service: &str) -> voicebot_core::Error {
        match self {
            ServiceError::Configuration(message) => voicebot_core::Error::Config(message),
            other => voicebot_core::Error::collaborator(service, other.to_string()),
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ServiceError::Timeout
        } else if err.is_decode() {
            ServiceError::InvalidResponse(err.to_string())
        } else {
            ServiceError::Network(err.to_string())
        }
    }
}

impl From<ServiceError> for voicebot_core::Error {
    fn from(err: ServiceError) -> Self {
        err.into_core("openai")
    }
}

/// The three collaborators a conversation needs
#[derive(Clone)]
pub struct Services {
    pub stt: Arc<dyn SpeechToText>,
    pub llm: Arc<dyn LanguageModel>,
    pub tts: Arc<dyn TextToSpeech>,
}

impl Services {
    /// Build OpenAI-backed collaborators sharing one HTTP client
    pub fn openai(config: &ServicesConfig) -> Result<Self, ServiceError> {
        let client = ApiClient::new(config)?;

        tracing::info!(
            base_url = %config.base_url,
            stt = %config.stt_model,
            llm = %config.llm_model,
            tts = %config.tts_model,
            "Initialized OpenAI services"
        );

        Ok(Self {
            stt: Arc::new(OpenAiStt::new(client.clone(), config)),
            llm: Arc::new(OpenAiLlm::new(client.clone(), config)),
            tts: Arc::new(OpenAiTts::new(client, config)),
        })
    }
}
