//! Speech processing traits

use async_trait::async_trait;

use crate::audio::AudioRaw;
use crate::Result;

/// Speech-to-Text interface
///
/// Implementations:
/// - `OpenAiStt` - Whisper transcription over HTTP
///
/// Returns the recognized text verbatim; deciding what counts as an empty
/// result is left to the caller.
#[async_trait]
pub trait SpeechToText: Send + Sync + 'static {
    /// Transcribe a WAV container (mono, 16-bit PCM)
    ///
    /// # Arguments
    /// * `wav` - Complete WAV file bytes
    /// * `language` - ISO-639-1 language hint
    async fn transcribe(&self, wav: Vec<u8>, language: &str) -> Result<String>;

    /// Get model name for logging
    fn model_name(&self) -> &str;
}

/// Text-to-Speech interface
///
/// Implementations:
/// - `OpenAiTts` - OpenAI speech endpoint returning raw PCM
#[async_trait]
pub trait TextToSpeech: Send + Sync + 'static {
    /// Synthesize text to mono PCM16 audio at [`sample_rate`](Self::sample_rate)
    async fn synthesize(&self, text: &str) -> Result<AudioRaw>;

    /// Output sample rate
    fn sample_rate(&self) -> u32;

    /// Get model name for logging
    fn model_name(&self) -> &str;
}
