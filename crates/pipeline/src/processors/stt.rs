//! Speech-to-text processor
//!
//! Buffers caller audio and turns each flushed buffer into one user turn:
//! `UserStartedSpeaking`, `UserStoppedSpeaking`, then a `Transcription` when
//! the collaborator recognised something.
//!
//! There is no voice activity detection. With `min_flush_bytes == 0` every
//! delivered chunk is treated as a complete utterance.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use voicebot_config::Settings;
use voicebot_core::{
    encode_wav, Frame, FrameDirection, FrameProcessor, ProcessorContext, Result, SpeechToText,
};

use crate::metrics::{self, TtfbMetric};
use crate::PipelineError;

/// STT processor configuration
#[derive(Debug, Clone)]
pub struct SttConfig {
    /// Language hint passed to the collaborator
    pub language: String,
    /// Sample rate of the WAV container sent for transcription
    pub sample_rate: u32,
    /// Buffered bytes required before a flush; 0 flushes every chunk
    pub min_flush_bytes: usize,
    /// Collaborator call timeout
    pub timeout: Duration,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            sample_rate: 16000,
            min_flush_bytes: 0,
            timeout: Duration::from_secs(30),
        }
    }
}

impl From<&Settings> for SttConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            language: settings.services.language.clone(),
            sample_rate: settings.transport.audio_in_sample_rate,
            min_flush_bytes: settings.pipeline.stt_min_flush_bytes,
            timeout: settings.services.timeout(),
        }
    }
}

/// Result of one transcription attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptionOutcome {
    /// Recognised text, trimmed
    Text(String),
    /// The collaborator answered with nothing usable
    Empty,
    /// The call failed or timed out
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SttState {
    Idle,
    Buffering,
}

/// Turn-boundary state machine in front of a transcription collaborator
pub struct SttProcessor {
    stt: Arc<dyn SpeechToText>,
    config: SttConfig,
    buffer: Vec<u8>,
    state: SttState,
    ttfb: TtfbMetric,
}

impl SttProcessor {
    pub fn new(stt: Arc<dyn SpeechToText>, config: SttConfig) -> Self {
        Self {
            stt,
            config,
            buffer: Vec::new(),
            state: SttState::Idle,
            ttfb: TtfbMetric::new("stt"),
        }
    }

    /// Bytes currently buffered for the next utterance
    pub fn buffered_bytes(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_buffering(&self) -> bool {
        self.state == SttState::Buffering
    }

    fn should_flush(&self) -> bool {
        !self.buffer.is_empty() && self.buffer.len() >= self.config.min_flush_bytes
    }

    /// Emit the turn boundary, transcribe the buffer and go back to idle
    async fn flush(&mut self, ctx: &mut ProcessorContext) -> Result<()> {
        let pcm = std::mem::take(&mut self.buffer);
        self.state = SttState::Idle;

        ctx.push_downstream(Frame::UserStartedSpeaking).await?;
        ctx.push_downstream(Frame::UserStoppedSpeaking).await?;

        match self.transcribe(&pcm).await {
            TranscriptionOutcome::Text(text) => {
                tracing::info!(
                    session_id = %ctx.session_id,
                    turn = ctx.turn_number,
                    transcript = %text,
                    "Transcription"
                );
                ctx.next_turn();
                ctx.push_downstream(Frame::transcription(text, None)).await
            }
            TranscriptionOutcome::Empty => {
                tracing::warn!(
                    session_id = %ctx.session_id,
                    bytes = pcm.len(),
                    "Empty transcription result"
                );
                Ok(())
            }
            TranscriptionOutcome::Failed(reason) => {
                tracing::error!(session_id = %ctx.session_id, error = %reason, "Transcription failed");
                metrics::record_error("stt");
                ctx.push_downstream(Frame::error(format!(
                    "Error during transcription: {}",
                    reason
                )))
                .await
            }
        }
    }

    async fn transcribe(&mut self, pcm: &[u8]) -> TranscriptionOutcome {
        let wav = match encode_wav(pcm, self.config.sample_rate, 1) {
            Ok(wav) => wav,
            Err(e) => return TranscriptionOutcome::Failed(e.to_string()),
        };

        self.ttfb.start();
        let result = tokio::time::timeout(
            self.config.timeout,
            self.stt.transcribe(wav, &self.config.language),
        )
        .await;
        self.ttfb.stop();

        match result {
            Err(_) => TranscriptionOutcome::Failed(format!(
                "{}: {}",
                self.stt.model_name(),
                PipelineError::Timeout(self.config.timeout.as_millis() as u64)
            )),
            Ok(Err(e)) => TranscriptionOutcome::Failed(e.to_string()),
            Ok(Ok(text)) => {
                let text = text.trim();
                if text.is_empty() {
                    TranscriptionOutcome::Empty
                } else {
                    TranscriptionOutcome::Text(text.to_string())
                }
            }
        }
    }
}

#[async_trait]
impl FrameProcessor for SttProcessor {
    async fn process(
        &mut self,
        frame: Frame,
        direction: FrameDirection,
        ctx: &mut ProcessorContext,
    ) -> Result<()> {
        match frame {
            Frame::AudioChunk(audio) if direction == FrameDirection::Downstream => {
                if audio.sample_rate != self.config.sample_rate {
                    tracing::warn!(
                        expected = self.config.sample_rate,
                        got = audio.sample_rate,
                        "Audio chunk sample rate mismatch"
                    );
                }
                self.buffer.extend_from_slice(&audio.data);
                self.state = SttState::Buffering;

                if self.should_flush() {
                    self.flush(ctx).await?;
                }
                Ok(())
            }
            other => ctx.push(other, direction).await,
        }
    }

    fn name(&self) -> &'static str {
        "stt"
    }

    async fn on_stop(&mut self, ctx: &mut ProcessorContext) -> Result<()> {
        if !self.buffer.is_empty() {
            self.flush(ctx).await?;
        }
        Ok(())
    }
}
