//! Text-to-speech processor
//!
//! Aggregates response fragments into sentences, synthesizes each one and
//! pushes the audio downstream ahead of the text frames that completed it.
//! Text frames are forwarded so later stages still see the response.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use voicebot_config::Settings;
use voicebot_core::{
    Frame, FrameDirection, FrameProcessor, ProcessorContext, Result, TextToSpeech,
};

use super::sentence::SentenceAggregator;
use crate::metrics::{self, TtfbMetric};
use crate::PipelineError;

/// TTS processor configuration
#[derive(Debug, Clone)]
pub struct TtsProcessorConfig {
    /// Minimum sentence length sent to synthesis
    pub sentence_min_chars: usize,
    /// Collaborator call timeout
    pub timeout: Duration,
}

impl Default for TtsProcessorConfig {
    fn default() -> Self {
        Self {
            sentence_min_chars: 0,
            timeout: Duration::from_secs(30),
        }
    }
}

impl From<&Settings> for TtsProcessorConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            sentence_min_chars: settings.pipeline.sentence_min_chars,
            timeout: settings.services.timeout(),
        }
    }
}

pub struct TtsProcessor {
    tts: Arc<dyn TextToSpeech>,
    config: TtsProcessorConfig,
    sentences: SentenceAggregator,
    ttfb: TtfbMetric,
}

impl TtsProcessor {
    pub fn new(tts: Arc<dyn TextToSpeech>, config: TtsProcessorConfig) -> Self {
        Self {
            sentences: SentenceAggregator::new(config.sentence_min_chars),
            tts,
            config,
            ttfb: TtfbMetric::new("tts"),
        }
    }

    async fn synthesize(&mut self, text: &str, ctx: &mut ProcessorContext) -> Result<()> {
        tracing::debug!(session_id = %ctx.session_id, sentence = %text, "Synthesizing");

        self.ttfb.start();
        let result = tokio::time::timeout(self.config.timeout, self.tts.synthesize(text)).await;
        self.ttfb.stop();

        let failure = match result {
            Ok(Ok(audio)) if audio.is_empty() => {
                tracing::warn!(session_id = %ctx.session_id, "Synthesis returned no audio");
                return Ok(());
            }
            Ok(Ok(audio)) => return ctx.push_downstream(Frame::SynthesizedAudio(audio)).await,
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!(
                "{}: {}",
                self.tts.model_name(),
                PipelineError::Timeout(self.config.timeout.as_millis() as u64)
            ),
        };

        tracing::error!(session_id = %ctx.session_id, error = %failure, "Synthesis failed");
        metrics::record_error("tts");
        ctx.push_downstream(Frame::error(format!("Error during synthesis: {}", failure)))
            .await
    }

    async fn flush(&mut self, ctx: &mut ProcessorContext) -> Result<()> {
        if let Some(rest) = self.sentences.flush() {
            self.synthesize(&rest, ctx).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl FrameProcessor for TtsProcessor {
    async fn process(
        &mut self,
        frame: Frame,
        direction: FrameDirection,
        ctx: &mut ProcessorContext,
    ) -> Result<()> {
        if direction == FrameDirection::Upstream {
            return ctx.push(frame, direction).await;
        }

        match frame {
            Frame::LLMResponseStart => {
                self.sentences.reset();
                ctx.push_downstream(frame).await
            }
            Frame::LLMResponseChunk { ref text } => {
                for sentence in self.sentences.push(text) {
                    self.synthesize(&sentence, ctx).await?;
                }
                ctx.push_downstream(frame).await
            }
            Frame::LLMResponseEnd => {
                self.flush(ctx).await?;
                ctx.push_downstream(frame).await
            }
            other => ctx.push_downstream(other).await,
        }
    }

    fn name(&self) -> &'static str {
        "tts"
    }

    async fn on_stop(&mut self, ctx: &mut ProcessorContext) -> Result<()> {
        self.flush(ctx).await
    }
}
