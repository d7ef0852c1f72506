//! Language model processor
//!
//! Consumes `LLMMessages` frames and streams the response as
//! `LLMResponseStart`, `LLMResponseChunk`..., `LLMResponseEnd`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use voicebot_config::Settings;
use voicebot_core::{
    Frame, FrameDirection, FrameProcessor, LanguageModel, Message, ProcessorContext, Result,
};

use crate::metrics::{self, TtfbMetric};
use crate::PipelineError;

/// LLM processor configuration
#[derive(Debug, Clone)]
pub struct LlmProcessorConfig {
    /// Maximum wait for each fragment of the stream
    pub timeout: Duration,
}

impl Default for LlmProcessorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

impl From<&Settings> for LlmProcessorConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            timeout: settings.services.timeout(),
        }
    }
}

pub struct LlmProcessor {
    llm: Arc<dyn LanguageModel>,
    config: LlmProcessorConfig,
    ttfb: TtfbMetric,
}

impl LlmProcessor {
    pub fn new(llm: Arc<dyn LanguageModel>, config: LlmProcessorConfig) -> Self {
        Self {
            llm,
            config,
            ttfb: TtfbMetric::new("llm"),
        }
    }

    async fn generate(&mut self, messages: Vec<Message>, ctx: &mut ProcessorContext) -> Result<()> {
        let llm = Arc::clone(&self.llm);
        tracing::debug!(
            session_id = %ctx.session_id,
            model = llm.model_name(),
            messages = messages.len(),
            "Generating response"
        );

        self.ttfb.start();
        let mut stream = llm.generate_stream(messages);
        let mut started = false;
        let mut fragments = 0usize;

        let failure = loop {
            let next = match tokio::time::timeout(self.config.timeout, stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    break Some(
                        PipelineError::Timeout(self.config.timeout.as_millis() as u64).to_string(),
                    )
                }
            };

            match next {
                None => break None,
                Some(Ok(text)) => {
                    if !started {
                        self.ttfb.stop();
                        ctx.push_downstream(Frame::LLMResponseStart).await?;
                        started = true;
                    }
                    if !text.is_empty() {
                        fragments += 1;
                        ctx.push_downstream(Frame::LLMResponseChunk { text }).await?;
                    }
                }
                Some(Err(e)) => break Some(e.to_string()),
            }
        };

        if !started {
            self.ttfb.stop();
            if failure.is_none() {
                ctx.push_downstream(Frame::LLMResponseStart).await?;
                started = true;
            }
        }

        // A partial response is still closed so it reaches history once
        if started {
            ctx.push_downstream(Frame::LLMResponseEnd).await?;
        }

        match failure {
            None => {
                tracing::debug!(session_id = %ctx.session_id, fragments, "Response complete");
                Ok(())
            }
            Some(reason) => {
                tracing::error!(session_id = %ctx.session_id, error = %reason, fragments, "Generation failed");
                metrics::record_error("llm");
                ctx.push_downstream(Frame::error(format!("Error during generation: {}", reason)))
                    .await
            }
        }
    }
}

#[async_trait]
impl FrameProcessor for LlmProcessor {
    async fn process(
        &mut self,
        frame: Frame,
        direction: FrameDirection,
        ctx: &mut ProcessorContext,
    ) -> Result<()> {
        match frame {
            Frame::LLMMessages(messages) if direction == FrameDirection::Downstream => {
                self.generate(messages, ctx).await
            }
            other => ctx.push(other, direction).await,
        }
    }

    fn name(&self) -> &'static str {
        "llm"
    }
}
