//! Output transport processor
//!
//! Sends synthesized audio to the client and surfaces transcripts, responses
//! and errors as events. Audio frames are consumed here; everything else
//! continues downstream.

use async_trait::async_trait;
use voicebot_core::{
    encode_wav, Frame, FrameDirection, FrameProcessor, ProcessorContext, Result, TransportEvent,
    TransportOutput,
};

pub struct OutputTransportProcessor {
    output: Box<dyn TransportOutput>,
    add_wav_header: bool,
    response: String,
    /// Set after a failed send; nothing more is written
    closed: bool,
}

impl OutputTransportProcessor {
    pub fn new(output: Box<dyn TransportOutput>, add_wav_header: bool) -> Self {
        Self {
            output,
            add_wav_header,
            response: String::new(),
            closed: false,
        }
    }

    /// A failed write ends the session: report it upstream as fatal
    fn transport_failed(&mut self, error: impl std::fmt::Display, ctx: &ProcessorContext) -> Result<()> {
        tracing::warn!(session_id = %ctx.session_id, error = %error, "Transport send failed");
        self.closed = true;
        ctx.push_upstream(Frame::fatal_error(format!("Transport error: {}", error)))
    }

    async fn send_event(&mut self, event: TransportEvent, ctx: &ProcessorContext) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        match self.output.send_event(event).await {
            Ok(()) => Ok(()),
            Err(e) => self.transport_failed(e, ctx),
        }
    }
}

#[async_trait]
impl FrameProcessor for OutputTransportProcessor {
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
            Frame::SynthesizedAudio(audio) => {
                if self.closed {
                    return Ok(());
                }
                let payload = if self.add_wav_header {
                    encode_wav(&audio.data, audio.sample_rate, audio.num_channels)?
                } else {
                    audio.data
                };
                if let Err(e) = self.output.send_audio(payload).await {
                    self.transport_failed(e, ctx)?;
                }
                Ok(())
            }
            Frame::Transcription { ref text, .. } => {
                self.send_event(TransportEvent::Transcript { text: text.clone() }, ctx)
                    .await?;
                ctx.push_downstream(frame).await
            }
            Frame::LLMResponseStart => {
                self.response.clear();
                ctx.push_downstream(frame).await
            }
            Frame::LLMResponseChunk { ref text } => {
                self.response.push_str(text);
                ctx.push_downstream(frame).await
            }
            Frame::LLMResponseEnd => {
                let text = std::mem::take(&mut self.response);
                let text = text.trim();
                if !text.is_empty() {
                    self.send_event(TransportEvent::Response { text: text.to_string() }, ctx)
                        .await?;
                }
                ctx.push_downstream(frame).await
            }
            Frame::Error { ref message, fatal } => {
                if !fatal {
                    self.send_event(TransportEvent::Error { message: message.clone() }, ctx)
                        .await?;
                }
                ctx.push_downstream(frame).await
            }
            other => ctx.push_downstream(other).await,
        }
    }

    fn name(&self) -> &'static str {
        "output_transport"
    }
}
