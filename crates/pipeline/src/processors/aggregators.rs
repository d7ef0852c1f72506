//! Conversation context aggregators
//!
//! Both aggregators share one [`ConversationHistory`] and only ever append to
//! it. Frames they observe are forwarded unchanged and in order.

use async_trait::async_trait;
use voicebot_core::{
    ConversationHistory, Frame, FrameDirection, FrameProcessor, Message, ProcessorContext, Result,
};

/// Collects user transcriptions into history and triggers the LLM.
///
/// A turn is the span between `UserStartedSpeaking` and
/// `UserStoppedSpeaking`. The transcription usually arrives after the stop
/// frame, so the turn stays open until text shows up. Once complete, one
/// user message is appended and an `LLMMessages` frame with the history
/// snapshot is pushed downstream.
pub struct UserContextAggregator {
    history: ConversationHistory,
    aggregation: String,
    aggregating: bool,
    seen_end: bool,
}

impl UserContextAggregator {
    pub fn new(history: ConversationHistory) -> Self {
        Self {
            history,
            aggregation: String::new(),
            aggregating: false,
            seen_end: false,
        }
    }

    fn append(&mut self, text: &str) {
        if !self.aggregation.is_empty() {
            self.aggregation.push(' ');
        }
        self.aggregation.push_str(text);
    }

    async fn complete_turn(&mut self, ctx: &mut ProcessorContext) -> Result<()> {
        let content = std::mem::take(&mut self.aggregation);
        self.aggregating = false;
        self.seen_end = false;

        self.history.push(Message::user(content));
        tracing::debug!(
            session_id = %ctx.session_id,
            messages = self.history.len(),
            "User turn added to context"
        );
        ctx.push_downstream(Frame::LLMMessages(self.history.snapshot()))
            .await
    }
}

#[async_trait]
impl FrameProcessor for UserContextAggregator {
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
            Frame::UserStartedSpeaking => {
                self.aggregation.clear();
                self.aggregating = true;
                self.seen_end = false;
                ctx.push_downstream(frame).await
            }
            Frame::UserStoppedSpeaking => {
                self.seen_end = true;
                ctx.push_downstream(frame).await?;
                if self.aggregating && !self.aggregation.is_empty() {
                    self.complete_turn(ctx).await?;
                }
                Ok(())
            }
            Frame::Transcription { ref text, .. } => {
                let text = text.clone();
                ctx.push_downstream(frame).await?;

                if self.aggregating {
                    self.append(&text);
                    if self.seen_end {
                        self.complete_turn(ctx).await?;
                    }
                } else {
                    // No open turn: the transcription is a turn of its own
                    self.append(&text);
                    self.complete_turn(ctx).await?;
                }
                Ok(())
            }
            other => ctx.push_downstream(other).await,
        }
    }

    fn name(&self) -> &'static str {
        "user_context_aggregator"
    }
}

/// Collects one LLM response into a single assistant message.
///
/// Text between `LLMResponseStart` and `LLMResponseEnd` is concatenated and
/// appended once the response ends. Fragments outside a response are
/// ignored.
pub struct AssistantContextAggregator {
    history: ConversationHistory,
    aggregation: String,
    aggregating: bool,
}

impl AssistantContextAggregator {
    pub fn new(history: ConversationHistory) -> Self {
        Self {
            history,
            aggregation: String::new(),
            aggregating: false,
        }
    }
}

#[async_trait]
impl FrameProcessor for AssistantContextAggregator {
    async fn process(
        &mut self,
        frame: Frame,
        direction: FrameDirection,
        ctx: &mut ProcessorContext,
    ) -> Result<()> {
        match &frame {
            Frame::LLMResponseStart => {
                self.aggregation.clear();
                self.aggregating = true;
            }
            Frame::LLMResponseChunk { text } if self.aggregating => {
                self.aggregation.push_str(text);
            }
            Frame::LLMResponseEnd if self.aggregating => {
                self.aggregating = false;
                let content = std::mem::take(&mut self.aggregation);
                let content = content.trim();
                if !content.is_empty() {
                    self.history.push(Message::assistant(content));
                    tracing::debug!(
                        session_id = %ctx.session_id,
                        messages = self.history.len(),
                        "Assistant response added to context"
                    );
                }
            }
            _ => {}
        }

        ctx.push(frame, direction).await
    }

    fn name(&self) -> &'static str {
        "assistant_context_aggregator"
    }
}
