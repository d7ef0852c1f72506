//! Pipeline processing traits

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::PipelineError;
use crate::frame::{Frame, FrameDirection};
use crate::Result;

/// Per-processor handle onto the pipeline.
///
/// Holds the links to the neighbouring queues. Downstream links are bounded,
/// so [`push`](Self::push) suspends while the next processor is saturated.
/// Upstream links are unbounded: upstream traffic is sparse control and
/// error signalling, and two bounded queues pointing at each other could
/// deadlock.
#[derive(Debug, Clone)]
pub struct ProcessorContext {
    /// Session ID
    pub session_id: String,
    /// Name of the processor owning this context
    pub processor: &'static str,
    /// Completed user turns observed by this processor
    pub turn_number: usize,
    downstream: mpsc::Sender<Frame>,
    upstream: mpsc::UnboundedSender<Frame>,
}

impl ProcessorContext {
    /// Create a context wired to the given neighbour queues
    pub fn new(
        session_id: impl Into<String>,
        processor: &'static str,
        downstream: mpsc::Sender<Frame>,
        upstream: mpsc::UnboundedSender<Frame>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            processor,
            turn_number: 0,
            downstream,
            upstream,
        }
    }

    /// Emit a frame in the given direction
    pub async fn push(&self, frame: Frame, direction: FrameDirection) -> Result<()> {
        match direction {
            FrameDirection::Downstream => self.push_downstream(frame).await,
            FrameDirection::Upstream => self.push_upstream(frame),
        }
    }

    /// Emit a frame toward the end of the chain, waiting for queue space
    pub async fn push_downstream(&self, frame: Frame) -> Result<()> {
        self.downstream
            .send(frame)
            .await
            .map_err(|_| PipelineError::ChannelClosed.into())
    }

    /// Emit a frame toward the start of the chain
    pub fn push_upstream(&self, frame: Frame) -> Result<()> {
        self.upstream
            .send(frame)
            .map_err(|_| PipelineError::ChannelClosed.into())
    }

    /// Increment turn number
    pub fn next_turn(&mut self) {
        self.turn_number += 1;
    }
}

/// Frame processor for pipeline stages
///
/// Each processor runs in its own task and owns its state exclusively; the
/// pipeline never calls `process` on the same instance concurrently, so
/// `&mut self` needs no locking.
///
/// `process` receives one frame and emits zero or more frames through the
/// context, in either direction. Frames a processor does not care about
/// must be forwarded in the direction they arrived.
///
/// Lifecycle frames (`Start`, `End`, `Cancel`) never reach `process`: the
/// pipeline calls `on_start` / `on_stop` and forwards them itself.
///
/// # Example Implementation
///
/// ```ignore
/// struct Uppercase;
///
/// #[async_trait]
/// impl FrameProcessor for Uppercase {
///     async fn process(
///         &mut self,
///         frame: Frame,
///         direction: FrameDirection,
///         ctx: &mut ProcessorContext,
///     ) -> Result<()> {
///         match frame {
///             Frame::LLMResponseChunk { text } => {
///                 ctx.push(Frame::LLMResponseChunk { text: text.to_uppercase() }, direction).await
///             }
///             other => ctx.push(other, direction).await,
///         }
///     }
///
///     fn name(&self) -> &'static str {
///         "uppercase"
///     }
/// }
/// ```
#[async_trait]
pub trait FrameProcessor: Send + 'static {
    /// Process a frame, emitting output through `ctx`
    async fn process(
        &mut self,
        frame: Frame,
        direction: FrameDirection,
        ctx: &mut ProcessorContext,
    ) -> Result<()>;

    /// Get processor name for tracing
    fn name(&self) -> &'static str;

    /// Called when the `Start` frame reaches this processor
    async fn on_start(&mut self, _ctx: &mut ProcessorContext) -> Result<()> {
        Ok(())
    }

    /// Called when the `End` frame reaches this processor, before it is
    /// forwarded. Frames pushed here are delivered ahead of `End`.
    async fn on_stop(&mut self, _ctx: &mut ProcessorContext) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_routes_by_direction() {
        let (down_tx, mut down_rx) = mpsc::channel(4);
        let (up_tx, mut up_rx) = mpsc::unbounded_channel();
        let ctx = ProcessorContext::new("session-123", "test", down_tx, up_tx);

        ctx.push(Frame::UserStartedSpeaking, FrameDirection::Downstream)
            .await
            .unwrap();
        ctx.push(Frame::error("late"), FrameDirection::Upstream)
            .await
            .unwrap();

        assert_eq!(down_rx.recv().await, Some(Frame::UserStartedSpeaking));
        assert_eq!(up_rx.recv().await, Some(Frame::error("late")));
    }

    #[tokio::test]
    async fn test_push_after_close_fails() {
        let (down_tx, down_rx) = mpsc::channel(1);
        let (up_tx, _up_rx) = mpsc::unbounded_channel();
        let mut ctx = ProcessorContext::new("s", "test", down_tx, up_tx);
        drop(down_rx);

        let err = ctx.push_downstream(Frame::End).await.unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Pipeline(PipelineError::ChannelClosed)
        ));

        ctx.next_turn();
        assert_eq!(ctx.turn_number, 1);
    }
}
