//! Linear processor pipeline
//!
//! Connects `FrameProcessor`s with tokio channels. Each processor runs in its
//! own task; downstream frames flow left to right through bounded queues,
//! upstream frames flow right to left through unbounded ones.
//!
//! ```text
//!  input ──▶ [p0] ──▶ [p1] ──▶ ... ──▶ [pN] ──▶ output
//!  upstream_output ◀── [p0] ◀── ... ◀── [pN] ◀── upstream_input
//! ```

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use voicebot_core::{
    Error, Frame, FrameDirection, FrameProcessor, PipelineError, ProcessorContext, Result,
};

use crate::metrics;

/// Channel capacity for inter-processor communication
const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// An ordered chain of frame processors
pub struct Pipeline {
    /// Name of this pipeline
    name: String,
    /// Processors in order
    processors: Vec<Box<dyn FrameProcessor>>,
    /// Capacity of each downstream queue
    channel_capacity: usize,
}

/// Endpoints of a running pipeline
pub struct PipelineIo {
    /// Head of the chain, downstream
    pub input: mpsc::Sender<Frame>,
    /// Frames that left the last processor downstream
    pub output: mpsc::Receiver<Frame>,
    /// Tail of the chain, upstream
    pub upstream_input: mpsc::UnboundedSender<Frame>,
    /// Frames that left the first processor upstream
    pub upstream_output: mpsc::UnboundedReceiver<Frame>,
    /// One task per processor
    pub handles: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Create a new, empty pipeline
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            processors: Vec::new(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Create using the builder
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder::new(name)
    }

    /// Append a processor to the chain
    pub fn add<P: FrameProcessor>(&mut self, processor: P) -> &mut Self {
        self.processors.push(Box::new(processor));
        self
    }

    /// Append a boxed processor to the chain
    pub fn add_boxed(&mut self, processor: Box<dyn FrameProcessor>) -> &mut Self {
        self.processors.push(processor);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Processor names in chain order
    pub fn processor_names(&self) -> Vec<&'static str> {
        self.processors.iter().map(|p| p.name()).collect()
    }

    /// Spawn one task per processor and wire the queues.
    ///
    /// An empty pipeline connects input straight to output. Every task stops
    /// when `cancel` turns true (or its sender is dropped), when its
    /// downstream input closes, or after it forwarded `End` / `Cancel`.
    pub fn run(self, session_id: &str, cancel: watch::Receiver<bool>) -> PipelineIo {
        let count = self.processors.len();

        let mut down_tx = Vec::with_capacity(count + 1);
        let mut down_rx = Vec::with_capacity(count + 1);
        let mut up_tx = Vec::with_capacity(count + 1);
        let mut up_rx = Vec::with_capacity(count + 1);
        for _ in 0..=count {
            let (tx, rx) = mpsc::channel::<Frame>(self.channel_capacity);
            down_tx.push(Some(tx));
            down_rx.push(Some(rx));
            let (tx, rx) = mpsc::unbounded_channel::<Frame>();
            up_tx.push(Some(tx));
            up_rx.push(Some(rx));
        }

        // Edge i feeds processor i downstream; up edge i+1 feeds it upstream
        let mut handles = Vec::with_capacity(count);
        for (i, processor) in self.processors.into_iter().enumerate() {
            let ctx = ProcessorContext::new(
                session_id,
                processor.name(),
                take(&mut down_tx, i + 1),
                take(&mut up_tx, i),
            );
            let node = Node {
                processor,
                ctx,
                down_rx: take(&mut down_rx, i),
                up_rx: take(&mut up_rx, i + 1),
            };
            handles.push(tokio::spawn(node.run(cancel.clone())));
        }

        tracing::debug!(
            pipeline = %self.name,
            session_id,
            processors = count,
            "Pipeline started"
        );

        PipelineIo {
            input: take(&mut down_tx, 0),
            output: take(&mut down_rx, count),
            upstream_input: take(&mut up_tx, count),
            upstream_output: take(&mut up_rx, 0),
            handles,
        }
    }
}

fn take<T>(slots: &mut [Option<T>], index: usize) -> T {
    match slots[index].take() {
        Some(value) => value,
        None => unreachable!("pipeline edge {} wired twice", index),
    }
}

/// Resolves once cancellation is requested or its sender is gone
pub(crate) async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|cancelled| *cancelled).await;
}

/// A processor with its queues, driven by one task
struct Node {
    processor: Box<dyn FrameProcessor>,
    ctx: ProcessorContext,
    down_rx: mpsc::Receiver<Frame>,
    up_rx: mpsc::UnboundedReceiver<Frame>,
}

/// What a node does after handling one frame
enum Step {
    Continue,
    Exit,
}

impl Node {
    async fn run(mut self, mut cancel: watch::Receiver<bool>) {
        let name = self.processor.name();

        loop {
            let (frame, direction) = tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => break,
                Some(frame) = self.up_rx.recv() => (frame, FrameDirection::Upstream),
                frame = self.down_rx.recv() => match frame {
                    Some(frame) => (frame, FrameDirection::Downstream),
                    None => break,
                },
            };

            let step = tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => Step::Exit,
                step = self.handle(frame, direction) => step,
            };

            if let Step::Exit = step {
                break;
            }
        }

        tracing::debug!(processor = name, session_id = %self.ctx.session_id, "Processor task exiting");
    }

    async fn handle(&mut self, frame: Frame, direction: FrameDirection) -> Step {
        if direction == FrameDirection::Upstream && frame.is_system() {
            return self.forward(frame, direction).await;
        }

        match frame {
            Frame::Start => {
                let result = AssertUnwindSafe(self.processor.on_start(&mut self.ctx))
                    .catch_unwind()
                    .await;
                if let Step::Exit = self.settle(result, "on_start").await {
                    return Step::Exit;
                }
                self.forward(Frame::Start, direction).await
            }
            Frame::End => {
                let result = AssertUnwindSafe(self.processor.on_stop(&mut self.ctx))
                    .catch_unwind()
                    .await;
                let _ = self.settle(result, "on_stop").await;
                let _ = self.forward(Frame::End, direction).await;
                Step::Exit
            }
            Frame::Cancel => {
                let _ = self.forward(Frame::Cancel, direction).await;
                Step::Exit
            }
            frame => {
                let result = AssertUnwindSafe(self.processor.process(frame, direction, &mut self.ctx))
                    .catch_unwind()
                    .await;
                self.settle(result, "process").await
            }
        }
    }

    async fn forward(&mut self, frame: Frame, direction: FrameDirection) -> Step {
        match self.ctx.push(frame, direction).await {
            Ok(()) => Step::Continue,
            Err(_) => Step::Exit,
        }
    }

    /// Turn a processor outcome into error frames. Non-fatal errors and
    /// panics go downstream; fatal ones go upstream to end the session.
    async fn settle(
        &mut self,
        result: std::thread::Result<Result<()>>,
        stage: &'static str,
    ) -> Step {
        let name = self.processor.name();
        let error = match result {
            Ok(Ok(())) => return Step::Continue,
            Ok(Err(Error::Pipeline(PipelineError::ChannelClosed))) => {
                tracing::debug!(processor = name, "Output channel closed");
                return Step::Exit;
            }
            Ok(Err(e)) => e,
            Err(_) => Error::from(PipelineError::Panicked(name.to_string())),
        };

        tracing::error!(processor = name, stage, error = %error, "Processor error");
        metrics::record_error(name);

        let pushed = if error.is_fatal() {
            self.ctx.push_upstream(Frame::fatal_error(error.to_string()))
        } else {
            self.ctx.push_downstream(Frame::error(error.to_string())).await
        };

        match pushed {
            Ok(()) => Step::Continue,
            Err(_) => Step::Exit,
        }
    }
}

/// Builder for Pipeline
pub struct PipelineBuilder {
    pipeline: Pipeline,
}

impl PipelineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            pipeline: Pipeline::new(name),
        }
    }

    /// Add a processor
    pub fn processor<P: FrameProcessor>(mut self, processor: P) -> Self {
        self.pipeline.add(processor);
        self
    }

    /// Add a boxed processor
    pub fn processor_boxed(mut self, processor: Box<dyn FrameProcessor>) -> Self {
        self.pipeline.add_boxed(processor);
        self
    }

    /// Set downstream queue capacity (at least 1)
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.pipeline.channel_capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> Pipeline {
        self.pipeline
    }
}
