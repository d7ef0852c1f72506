//! Pipeline task
//!
//! A `PipelineTask` is one run of a [`Pipeline`]. It owns an injection queue
//! that feeds the head of the chain, watches both ends of the chain for
//! `End` and fatal errors, and tears the processors down when the run is
//! over. A [`TaskHandle`] lets code outside the pipeline queue frames, stop
//! or cancel it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use voicebot_core::{ConversationHistory, Frame, Message, Result};

use crate::metrics;
use crate::pipeline::{cancelled, Pipeline};
use crate::PipelineError;

/// Capacity of the injection queue
const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// How long processors may take to wind down after the run ends
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// How a task run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// `End` travelled through every processor
    Completed,
    /// Cancelled by a handle, a fatal error or an expired drain
    Cancelled,
}

/// Cloneable handle onto a running (or not yet started) task
#[derive(Clone)]
pub struct TaskHandle {
    session_id: Arc<str>,
    queue: mpsc::Sender<Frame>,
    cancel: Arc<watch::Sender<bool>>,
    stopping: Arc<watch::Sender<bool>>,
}

impl TaskHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Queue a frame at the head of the pipeline, behind earlier ones
    pub async fn queue_frame(&self, frame: Frame) -> Result<()> {
        self.queue
            .send(frame)
            .await
            .map_err(|_| PipelineError::ChannelClosed.into())
    }

    pub async fn queue_frames(&self, frames: impl IntoIterator<Item = Frame> + Send) -> Result<()> {
        for frame in frames {
            self.queue_frame(frame).await?;
        }
        Ok(())
    }

    /// Finish once everything queued so far has been processed.
    ///
    /// Starts the drain timer: if `End` has not left the pipeline when it
    /// expires, the task is cancelled and in-flight frames are discarded.
    pub async fn stop_when_done(&self) -> Result<()> {
        self.stopping.send_replace(true);
        self.queue_frame(Frame::End).await
    }

    /// Stop immediately, discarding in-flight frames
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

/// One run of a pipeline
pub struct PipelineTask {
    pipeline: Pipeline,
    session_id: Arc<str>,
    drain_timeout: Duration,
    queue_tx: mpsc::Sender<Frame>,
    queue_rx: mpsc::Receiver<Frame>,
    cancel_tx: Arc<watch::Sender<bool>>,
    stopping_tx: Arc<watch::Sender<bool>>,
}

impl PipelineTask {
    pub fn new(pipeline: Pipeline, session_id: impl Into<String>) -> Self {
        Self::with_queue_capacity(pipeline, session_id, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_queue_capacity(
        pipeline: Pipeline,
        session_id: impl Into<String>,
        capacity: usize,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(capacity.max(1));
        let (cancel_tx, _) = watch::channel(false);
        let (stopping_tx, _) = watch::channel(false);
        Self {
            pipeline,
            session_id: Arc::from(session_id.into()),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            queue_tx,
            queue_rx,
            cancel_tx: Arc::new(cancel_tx),
            stopping_tx: Arc::new(stopping_tx),
        }
    }

    /// Set how long queued frames may take to drain after `stop_when_done`,
    /// and how long processors may take to stop once the run ends
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn handle(&self) -> TaskHandle {
        TaskHandle {
            session_id: Arc::clone(&self.session_id),
            queue: self.queue_tx.clone(),
            cancel: Arc::clone(&self.cancel_tx),
            stopping: Arc::clone(&self.stopping_tx),
        }
    }

    /// Run until `End` reaches the end of the pipeline or the task is
    /// cancelled. `Start` is delivered ahead of anything already queued.
    /// Once a stop was requested, `End` has `drain_timeout` to get through.
    pub async fn run(self) -> TaskOutcome {
        let PipelineTask {
            pipeline,
            session_id,
            drain_timeout,
            queue_tx,
            queue_rx,
            cancel_tx,
            stopping_tx,
        } = self;
        // Handles keep the queue open; the task itself must not
        drop(queue_tx);

        let mut cancel = cancel_tx.subscribe();
        let mut stopping = stopping_tx.subscribe();
        let mut drain_deadline: Option<Instant> = None;
        let mut io = pipeline.run(&session_id, cancel.clone());
        metrics::session_started();
        tracing::info!(session_id = %session_id, "Pipeline task started");

        let forwarder = tokio::spawn(forward_queue(queue_rx, io.input, cancel.clone()));

        let outcome = loop {
            let deadline = drain_deadline;
            let drain_expired = async move {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => futures::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = cancelled(&mut cancel) => break TaskOutcome::Cancelled,
                _ = async { stopping.wait_for(|stop| *stop).await.is_ok() }, if drain_deadline.is_none() => {
                    drain_deadline = Some(Instant::now() + drain_timeout);
                }
                _ = drain_expired => {
                    tracing::warn!(
                        session_id = %session_id,
                        timeout_ms = drain_timeout.as_millis() as u64,
                        "Pipeline did not drain in time, discarding in-flight frames"
                    );
                    break TaskOutcome::Cancelled;
                }
                frame = io.output.recv() => match frame {
                    Some(Frame::End) => break TaskOutcome::Completed,
                    Some(frame) => {
                        metrics::record_frame(frame.name());
                        if ends_session(&frame, &session_id, "sink") {
                            break TaskOutcome::Cancelled;
                        }
                    }
                    None => break TaskOutcome::Completed,
                },
                Some(frame) = io.upstream_output.recv() => {
                    if ends_session(&frame, &session_id, "source") {
                        break TaskOutcome::Cancelled;
                    }
                }
            }
        };

        // Stops the forwarder and any processor still running
        cancel_tx.send_replace(true);

        let aborts: Vec<_> = io.handles.iter().map(|h| h.abort_handle()).collect();
        let drained =
            tokio::time::timeout(drain_timeout, futures::future::join_all(io.handles)).await;
        if drained.is_err() {
            tracing::warn!(
                session_id = %session_id,
                timeout_ms = drain_timeout.as_millis() as u64,
                "Processors did not stop in time, aborting"
            );
            for abort in aborts {
                abort.abort();
            }
        }
        forwarder.abort();
        let _ = forwarder.await;

        metrics::session_ended();
        tracing::info!(session_id = %session_id, ?outcome, "Pipeline task finished");
        outcome
    }
}

/// Feed queued frames into the head of the pipeline, `Start` first
async fn forward_queue(
    mut queue: mpsc::Receiver<Frame>,
    input: mpsc::Sender<Frame>,
    mut cancel: watch::Receiver<bool>,
) {
    let mut next = Some(Frame::Start);
    loop {
        let frame = match next.take() {
            Some(frame) => frame,
            None => tokio::select! {
                _ = cancelled(&mut cancel) => return,
                frame = queue.recv() => match frame {
                    Some(frame) => frame,
                    None => return,
                },
            },
        };

        let sent = tokio::select! {
            _ = cancelled(&mut cancel) => return,
            sent = input.send(frame) => sent,
        };
        if sent.is_err() {
            return;
        }
    }
}

/// Log a frame that left the pipeline and decide whether the session is over
fn ends_session(frame: &Frame, session_id: &str, end: &'static str) -> bool {
    match frame {
        Frame::Error {
            message,
            fatal: true,
        } => {
            tracing::error!(session_id, end, error = %message, "Fatal error, cancelling task");
            true
        }
        Frame::Error { message, .. } => {
            tracing::warn!(session_id, end, error = %message, "Pipeline error");
            false
        }
        Frame::Cancel => true,
        other => {
            tracing::trace!(session_id, end, frame = other.name(), "Frame left pipeline");
            false
        }
    }
}

/// Hooks the host runs around a session
///
/// `on_session_start` runs before any transport audio is queued, so frames
/// it queues reach the pipeline first.
#[async_trait]
pub trait SessionHandler: Send + Sync + 'static {
    async fn on_session_start(&self, task: &TaskHandle, history: &ConversationHistory)
        -> Result<()>;

    async fn on_session_end(&self, _task: &TaskHandle, _outcome: TaskOutcome) {}
}

/// Starts the conversation without waiting for the user: appends a system
/// instruction and asks the LLM for the first assistant turn.
pub struct KickoffHandler {
    instruction: String,
}

impl KickoffHandler {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
        }
    }
}

#[async_trait]
impl SessionHandler for KickoffHandler {
    async fn on_session_start(
        &self,
        task: &TaskHandle,
        history: &ConversationHistory,
    ) -> Result<()> {
        history.push(Message::system(self.instruction.clone()));
        tracing::debug!(session_id = task.session_id(), "Queueing kickoff");
        task.queue_frame(Frame::LLMMessages(history.snapshot())).await
    }
}
