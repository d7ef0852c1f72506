//! Pipeline runner
//!
//! Drives one session: runs the session handlers, starts the task and pumps
//! transport audio into it until the client goes away or the task ends.
//! When the client goes away, frames already queued are drained within the
//! task's drain timeout.

use std::sync::Arc;

use voicebot_core::{
    ConversationHistory, Error, Frame, PipelineError, Result, TransportInput,
};

use crate::task::{PipelineTask, SessionHandler, TaskHandle, TaskOutcome};

/// Runs pipeline tasks against a transport
#[derive(Default)]
pub struct PipelineRunner {
    handlers: Vec<Arc<dyn SessionHandler>>,
}

enum Pump {
    Finished(std::result::Result<TaskOutcome, tokio::task::JoinError>),
    Received(Option<Result<voicebot_core::AudioRaw>>),
}

impl PipelineRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; handlers run in registration order
    pub fn with_handler(mut self, handler: impl SessionHandler) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn with_shared_handler(mut self, handler: Arc<dyn SessionHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Run `task` to completion, feeding it audio from `input`.
    ///
    /// Session handlers run before the first audio chunk is queued. A closed
    /// or failing transport stops the task once in-flight frames drained, or
    /// cancels it when the drain timeout expires.
    pub async fn run<I: TransportInput>(
        &self,
        task: PipelineTask,
        mut input: I,
        history: ConversationHistory,
    ) -> Result<TaskOutcome> {
        let handle = task.handle();
        let session_id = handle.session_id().to_string();

        for handler in &self.handlers {
            if let Err(e) = handler.on_session_start(&handle, &history).await {
                tracing::error!(session_id = %session_id, error = %e, "Session start handler failed");
                return Err(e);
            }
        }

        let mut join = tokio::spawn(task.run());

        let joined = loop {
            let event = tokio::select! {
                result = &mut join => Pump::Finished(result),
                received = input.receive() => Pump::Received(received),
            };

            match event {
                Pump::Finished(result) => break result,
                Pump::Received(Some(Ok(audio))) => {
                    if handle.queue_frame(Frame::AudioChunk(audio)).await.is_err() {
                        break join.await;
                    }
                }
                Pump::Received(Some(Err(e))) => {
                    tracing::warn!(session_id = %session_id, error = %e, "Transport receive failed");
                    break drain(&handle, join).await;
                }
                Pump::Received(None) => {
                    tracing::info!(session_id = %session_id, "Client disconnected");
                    break drain(&handle, join).await;
                }
            }
        };

        let outcome = joined.map_err(|e| {
            tracing::error!(session_id = %session_id, error = %e, "Pipeline task failed");
            Error::from(PipelineError::Panicked("pipeline task".to_string()))
        })?;

        for handler in &self.handlers {
            handler.on_session_end(&handle, outcome).await;
        }

        Ok(outcome)
    }
}

/// Stop the task behind everything already queued and wait for it.
/// `stop_when_done` fails once the task cancelled itself, which ends the
/// run just the same.
async fn drain(
    handle: &TaskHandle,
    join: tokio::task::JoinHandle<TaskOutcome>,
) -> std::result::Result<TaskOutcome, tokio::task::JoinError> {
    if handle.stop_when_done().await.is_err() {
        tracing::debug!(session_id = handle.session_id(), "Task already stopped");
    }
    join.await
}
