//! Frame pipeline for real-time voice conversations
//!
//! This crate provides the pipeline engine and the processors that make up a
//! conversation:
//! - `Pipeline`: a linear chain of processors, one task each, connected by
//!   bounded downstream and unbounded upstream queues
//! - `PipelineTask` / `TaskHandle`: a single run of a pipeline with an
//!   external injection queue
//! - `PipelineRunner`: pumps transport audio into a task
//! - Processors: STT turn detection, user/assistant context aggregation,
//!   LLM streaming, TTS with sentence aggregation, output transport

pub mod metrics;
pub mod pipeline;
pub mod processors;
pub mod runner;
pub mod task;

pub use pipeline::{Pipeline, PipelineBuilder, PipelineIo};
pub use runner::PipelineRunner;
pub use task::{KickoffHandler, PipelineTask, SessionHandler, TaskHandle, TaskOutcome};

pub use processors::{
    AssistantContextAggregator, FilterProcessor, LlmProcessor, LlmProcessorConfig, MapProcessor,
    OutputTransportProcessor, PassthroughProcessor, SentenceAggregator, SttConfig, SttProcessor,
    TranscriptionOutcome, TtsProcessor, TtsProcessorConfig, UserContextAggregator,
};

use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("Channel closed")]
    ChannelClosed,

    #[error("Timeout after {0} ms")]
    Timeout(u64),
}

impl From<PipelineError> for voicebot_core::Error {
    fn from(err: PipelineError) -> Self {
        use voicebot_core::PipelineError as CorePipelineError;

        match err {
            PipelineError::ChannelClosed => CorePipelineError::ChannelClosed.into(),
            PipelineError::Timeout(ms) => voicebot_core::Error::Timeout(ms),
        }
    }
}
