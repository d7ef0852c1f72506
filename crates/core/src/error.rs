//! Error types shared across the workspace

use thiserror::Error;

/// Result alias used by the core traits
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// A remote collaborator (transcription, generation, synthesis) failed
    #[error("{service} error: {message}")]
    Collaborator { service: String, message: String },

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    /// The client connection dropped or refused a write
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Audio error: {0}")]
    Audio(String),
}

impl Error {
    /// Build a collaborator error for the named service
    pub fn collaborator(service: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Collaborator {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Whether the error should end the session rather than a single turn
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Config(_))
    }
}

/// Errors raised by the frame pipeline itself
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("Channel closed")]
    ChannelClosed,

    #[error("Processor {0} panicked")]
    Panicked(String),
}
