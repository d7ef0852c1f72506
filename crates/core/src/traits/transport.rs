//! Transport boundary traits
//!
//! The pipeline core consumes a bidirectional channel to the caller. The
//! inbound half yields raw audio; the outbound half accepts audio and
//! user-visible events.

use async_trait::async_trait;
use serde::Serialize;

use crate::audio::AudioRaw;
use crate::Result;

/// Non-audio messages surfaced to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportEvent {
    /// What the user said
    Transcript { text: String },
    /// What the assistant said
    Response { text: String },
    /// A user-visible failure
    Error { message: String },
}

/// Inbound half of a client connection
#[async_trait]
pub trait TransportInput: Send + 'static {
    /// Next audio chunk from the client; `None` once the connection closed
    async fn receive(&mut self) -> Option<Result<AudioRaw>>;
}

/// Outbound half of a client connection
#[async_trait]
pub trait TransportOutput: Send + 'static {
    /// Send an audio payload (raw PCM or a WAV container)
    async fn send_audio(&mut self, audio: Vec<u8>) -> Result<()>;

    /// Send a user-visible event
    async fn send_event(&mut self, event: TransportEvent) -> Result<()>;
}
