//! Frame processors for the pipeline
//!
//! This module contains FrameProcessor implementations for:
//! - SttProcessor: turn boundaries and transcription
//! - UserContextAggregator / AssistantContextAggregator: conversation history
//! - LlmProcessor: streamed responses
//! - TtsProcessor: sentence aggregation and synthesis
//! - OutputTransportProcessor: audio and events to the client
//! - Passthrough, Filter and Map utilities

mod aggregators;
mod llm;
mod passthrough;
mod sentence;
mod stt;
mod transport;
mod tts;

pub use aggregators::{AssistantContextAggregator, UserContextAggregator};
pub use llm::{LlmProcessor, LlmProcessorConfig};
pub use passthrough::{FilterProcessor, MapProcessor, PassthroughProcessor};
pub use sentence::SentenceAggregator;
pub use stt::{SttConfig, SttProcessor, TranscriptionOutcome};
pub use transport::OutputTransportProcessor;
pub use tts::{TtsProcessor, TtsProcessorConfig};
