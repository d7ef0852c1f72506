//! Core traits and types for the voicebot
//!
//! This crate provides foundational types used across all other crates:
//! - The closed frame model and frame directions
//! - The `FrameProcessor` trait and per-processor context
//! - Conversation history shared by the context aggregators
//! - Collaborator traits for transcription, generation and synthesis
//! - Transport boundary traits
//! - Error types

pub mod audio;
pub mod conversation;
pub mod error;
pub mod frame;
pub mod traits;

pub use audio::{encode_wav, AudioRaw, SUPPORTED_SAMPLE_RATES};
pub use conversation::{ConversationHistory, Message, Role};
pub use error::{Error, PipelineError, Result};
pub use frame::{Frame, FrameDirection, FrameKind};

pub use traits::{
    // Pipeline
    FrameProcessor, ProcessorContext,
    // Speech
    SpeechToText, TextToSpeech,
    // LLM
    LanguageModel, TextStream,
    // Transport
    TransportEvent, TransportInput, TransportOutput,
};
