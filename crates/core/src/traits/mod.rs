//! Core traits for the voicebot pipeline
//!
//! Remote collaborators and the transport sit behind these traits so the
//! pipeline can be driven by real services or by test doubles.
//!
//! ```text
//! Speech Processing:
//!   - SpeechToText: WAV → text
//!   - TextToSpeech: text → PCM audio
//!
//! Language Models:
//!   - LanguageModel: message history → streamed text
//!
//! Transport:
//!   - TransportInput / TransportOutput: client connection halves
//!
//! Pipeline:
//!   - FrameProcessor: one stage of the frame pipeline
//! ```

mod llm;
mod pipeline;
mod speech;
mod transport;

pub use llm::{LanguageModel, TextStream};
pub use pipeline::{FrameProcessor, ProcessorContext};
pub use speech::{SpeechToText, TextToSpeech};
pub use transport::{TransportEvent, TransportInput, TransportOutput};
