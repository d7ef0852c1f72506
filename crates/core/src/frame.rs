//! Frame types that flow through the pipeline
//!
//! Every message moving between processors is a [`Frame`]. The set of kinds
//! is closed, so a processor that matches on `Frame` is forced to revisit its
//! dispatch whenever a kind is added.

use chrono::Utc;

use crate::audio::AudioRaw;
use crate::conversation::Message;

/// Direction a frame travels along the processor chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameDirection {
    /// Toward the end of the chain (processor list order)
    Downstream,
    /// Toward the start of the chain (reverse list order)
    Upstream,
}

impl std::fmt::Display for FrameDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameDirection::Downstream => write!(f, "downstream"),
            FrameDirection::Upstream => write!(f, "upstream"),
        }
    }
}

/// Discriminant of a [`Frame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Start,
    End,
    Cancel,
    AudioChunk,
    UserStartedSpeaking,
    UserStoppedSpeaking,
    Transcription,
    LLMMessages,
    LLMResponseStart,
    LLMResponseChunk,
    LLMResponseEnd,
    SynthesizedAudio,
    Error,
}

impl FrameKind {
    /// Stable name for logs and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameKind::Start => "start",
            FrameKind::End => "end",
            FrameKind::Cancel => "cancel",
            FrameKind::AudioChunk => "audio_chunk",
            FrameKind::UserStartedSpeaking => "user_started_speaking",
            FrameKind::UserStoppedSpeaking => "user_stopped_speaking",
            FrameKind::Transcription => "transcription",
            FrameKind::LLMMessages => "llm_messages",
            FrameKind::LLMResponseStart => "llm_response_start",
            FrameKind::LLMResponseChunk => "llm_response_chunk",
            FrameKind::LLMResponseEnd => "llm_response_end",
            FrameKind::SynthesizedAudio => "synthesized_audio",
            FrameKind::Error => "error",
        }
    }
}

/// A message flowing through the pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Session start; processors run `on_start` when it passes
    Start,
    /// Graceful end; processors run `on_stop`, forward it and exit
    End,
    /// Immediate teardown request
    Cancel,

    /// Raw caller audio
    AudioChunk(AudioRaw),

    /// Turn boundary: the user began an utterance
    UserStartedSpeaking,
    /// Turn boundary: the user finished an utterance
    UserStoppedSpeaking,

    /// Recognized user speech
    Transcription {
        text: String,
        language: Option<String>,
        /// ISO-8601 time the transcription was produced
        timestamp: String,
    },

    /// Full message history for the language model
    LLMMessages(Vec<Message>),

    /// A model response is starting
    LLMResponseStart,
    /// Incremental response text
    LLMResponseChunk { text: String },
    /// The model response is complete
    LLMResponseEnd,

    /// Synthesized assistant speech
    SynthesizedAudio(AudioRaw),

    /// User-visible failure
    Error { message: String, fatal: bool },
}

impl Frame {
    /// Build a transcription frame stamped with the current time
    pub fn transcription(text: impl Into<String>, language: Option<String>) -> Self {
        Frame::Transcription {
            text: text.into(),
            language,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Build a non-fatal error frame
    pub fn error(message: impl Into<String>) -> Self {
        Frame::Error {
            message: message.into(),
            fatal: false,
        }
    }

    /// Build a fatal error frame
    pub fn fatal_error(message: impl Into<String>) -> Self {
        Frame::Error {
            message: message.into(),
            fatal: true,
        }
    }

    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Start => FrameKind::Start,
            Frame::End => FrameKind::End,
            Frame::Cancel => FrameKind::Cancel,
            Frame::AudioChunk(_) => FrameKind::AudioChunk,
            Frame::UserStartedSpeaking => FrameKind::UserStartedSpeaking,
            Frame::UserStoppedSpeaking => FrameKind::UserStoppedSpeaking,
            Frame::Transcription { .. } => FrameKind::Transcription,
            Frame::LLMMessages(_) => FrameKind::LLMMessages,
            Frame::LLMResponseStart => FrameKind::LLMResponseStart,
            Frame::LLMResponseChunk { .. } => FrameKind::LLMResponseChunk,
            Frame::LLMResponseEnd => FrameKind::LLMResponseEnd,
            Frame::SynthesizedAudio(_) => FrameKind::SynthesizedAudio,
            Frame::Error { .. } => FrameKind::Error,
        }
    }

    /// Get the name for this frame type
    pub fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Lifecycle frames handled by the pipeline rather than by processors
    pub fn is_system(&self) -> bool {
        matches!(self, Frame::Start | Frame::End | Frame::Cancel)
    }

    /// Turn boundary frames
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            Frame::UserStartedSpeaking
                | Frame::UserStoppedSpeaking
                | Frame::LLMResponseStart
                | Frame::LLMResponseEnd
        )
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Frame::Error { .. })
    }

    pub fn is_fatal_error(&self) -> bool {
        matches!(self, Frame::Error { fatal: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_names() {
        assert_eq!(Frame::UserStartedSpeaking.name(), "user_started_speaking");
        assert_eq!(Frame::End.name(), "end");
        assert_eq!(
            Frame::LLMResponseChunk { text: "hi".into() }.kind(),
            FrameKind::LLMResponseChunk
        );
    }

    #[test]
    fn test_frame_predicates() {
        assert!(Frame::Start.is_system());
        assert!(!Frame::UserStoppedSpeaking.is_system());
        assert!(Frame::UserStoppedSpeaking.is_control());
        assert!(Frame::error("boom").is_error());
        assert!(!Frame::error("boom").is_fatal_error());
        assert!(Frame::fatal_error("socket closed").is_fatal_error());
    }

    #[test]
    fn test_transcription_timestamp() {
        match Frame::transcription("hello", None) {
            Frame::Transcription {
                text,
                language,
                timestamp,
            } => {
                assert_eq!(text, "hello");
                assert!(language.is_none());
                assert!(chrono::DateTime::parse_from_rfc3339(&timestamp).is_ok());
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }
}
