//! Pipeline metrics
//!
//! Thin wrappers over the `metrics` facade. Nothing here sits on the data
//! path; without an installed recorder every call is a no-op.

use std::time::{Duration, Instant};

/// Time-to-first-byte histogram, labelled by processor
pub const TTFB_SECONDS: &str = "voicebot_ttfb_seconds";
/// Frames that reached the end of a pipeline, labelled by kind
pub const FRAMES_TOTAL: &str = "voicebot_frames_total";
/// Error frames raised, labelled by processor
pub const ERRORS_TOTAL: &str = "voicebot_errors_total";
/// Sessions currently running
pub const SESSIONS_ACTIVE: &str = "voicebot_sessions_active";

/// Time-to-first-byte measurement for one collaborator call
#[derive(Debug)]
pub struct TtfbMetric {
    processor: &'static str,
    started: Option<Instant>,
}

impl TtfbMetric {
    pub fn new(processor: &'static str) -> Self {
        Self {
            processor,
            started: None,
        }
    }

    /// Start timing; restarts if already running
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Stop timing and record. Returns `None` if not started.
    pub fn stop(&mut self) -> Option<Duration> {
        let elapsed = self.started.take()?.elapsed();
        metrics::histogram!(TTFB_SECONDS, "processor" => self.processor)
            .record(elapsed.as_secs_f64());
        tracing::debug!(
            processor = self.processor,
            ttfb_ms = elapsed.as_millis() as u64,
            "TTFB"
        );
        Some(elapsed)
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }
}

/// Register descriptions with the installed recorder
pub fn describe() {
    metrics::describe_histogram!(
        TTFB_SECONDS,
        metrics::Unit::Seconds,
        "Time to first byte of transcription, generation and synthesis calls"
    );
    metrics::describe_counter!(FRAMES_TOTAL, "Frames that reached the pipeline sink");
    metrics::describe_counter!(ERRORS_TOTAL, "Error frames raised by processors");
    metrics::describe_gauge!(SESSIONS_ACTIVE, "Pipeline sessions currently running");
}

pub fn record_frame(kind: &'static str) {
    metrics::counter!(FRAMES_TOTAL, "kind" => kind).increment(1);
}

pub fn record_error(processor: &'static str) {
    metrics::counter!(ERRORS_TOTAL, "processor" => processor).increment(1);
}

pub fn session_started() {
    metrics::gauge!(SESSIONS_ACTIVE).increment(1.0);
}

pub fn session_ended() {
    metrics::gauge!(SESSIONS_ACTIVE).decrement(1.0);
}
