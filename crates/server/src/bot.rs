//! Per-session bot wiring
//!
//! Each connection gets its own history and pipeline:
//!
//! ```text
//! STT → user context → LLM → TTS → output transport → assistant context
//! ```
//!
//! The assistant aggregator sits behind the output transport so the history
//! only records responses that were actually sent.

use voicebot_config::Settings;
use voicebot_core::{ConversationHistory, Result, TransportInput, TransportOutput};
use voicebot_pipeline::{
    AssistantContextAggregator, KickoffHandler, LlmProcessor, LlmProcessorConfig,
    OutputTransportProcessor, Pipeline, PipelineRunner, PipelineTask, SttConfig, SttProcessor,
    TaskOutcome, TtsProcessor, TtsProcessorConfig, UserContextAggregator,
};
use voicebot_services::Services;

use crate::state::AppState;

/// Build the conversation pipeline for one session
pub fn build_pipeline(
    settings: &Settings,
    services: &Services,
    history: &ConversationHistory,
    output: Box<dyn TransportOutput>,
) -> Pipeline {
    Pipeline::builder("voicebot")
        .processor(SttProcessor::new(
            services.stt.clone(),
            SttConfig::from(settings),
        ))
        .processor(UserContextAggregator::new(history.clone()))
        .processor(LlmProcessor::new(
            services.llm.clone(),
            LlmProcessorConfig::from(settings),
        ))
        .processor(TtsProcessor::new(
            services.tts.clone(),
            TtsProcessorConfig::from(settings),
        ))
        .processor(OutputTransportProcessor::new(
            output,
            settings.transport.add_wav_header,
        ))
        .processor(AssistantContextAggregator::new(history.clone()))
        .channel_capacity(settings.pipeline.channel_capacity)
        .build()
}

/// Run one session to completion.
///
/// The assistant introduces itself before any client audio is processed.
/// Server shutdown cancels the session.
pub async fn run_bot<I: TransportInput>(
    state: &AppState,
    session_id: &str,
    input: I,
    output: Box<dyn TransportOutput>,
) -> Result<TaskOutcome> {
    let settings = &state.settings;
    let history = ConversationHistory::with_system_prompt(settings.agent.system_prompt.clone());
    let pipeline = build_pipeline(settings, &state.services, &history, output);

    tracing::debug!(
        session_id = %session_id,
        processors = ?pipeline.processor_names(),
        "Pipeline built"
    );

    let task = PipelineTask::new(pipeline, session_id)
        .with_drain_timeout(settings.pipeline.drain_timeout());

    let handle = task.handle();
    let mut shutdown = state.shutdown_signal();
    let watcher = tokio::spawn(async move {
        if shutdown.wait_for(|stop| *stop).await.is_ok() {
            tracing::info!(session_id = %handle.session_id(), "Server shutting down");
            handle.cancel();
        }
    });

    let runner = PipelineRunner::new()
        .with_handler(KickoffHandler::new(settings.agent.kickoff_instruction.clone()));
    let result = runner.run(task, input, history).await;

    watcher.abort();
    result
}
