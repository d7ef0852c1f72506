//! Streaming chat completions

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use voicebot_config::ServicesConfig;
use voicebot_core::{LanguageModel, Message, Result, TextStream};

use crate::client::ApiClient;
use crate::sse::{SseDecoder, SseEvent};
use crate::ServiceError;

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ChunkError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkError {
    message: String,
}

/// Progress through one streamed response
struct StreamState {
    request: ChatRequest,
    body: Option<BoxStream<'static, reqwest::Result<Vec<u8>>>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    done: bool,
}

impl StreamState {
    /// Apply one decoded event; content fragments are queued in order
    fn apply(&mut self, event: SseEvent) -> std::result::Result<(), ServiceError> {
        let data = match event {
            SseEvent::Done => {
                self.done = true;
                return Ok(());
            }
            SseEvent::Data(_) if self.done => return Ok(()),
            SseEvent::Data(data) => data,
        };

        let chunk: ChatChunk = match serde_json::from_str(&data) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unparseable stream event");
                return Ok(());
            }
        };

        if let Some(error) = chunk.error {
            return Err(ServiceError::InvalidResponse(error.message));
        }

        self.pending.extend(
            chunk
                .choices
                .into_iter()
                .filter_map(|c| c.delta.content)
                .filter(|c| !c.is_empty()),
        );
        Ok(())
    }
}

/// OpenAI `/chat/completions` client streaming over SSE.
///
/// Transient failures are retried only while connecting. Once the response
/// body is streaming, an error ends the stream, so no fragment is ever
/// delivered twice.
pub struct OpenAiLlm {
    client: ApiClient,
    model: String,
    temperature: f32,
}

impl OpenAiLlm {
    pub fn new(client: ApiClient, config: &ServicesConfig) -> Self {
        Self {
            client,
            model: config.llm_model.clone(),
            temperature: config.temperature,
        }
    }

    fn request(&self, messages: Vec<Message>) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            stream: true,
        }
    }

    async fn next_fragment(&self, mut state: StreamState) -> Result<Option<(String, StreamState)>> {
        loop {
            if let Some(fragment) = state.pending.pop_front() {
                return Ok(Some((fragment, state)));
            }
            if state.done {
                return Ok(None);
            }

            if state.body.is_none() {
                let response = self
                    .client
                    .send(|| self.client.post("/chat/completions").json(&state.request))
                    .await
                    .map_err(|e| e.into_core(&self.model))?;
                state.body = Some(
                    response
                        .bytes_stream()
                        .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                        .boxed(),
                );
            }

            let Some(body) = state.body.as_mut() else {
                return Ok(None);
            };

            let events = match body.next().await {
                Some(Ok(chunk)) => state.decoder.feed(&chunk),
                Some(Err(e)) => return Err(ServiceError::from(e).into_core(&self.model)),
                None => {
                    state.done = true;
                    state.decoder.finish().into_iter().collect()
                }
            };

            for event in events {
                state.apply(event).map_err(|e| e.into_core(&self.model))?;
            }
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiLlm {
    fn generate_stream<'a>(&'a self, messages: Vec<Message>) -> TextStream<'a> {
        tracing::debug!(model = %self.model, messages = messages.len(), "Starting completion");

        let state = StreamState {
            request: self.request(messages),
            body: None,
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            done: false,
        };
        Box::pin(futures::stream::try_unfold(state, move |state| {
            self.next_fragment(state)
        }))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> StreamState {
        StreamState {
            request: ChatRequest {
                model: "gpt-4o-mini".into(),
                messages: vec![],
                temperature: 0.7,
                stream: true,
            },
            body: None,
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            done: false,
        }
    }

    #[test]
    fn test_request_serialization() {
        let request = ChatRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![Message::system("Be brief."), Message::user("Hi")],
            temperature: 0.5,
            stream: true,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "Hi");
        assert_eq!(json["temperature"], 0.5);
    }

    #[test]
    fn test_apply_collects_content() {
        let mut state = state();
        for data in [
            r#"{"choices":[{"delta":{"role":"assistant"}}]}"#,
            r#"{"choices":[{"delta":{"content":"Hel"}}]}"#,
            r#"{"choices":[{"delta":{"content":""}}]}"#,
            r#"{"choices":[{"delta":{"content":"lo"},"finish_reason":null}]}"#,
            r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
        ] {
            state.apply(SseEvent::Data(data.into())).unwrap();
        }
        state.apply(SseEvent::Done).unwrap();

        assert_eq!(state.pending, VecDeque::from(vec!["Hel".to_string(), "lo".to_string()]));
        assert!(state.done);
    }

    #[test]
    fn test_apply_ignores_events_after_done() {
        let mut state = state();
        state.apply(SseEvent::Done).unwrap();
        state
            .apply(SseEvent::Data(r#"{"choices":[{"delta":{"content":"late"}}]}"#.into()))
            .unwrap();
        assert!(state.pending.is_empty());
    }

    #[test]
    fn test_apply_surfaces_stream_error() {
        let mut state = state();
        let err = state
            .apply(SseEvent::Data(r#"{"error":{"message":"context too long"}}"#.into()))
            .unwrap_err();
        assert!(err.to_string().contains("context too long"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_apply_skips_garbage() {
        let mut state = state();
        state.apply(SseEvent::Data("not json".into())).unwrap();
        assert!(state.pending.is_empty());
    }
}
