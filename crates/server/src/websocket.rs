//! WebSocket transport
//!
//! Binary messages carry raw PCM16 mono audio at `transport.audio_in_sample_rate`.
//! Text messages are JSON:
//! - `{"type": "audio", "data": "<base64 PCM>"}`
//! - `{"type": "ping"}`
//! - `{"type": "end_session"}`
//!
//! The server answers with `session_info`, `transcript`, `response`, `error`
//! and `pong` events. Synthesized audio goes out as binary messages, or as
//! base64 `audio` events once the client has sent audio as JSON.

use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use voicebot_core::{AudioRaw, Error, Result, TransportEvent, TransportInput, TransportOutput};

use crate::session::SessionGuard;
use crate::state::AppState;
use crate::ServerError;

/// Messages accepted from the client
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Base64 PCM16 audio
    Audio { data: String },
    Ping,
    EndSession,
}

/// Events sent to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    SessionInfo { session_id: String },
    Transcript { text: String },
    Response { text: String },
    /// Base64 audio payload
    Audio { data: String },
    Error { message: String },
    Pong,
}

impl From<TransportEvent> for ServerEvent {
    fn from(event: TransportEvent) -> Self {
        match event {
            TransportEvent::Transcript { text } => ServerEvent::Transcript { text },
            TransportEvent::Response { text } => ServerEvent::Response { text },
            TransportEvent::Error { message } => ServerEvent::Error { message },
        }
    }
}

/// Write half shared by the input (for pongs) and the output
pub type SharedSink<Si> = Arc<Mutex<Si>>;

async fn send_message<Si>(sink: &SharedSink<Si>, message: Message) -> Result<()>
where
    Si: Sink<Message> + Unpin + Send,
    Si::Error: Display,
{
    sink.lock()
        .await
        .send(message)
        .await
        .map_err(|e| Error::Transport(e.to_string()))
}

async fn send_event<Si>(sink: &SharedSink<Si>, event: &ServerEvent) -> Result<()>
where
    Si: Sink<Message> + Unpin + Send,
    Si::Error: Display,
{
    let json = serde_json::to_string(event).map_err(|e| Error::Transport(e.to_string()))?;
    send_message(sink, Message::Text(json)).await
}

/// Inbound half of a WebSocket session
pub struct WebSocketInput<St, Si> {
    stream: St,
    sink: SharedSink<Si>,
    sample_rate: u32,
    json_audio: Arc<AtomicBool>,
}

#[async_trait]
impl<St, Si> TransportInput for WebSocketInput<St, Si>
where
    St: Stream<Item = std::result::Result<Message, axum::Error>> + Unpin + Send + 'static,
    Si: Sink<Message> + Unpin + Send + 'static,
    Si::Error: Display,
{
    async fn receive(&mut self) -> Option<Result<AudioRaw>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(Error::Transport(e.to_string()))),
            };

            match message {
                Message::Binary(data) if data.is_empty() => continue,
                Message::Binary(data) => return Some(Ok(AudioRaw::mono(data, self.sample_rate))),
                Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Audio { data }) => match BASE64.decode(data) {
                        Ok(bytes) => {
                            self.json_audio.store(true, Ordering::Relaxed);
                            return Some(Ok(AudioRaw::mono(bytes, self.sample_rate)));
                        }
                        Err(e) => tracing::warn!(error = %e, "Failed to decode audio data"),
                    },
                    Ok(ClientMessage::Ping) => {
                        if let Err(e) = send_event(&self.sink, &ServerEvent::Pong).await {
                            return Some(Err(e));
                        }
                    }
                    Ok(ClientMessage::EndSession) => {
                        tracing::info!("Client ended session");
                        return None;
                    }
                    Err(e) => tracing::warn!(error = %e, "Ignoring malformed client message"),
                },
                // Protocol pings are answered by the socket itself
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Close(_) => return None,
            }
        }
    }
}

/// Outbound half of a WebSocket session
pub struct WebSocketOutput<Si> {
    sink: SharedSink<Si>,
    json_audio: Arc<AtomicBool>,
}

#[async_trait]
impl<Si> TransportOutput for WebSocketOutput<Si>
where
    Si: Sink<Message> + Unpin + Send + 'static,
    Si::Error: Display,
{
    async fn send_audio(&mut self, audio: Vec<u8>) -> Result<()> {
        if self.json_audio.load(Ordering::Relaxed) {
            let event = ServerEvent::Audio {
                data: BASE64.encode(&audio),
            };
            send_event(&self.sink, &event).await
        } else {
            send_message(&self.sink, Message::Binary(audio)).await
        }
    }

    async fn send_event(&mut self, event: TransportEvent) -> Result<()> {
        send_event(&self.sink, &ServerEvent::from(event)).await
    }
}

/// Wrap the two halves of a socket as a transport
pub fn transport_pair<St, Si>(
    stream: St,
    sink: SharedSink<Si>,
    sample_rate: u32,
) -> (WebSocketInput<St, Si>, WebSocketOutput<Si>) {
    let json_audio = Arc::new(AtomicBool::new(false));
    (
        WebSocketInput {
            stream,
            sink: sink.clone(),
            sample_rate,
            json_audio: json_audio.clone(),
        },
        WebSocketOutput { sink, json_audio },
    )
}

/// `GET {server.ws_path}`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> std::result::Result<Response, ServerError> {
    let session = state.sessions.register()?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, session)))
}

async fn handle_socket(socket: WebSocket, state: AppState, session: SessionGuard) {
    let session_id = session.id().to_string();
    tracing::info!(session_id = %session_id, "WebSocket connected");

    let (sink, stream) = socket.split();
    let sink = Arc::new(Mutex::new(sink));

    let info = ServerEvent::SessionInfo {
        session_id: session_id.clone(),
    };
    if let Err(e) = send_event(&sink, &info).await {
        tracing::warn!(session_id = %session_id, error = %e, "Failed to send session info");
        return;
    }

    let (input, output) = transport_pair(
        stream,
        sink.clone(),
        state.settings.transport.audio_in_sample_rate,
    );

    match crate::bot::run_bot(&state, &session_id, input, Box::new(output)).await {
        Ok(outcome) => tracing::info!(session_id = %session_id, ?outcome, "Session finished"),
        Err(e) => tracing::error!(session_id = %session_id, error = %e, "Session failed"),
    }

    let _ = sink.lock().await.close().await;
    tracing::info!(session_id = %session_id, "WebSocket closed");
}
