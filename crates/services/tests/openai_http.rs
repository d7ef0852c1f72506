//! HTTP behaviour of the OpenAI collaborators against a local mock server

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use voicebot_config::ServicesConfig;
use voicebot_core::{
    AudioRaw, ConversationHistory, Frame, FrameDirection, FrameProcessor, LanguageModel, Message,
    ProcessorContext, Role, SpeechToText, TextToSpeech,
};
use voicebot_pipeline::{
    Pipeline, PipelineTask, SttConfig, SttProcessor, TaskOutcome, UserContextAggregator,
};
use voicebot_services::{ApiClient, OpenAiLlm, OpenAiStt, OpenAiTts};

#[derive(Clone)]
struct Canned {
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
    /// Advertise more body than is sent, then close the connection
    truncated: bool,
}

impl Canned {
    fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.as_bytes().to_vec(),
            truncated: false,
        }
    }

    fn sse(events: &[&str]) -> Self {
        let body: String = events.iter().map(|e| format!("data: {}\n\n", e)).collect();
        Self {
            status: 200,
            content_type: "text/event-stream",
            body: body.into_bytes(),
            truncated: false,
        }
    }
}

#[derive(Debug, Clone)]
struct Recorded {
    request_line: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Recorded {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}

/// Serves one canned response per connection, in order
struct MockServer {
    base_url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockServer {
    async fn start(responses: Vec<Canned>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = requests.clone();

        tokio::spawn(async move {
            for canned in responses {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let request = read_request(&mut socket).await;
                recorded.lock().unwrap().push(request);
                write_response(&mut socket, &canned).await;
            }
        });

        Self {
            base_url: format!("http://{}/v1", addr),
            requests,
        }
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    fn config(&self) -> ServicesConfig {
        ServicesConfig {
            api_key: "sk-test".into(),
            base_url: self.base_url.clone(),
            timeout_ms: 5000,
            max_retries: 2,
            ..Default::default()
        }
    }

    fn client(&self) -> ApiClient {
        ApiClient::new(&self.config())
            .unwrap()
            .with_initial_backoff(Duration::from_millis(5))
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

async fn read_request(socket: &mut TcpStream) -> Recorded {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break buf.len();
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok());
    let chunked = headers
        .iter()
        .any(|(k, v)| k == "transfer-encoding" && v.contains("chunked"));

    let mut body = buf[header_end..].to_vec();
    loop {
        let complete = match content_length {
            Some(len) => body.len() >= len,
            None if chunked => body.ends_with(b"0\r\n\r\n"),
            None => true,
        };
        if complete {
            break;
        }
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Recorded {
        request_line,
        headers,
        body,
    }
}

async fn write_response(socket: &mut TcpStream, canned: &Canned) {
    let reason = match canned.status {
        200 => "OK",
        401 => "Unauthorized",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    };
    let length = if canned.truncated {
        canned.body.len() + 1024
    } else {
        canned.body.len()
    };
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        canned.status, reason, canned.content_type, length
    );

    let _ = socket.write_all(head.as_bytes()).await;
    let _ = socket.write_all(&canned.body).await;
    let _ = socket.flush().await;
    let _ = socket.shutdown().await;
}

async fn collect(llm: &OpenAiLlm, messages: Vec<Message>) -> Vec<Result<String, String>> {
    llm.generate_stream(messages)
        .map(|r| r.map_err(|e| e.to_string()))
        .collect()
        .await
}

#[tokio::test]
async fn test_transcription_request() {
    let server = MockServer::start(vec![Canned::json(200, r#"{"text":"Hello there."}"#)]).await;
    let stt = OpenAiStt::new(server.client(), &server.config());

    let text = stt.transcribe(b"RIFF....WAVE".to_vec(), "en").await.unwrap();
    assert_eq!(text, "Hello there.");

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.request_line, "POST /v1/audio/transcriptions HTTP/1.1");
    assert_eq!(request.header("authorization"), Some("Bearer sk-test"));
    assert!(request
        .header("content-type")
        .unwrap_or_default()
        .starts_with("multipart/form-data"));

    let body = request.body_text();
    assert!(body.contains("name=\"model\""));
    assert!(body.contains("whisper-1"));
    assert!(body.contains("name=\"language\""));
    assert!(body.contains("filename=\"audio.wav\""));
    assert!(body.contains("RIFF....WAVE"));
}

#[tokio::test]
async fn test_transcription_auth_failure_is_not_retried() {
    let server = MockServer::start(vec![
        Canned::json(401, r#"{"error":{"message":"Incorrect API key provided"}}"#),
        Canned::json(200, r#"{"text":"unreachable"}"#),
    ])
    .await;
    let stt = OpenAiStt::new(server.client(), &server.config());

    let err = stt.transcribe(vec![0; 44], "en").await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "whisper-1 error: HTTP 401: Incorrect API key provided"
    );
    assert_eq!(server.requests().len(), 1);
}

/// Records downstream frames leaving the STT stage
struct FrameLog {
    frames: Arc<Mutex<Vec<Frame>>>,
}

#[async_trait]
impl FrameProcessor for FrameLog {
    async fn process(
        &mut self,
        frame: Frame,
        direction: FrameDirection,
        ctx: &mut ProcessorContext,
    ) -> voicebot_core::Result<()> {
        if direction == FrameDirection::Downstream {
            self.frames.lock().unwrap().push(frame.clone());
        }
        ctx.push(frame, direction).await
    }

    fn name(&self) -> &'static str {
        "frame_log"
    }
}

#[tokio::test]
async fn test_retried_transcription_adds_one_user_message() {
    let server = MockServer::start(vec![
        Canned::json(503, r#"{"error":{"message":"overloaded"}}"#),
        Canned::json(200, r#"{"text":"hello"}"#),
    ])
    .await;
    let stt = Arc::new(OpenAiStt::new(server.client(), &server.config()));
    let history = ConversationHistory::with_system_prompt("Be brief.");
    let frames = Arc::new(Mutex::new(Vec::new()));

    let pipeline = Pipeline::builder("retry")
        .processor(SttProcessor::new(stt, SttConfig::default()))
        .processor(FrameLog {
            frames: frames.clone(),
        })
        .processor(UserContextAggregator::new(history.clone()))
        .build();
    let task = PipelineTask::new(pipeline, "retry-session");
    let handle = task.handle();

    handle
        .queue_frame(Frame::AudioChunk(AudioRaw::from_samples(&[100i16; 1600], 16000)))
        .await
        .unwrap();
    handle.stop_when_done().await.unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(5), task.run())
        .await
        .expect("task should finish");
    assert_eq!(outcome, TaskOutcome::Completed);

    assert_eq!(server.requests().len(), 2);
    let transcriptions: Vec<_> = frames
        .lock()
        .unwrap()
        .iter()
        .filter(|f| matches!(f, Frame::Transcription { .. }))
        .cloned()
        .collect();
    assert_eq!(transcriptions.len(), 1);
    assert!(matches!(&transcriptions[0], Frame::Transcription { text, .. } if text == "hello"));
    assert_eq!(history.count_role(Role::User), 1);
    assert_eq!(history.last(), Some(Message::user("hello")));
}

#[tokio::test]
async fn test_streamed_completion() {
    let server = MockServer::start(vec![Canned::sse(&[
        r#"{"choices":[{"delta":{"role":"assistant","content":""}}]}"#,
        r#"{"choices":[{"delta":{"content":"Hello"}}]}"#,
        r#"{"choices":[{"delta":{"content":", I am"}}]}"#,
        r#"{"choices":[{"delta":{"content":" your assistant."}}]}"#,
        r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
        "[DONE]",
    ])])
    .await;
    let llm = OpenAiLlm::new(server.client(), &server.config());

    let fragments = collect(
        &llm,
        vec![Message::system("Be brief."), Message::user("Who are you?")],
    )
    .await;
    assert_eq!(
        fragments,
        vec![
            Ok("Hello".to_string()),
            Ok(", I am".to_string()),
            Ok(" your assistant.".to_string()),
        ]
    );

    let request = &server.requests()[0];
    assert_eq!(request.request_line, "POST /v1/chat/completions HTTP/1.1");
    let json: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(json["model"], "gpt-4o-mini");
    assert_eq!(json["stream"], true);
    assert_eq!(json["messages"][1]["role"], "user");
    assert_eq!(json["messages"][1]["content"], "Who are you?");
}

#[tokio::test]
async fn test_completion_retries_before_first_fragment() {
    let server = MockServer::start(vec![
        Canned::json(503, r#"{"error":{"message":"overloaded"}}"#),
        Canned::sse(&[r#"{"choices":[{"delta":{"content":"Hi."}}]}"#, "[DONE]"]),
    ])
    .await;
    let llm = OpenAiLlm::new(server.client(), &server.config());

    let fragments = collect(&llm, vec![Message::user("Hello")]).await;
    assert_eq!(fragments, vec![Ok("Hi.".to_string())]);
    assert_eq!(server.requests().len(), 2);
}

#[tokio::test]
async fn test_completion_retries_exhausted() {
    let server = MockServer::start(vec![
        Canned::json(500, "oops"),
        Canned::json(500, "oops"),
        Canned::json(500, "still oops"),
    ])
    .await;
    let llm = OpenAiLlm::new(server.client(), &server.config());

    let fragments = collect(&llm, vec![Message::user("Hello")]).await;
    assert_eq!(
        fragments,
        vec![Err("gpt-4o-mini error: HTTP 500: still oops".to_string())]
    );
    assert_eq!(server.requests().len(), 3);
}

#[tokio::test]
async fn test_mid_stream_failure_is_not_replayed() {
    let mut canned = Canned::sse(&[r#"{"choices":[{"delta":{"content":"Hel"}}]}"#]);
    canned.truncated = true;
    let server = MockServer::start(vec![
        canned,
        Canned::sse(&[r#"{"choices":[{"delta":{"content":"Hello"}}]}"#, "[DONE]"]),
    ])
    .await;
    let llm = OpenAiLlm::new(server.client(), &server.config());

    let fragments = collect(&llm, vec![Message::user("Hello")]).await;
    assert_eq!(fragments.len(), 2);
    assert_eq!(fragments[0], Ok("Hel".to_string()));
    assert!(fragments[1].is_err());
    assert_eq!(server.requests().len(), 1);
}

#[tokio::test]
async fn test_speech_synthesis() {
    let pcm: Vec<u8> = [1i16, -1, 300].iter().flat_map(|s| s.to_le_bytes()).collect();
    let server = MockServer::start(vec![Canned {
        status: 200,
        content_type: "application/octet-stream",
        body: pcm.clone(),
        truncated: false,
    }])
    .await;
    let tts = OpenAiTts::new(server.client(), &server.config());

    let audio = tts.synthesize("Hello there.").await.unwrap();
    assert_eq!(audio.data, pcm);
    assert_eq!(audio.sample_rate, 24000);
    assert_eq!(audio.num_frames(), 3);

    let request = &server.requests()[0];
    assert_eq!(request.request_line, "POST /v1/audio/speech HTTP/1.1");
    let json: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(json["input"], "Hello there.");
    assert_eq!(json["voice"], "fable");
    assert_eq!(json["response_format"], "pcm");
}
