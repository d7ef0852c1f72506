//! End-to-end behaviour of a full conversation pipeline:
//! STT → user aggregator → LLM → TTS → output transport → assistant aggregator

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use voicebot_core::{
    AudioRaw, ConversationHistory, Error, Frame, FrameDirection, FrameProcessor, LanguageModel,
    Message, ProcessorContext, Result, Role, SpeechToText, TextStream, TextToSpeech,
    TransportEvent, TransportInput, TransportOutput,
};
use voicebot_pipeline::{
    AssistantContextAggregator, KickoffHandler, LlmProcessor, LlmProcessorConfig,
    OutputTransportProcessor, Pipeline, PipelineRunner, PipelineTask, SessionHandler, SttConfig,
    SttProcessor, TaskOutcome, TtsProcessor, TtsProcessorConfig, UserContextAggregator,
};

const SYSTEM_PROMPT: &str = "You are a helpful voice assistant.";
const KICKOFF: &str = "Please introduce yourself to the user.";

/// Scripted transcription results
enum SttScript {
    Text(&'static str),
    Fail(&'static str),
    Slow,
}

struct MockStt {
    script: Mutex<VecDeque<SttScript>>,
}

impl MockStt {
    fn new(script: Vec<SttScript>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
        })
    }
}

#[async_trait]
impl SpeechToText for MockStt {
    async fn transcribe(&self, _wav: Vec<u8>, _language: &str) -> Result<String> {
        let next = self.script.lock().pop_front();
        match next {
            Some(SttScript::Text(text)) => Ok(text.to_string()),
            Some(SttScript::Fail(reason)) => Err(Error::collaborator("whisper", reason)),
            Some(SttScript::Slow) => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok("never".to_string())
            }
            None => Ok(String::new()),
        }
    }

    fn model_name(&self) -> &str {
        "mock-whisper"
    }
}

struct MockLlm {
    calls: Mutex<Vec<Vec<Message>>>,
    notify: mpsc::UnboundedSender<usize>,
}

#[async_trait]
impl LanguageModel for MockLlm {
    fn generate_stream<'a>(&'a self, messages: Vec<Message>) -> TextStream<'a> {
        let reply = match messages.iter().rev().find(|m| m.role == Role::User) {
            Some(user) => format!("You said {}. ", user.content),
            None => "Hello! I am your assistant. ".to_string(),
        };
        let mut calls = self.calls.lock();
        calls.push(messages);
        let _ = self.notify.send(calls.len());

        let fragments: Vec<Result<String>> = reply
            .split_inclusive(' ')
            .map(|s| Ok(s.to_string()))
            .collect();
        Box::pin(futures::stream::iter(fragments))
    }

    fn model_name(&self) -> &str {
        "mock-llm"
    }
}

struct MockTts;

#[async_trait]
impl TextToSpeech for MockTts {
    async fn synthesize(&self, text: &str) -> Result<AudioRaw> {
        Ok(AudioRaw::from_samples(&vec![0i16; text.len() * 10], 24000))
    }

    fn sample_rate(&self) -> u32 {
        24000
    }

    fn model_name(&self) -> &str {
        "mock-tts"
    }
}

#[derive(Default)]
struct Sent {
    audio: Vec<Vec<u8>>,
    events: Vec<TransportEvent>,
}

struct MockOutput {
    sent: Arc<Mutex<Sent>>,
}

#[async_trait]
impl TransportOutput for MockOutput {
    async fn send_audio(&mut self, audio: Vec<u8>) -> Result<()> {
        self.sent.lock().audio.push(audio);
        Ok(())
    }

    async fn send_event(&mut self, event: TransportEvent) -> Result<()> {
        self.sent.lock().events.push(event);
        Ok(())
    }
}

/// Records every downstream frame leaving the STT stage
struct Recorder {
    frames: Arc<Mutex<Vec<Frame>>>,
}

#[async_trait]
impl FrameProcessor for Recorder {
    async fn process(
        &mut self,
        frame: Frame,
        direction: FrameDirection,
        ctx: &mut ProcessorContext,
    ) -> Result<()> {
        if direction == FrameDirection::Downstream {
            self.frames.lock().push(frame.clone());
        }
        ctx.push(frame, direction).await
    }

    fn name(&self) -> &'static str {
        "recorder"
    }
}

struct Harness {
    history: ConversationHistory,
    llm: Arc<MockLlm>,
    llm_calls: mpsc::UnboundedReceiver<usize>,
    sent: Arc<Mutex<Sent>>,
    after_stt: Arc<Mutex<Vec<Frame>>>,
    task: PipelineTask,
}

fn harness(script: Vec<SttScript>, stt_timeout: Duration) -> Harness {
    let history = ConversationHistory::with_system_prompt(SYSTEM_PROMPT);
    let stt = MockStt::new(script);
    let (notify, llm_calls) = mpsc::unbounded_channel();
    let llm = Arc::new(MockLlm {
        calls: Mutex::new(Vec::new()),
        notify,
    });
    let sent = Arc::new(Mutex::new(Sent::default()));
    let after_stt = Arc::new(Mutex::new(Vec::new()));

    let pipeline = Pipeline::builder("conversation")
        .processor(SttProcessor::new(
            stt,
            SttConfig {
                timeout: stt_timeout,
                ..Default::default()
            },
        ))
        .processor(Recorder {
            frames: after_stt.clone(),
        })
        .processor(UserContextAggregator::new(history.clone()))
        .processor(LlmProcessor::new(llm.clone(), LlmProcessorConfig::default()))
        .processor(TtsProcessor::new(Arc::new(MockTts), TtsProcessorConfig::default()))
        .processor(OutputTransportProcessor::new(
            Box::new(MockOutput { sent: sent.clone() }),
            true,
        ))
        .processor(AssistantContextAggregator::new(history.clone()))
        .channel_capacity(4)
        .build();

    Harness {
        history,
        llm,
        llm_calls,
        sent,
        after_stt,
        task: PipelineTask::new(pipeline, "test-session"),
    }
}

fn utterance() -> Frame {
    Frame::AudioChunk(AudioRaw::from_samples(&[100i16; 1600], 16000))
}

/// Queue the frames, then `End`, and run the task to completion
async fn run_to_end(harness: &mut Harness, frames: Vec<Frame>) -> TaskOutcome {
    let task = std::mem::replace(
        &mut harness.task,
        PipelineTask::new(Pipeline::new("spent"), "spent"),
    );
    let handle = task.handle();
    let run = tokio::spawn(task.run());
    handle.queue_frames(frames).await.unwrap();
    handle.stop_when_done().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("task should finish")
        .unwrap()
}

#[tokio::test]
async fn test_single_turn_round_trip() {
    let mut h = harness(vec![SttScript::Text("hello")], Duration::from_secs(5));

    let outcome = run_to_end(&mut h, vec![utterance()]).await;
    assert_eq!(outcome, TaskOutcome::Completed);

    let frames = h.after_stt.lock().clone();
    assert_eq!(frames[0], Frame::UserStartedSpeaking);
    assert_eq!(frames[1], Frame::UserStoppedSpeaking);
    assert!(matches!(
        &frames[2],
        Frame::Transcription { text, language: None, .. } if text == "hello"
    ));

    assert_eq!(
        h.history.snapshot(),
        vec![
            Message::system(SYSTEM_PROMPT),
            Message::user("hello"),
            Message::assistant("You said hello."),
        ]
    );

    let sent = h.sent.lock();
    assert!(!sent.audio.is_empty());
    assert!(sent.audio.iter().all(|a| &a[0..4] == b"RIFF"));
    assert_eq!(
        sent.events,
        vec![
            TransportEvent::Transcript {
                text: "hello".into()
            },
            TransportEvent::Response {
                text: "You said hello.".into()
            },
        ]
    );
}

#[tokio::test]
async fn test_turn_order_preserved() {
    let mut h = harness(
        vec![
            SttScript::Text("one"),
            SttScript::Text("two"),
            SttScript::Text("three"),
        ],
        Duration::from_secs(5),
    );

    run_to_end(&mut h, vec![utterance(), utterance(), utterance()]).await;

    let transcripts: Vec<_> = h
        .after_stt
        .lock()
        .iter()
        .filter_map(|f| match f {
            Frame::Transcription { text, .. } => Some(text.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(transcripts, vec!["one", "two", "three"]);

    let users: Vec<_> = h
        .history
        .snapshot()
        .into_iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content)
        .collect();
    assert_eq!(users, vec!["one", "two", "three"]);
}

#[tokio::test]
async fn test_turn_boundary_is_atomic() {
    let mut h = harness(
        vec![SttScript::Text("a"), SttScript::Text("   "), SttScript::Text("b")],
        Duration::from_secs(5),
    );

    run_to_end(&mut h, vec![utterance(), utterance(), utterance()]).await;

    let frames = h.after_stt.lock().clone();
    let starts = frames
        .iter()
        .filter(|f| matches!(f, Frame::UserStartedSpeaking))
        .count();
    assert_eq!(starts, 3);
    for (i, frame) in frames.iter().enumerate() {
        if matches!(frame, Frame::UserStartedSpeaking) {
            assert_eq!(frames.get(i + 1), Some(&Frame::UserStoppedSpeaking));
        }
    }
}

#[tokio::test]
async fn test_empty_transcription_changes_nothing() {
    let mut h = harness(vec![SttScript::Text("  \n ")], Duration::from_secs(5));
    let before = h.history.len();

    run_to_end(&mut h, vec![utterance()]).await;

    let frames = h.after_stt.lock().clone();
    assert!(!frames
        .iter()
        .any(|f| matches!(f, Frame::Transcription { .. })));
    assert_eq!(h.history.len(), before);
    assert!(h.llm.calls.lock().is_empty());
}

#[tokio::test]
async fn test_failure_is_contained() {
    let mut h = harness(
        vec![SttScript::Fail("invalid api key"), SttScript::Text("still here")],
        Duration::from_secs(5),
    );

    let outcome = run_to_end(&mut h, vec![utterance(), utterance()]).await;
    assert_eq!(outcome, TaskOutcome::Completed);

    let frames = h.after_stt.lock().clone();
    let errors: Vec<_> = frames.iter().filter(|f| f.is_error()).collect();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], Frame::Error { fatal: false, .. }));
    assert!(frames
        .iter()
        .any(|f| matches!(f, Frame::Transcription { text, .. } if text == "still here")));

    assert_eq!(h.history.count_role(Role::User), 1);
    assert!(h
        .sent
        .lock()
        .events
        .iter()
        .any(|e| matches!(e, TransportEvent::Error { message } if message.contains("invalid api key"))));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_contained() {
    let mut h = harness(
        vec![SttScript::Slow, SttScript::Text("after timeout")],
        Duration::from_millis(500),
    );

    run_to_end(&mut h, vec![utterance(), utterance()]).await;

    let frames = h.after_stt.lock().clone();
    assert_eq!(frames.iter().filter(|f| f.is_error()).count(), 1);
    assert_eq!(h.history.last(), Some(Message::assistant("You said after timeout.")));
}

struct ChannelInput {
    rx: mpsc::Receiver<Result<AudioRaw>>,
}

#[async_trait]
impl TransportInput for ChannelInput {
    async fn receive(&mut self) -> Option<Result<AudioRaw>> {
        self.rx.recv().await
    }
}

#[tokio::test]
async fn test_kickoff_precedes_user_audio() {
    let mut h = harness(vec![SttScript::Text("hello")], Duration::from_secs(5));
    let task = std::mem::replace(&mut h.task, PipelineTask::new(Pipeline::new("spent"), "spent"));

    // Audio is already waiting when the session starts
    let (audio_tx, audio_rx) = mpsc::channel(4);
    audio_tx
        .send(Ok(AudioRaw::from_samples(&[100i16; 1600], 16000)))
        .await
        .unwrap();

    let runner = PipelineRunner::new().with_handler(KickoffHandler::new(KICKOFF));
    let history = h.history.clone();
    let session = tokio::spawn(async move {
        runner
            .run(task, ChannelInput { rx: audio_rx }, history)
            .await
    });

    // Wait for the kickoff response and the reply to the user
    for _ in 0..2 {
        tokio::time::timeout(Duration::from_secs(5), h.llm_calls.recv())
            .await
            .expect("LLM should be invoked")
            .unwrap();
    }
    drop(audio_tx);
    let outcome = session.await.unwrap().unwrap();
    assert_eq!(outcome, TaskOutcome::Completed);

    let calls = h.llm.calls.lock();
    assert_eq!(
        calls[0],
        vec![Message::system(SYSTEM_PROMPT), Message::system(KICKOFF)]
    );
    assert!(calls[0].iter().all(|m| m.role != Role::User));
    assert_eq!(calls[1][1], Message::system(KICKOFF));
    assert_eq!(calls[1].last(), Some(&Message::user("hello")));
}

#[tokio::test]
async fn test_kickoff_handler_is_a_session_handler() {
    let history = ConversationHistory::with_system_prompt(SYSTEM_PROMPT);
    let task = PipelineTask::new(Pipeline::new("empty"), "s");
    let handle = task.handle();
    let handler: Arc<dyn SessionHandler> = Arc::new(KickoffHandler::new(KICKOFF));

    handler.on_session_start(&handle, &history).await.unwrap();
    assert_eq!(history.last(), Some(Message::system(KICKOFF)));
}
