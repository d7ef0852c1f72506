//! Main settings module

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use voicebot_core::SUPPORTED_SAMPLE_RATES;

use crate::{AgentConfig, ConfigError};

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Client audio configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Remote collaborator configuration
    #[serde(default)]
    pub services: ServicesConfig,

    /// Pipeline execution configuration
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Conversation prompts
    #[serde(default)]
    pub agent: AgentConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    ///
    /// A failure here aborts startup before any session is accepted.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_transport()?;
        self.validate_services()?;
        self.validate_pipeline()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }

        if self.server.max_sessions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.max_sessions".to_string(),
                message: "Must allow at least 1 session".to_string(),
            });
        }

        if !self.server.ws_path.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "server.ws_path".to_string(),
                message: format!("Must start with '/', got {}", self.server.ws_path),
            });
        }

        Ok(())
    }

    fn validate_transport(&self) -> Result<(), ConfigError> {
        for (field, rate) in [
            ("transport.audio_in_sample_rate", self.transport.audio_in_sample_rate),
            ("transport.audio_out_sample_rate", self.transport.audio_out_sample_rate),
        ] {
            if !SUPPORTED_SAMPLE_RATES.contains(&rate) {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!(
                        "Unsupported sample rate {}, expected one of {:?}",
                        rate, SUPPORTED_SAMPLE_RATES
                    ),
                });
            }
        }

        Ok(())
    }

    fn validate_services(&self) -> Result<(), ConfigError> {
        let services = &self.services;

        if services.api_key.trim().is_empty() {
            return Err(ConfigError::MissingField(
                "services.api_key (or OPENAI_API_KEY)".to_string(),
            ));
        }

        if services.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "services.timeout_ms".to_string(),
                message: "Timeout must be at least 1 ms".to_string(),
            });
        }

        if !(0.0..=2.0).contains(&services.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "services.temperature".to_string(),
                message: format!("Must be between 0.0 and 2.0, got {}", services.temperature),
            });
        }

        Ok(())
    }

    fn validate_pipeline(&self) -> Result<(), ConfigError> {
        if self.pipeline.channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.channel_capacity".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if self.pipeline.drain_timeout_ms > 60_000 {
            tracing::warn!(
                "pipeline.drain_timeout_ms ({}) is above one minute, session teardown may be slow",
                self.pipeline.drain_timeout_ms
            );
        }

        Ok(())
    }
}

/// HTTP / WebSocket server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// WebSocket path
    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    /// Maximum concurrent sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8765
}
fn default_ws_path() -> String {
    "/ws".to_string()
}
fn default_max_sessions() -> usize {
    100
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_path: default_ws_path(),
            max_sessions: default_max_sessions(),
        }
    }
}

/// Audio format negotiated with the client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Sample rate of inbound caller audio
    #[serde(default = "default_audio_in_sample_rate")]
    pub audio_in_sample_rate: u32,

    /// Sample rate of outbound synthesized audio
    #[serde(default = "default_audio_out_sample_rate")]
    pub audio_out_sample_rate: u32,

    /// Wrap outbound audio in a WAV container
    #[serde(default = "default_true")]
    pub add_wav_header: bool,
}

fn default_audio_in_sample_rate() -> u32 {
    16000
}
fn default_audio_out_sample_rate() -> u32 {
    24000
}
fn default_true() -> bool {
    true
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            audio_in_sample_rate: default_audio_in_sample_rate(),
            audio_out_sample_rate: default_audio_out_sample_rate(),
            add_wav_header: true,
        }
    }
}

/// Remote transcription, generation and synthesis services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// API key shared by all services
    #[serde(default)]
    pub api_key: String,

    /// API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Transcription model
    #[serde(default = "default_stt_model")]
    pub stt_model: String,

    /// Chat model
    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    /// Speech model
    #[serde(default = "default_tts_model")]
    pub tts_model: String,

    /// Synthesis voice
    #[serde(default = "default_voice")]
    pub voice: String,

    /// Transcription language hint
    #[serde(default = "default_language")]
    pub language: String,

    /// Per-call timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_stt_model() -> String {
    "whisper-1".to_string()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_tts_model() -> String {
    "tts-1".to_string()
}
fn default_voice() -> String {
    "fable".to_string()
}
fn default_language() -> String {
    "en".to_string()
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_max_retries() -> u32 {
    2
}
fn default_temperature() -> f32 {
    0.7
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            stt_model: default_stt_model(),
            llm_model: default_llm_model(),
            tts_model: default_tts_model(),
            voice: default_voice(),
            language: default_language(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            temperature: default_temperature(),
        }
    }
}

impl ServicesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Pipeline execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Capacity of each downstream queue between processors
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// How long in-flight frames may drain on shutdown
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,

    /// Buffered audio needed before a transcription is attempted.
    /// Zero transcribes every delivered chunk as one utterance.
    #[serde(default)]
    pub stt_min_flush_bytes: usize,

    /// Minimum sentence length before text is sent to synthesis
    #[serde(default)]
    pub sentence_min_chars: usize,
}

fn default_channel_capacity() -> usize {
    64
}
fn default_drain_timeout_ms() -> u64 {
    2000
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            drain_timeout_ms: default_drain_timeout_ms(),
            stt_min_flush_bytes: 0,
            sentence_min_chars: 0,
        }
    }
}

impl PipelineSettings {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

/// Logging and metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,

    /// Expose Prometheus metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

/// Load settings from `config/` in the working directory
///
/// Priority: env vars > config/{env}.* > config/default.* > defaults
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from(Path::new("config"), env)
}

/// Load settings from the given configuration directory
pub fn load_settings_from(dir: &Path, env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    // Load default config
    builder = builder.add_source(File::from(dir.join("default")).required(false));

    // Load environment-specific config
    if let Some(env_name) = env {
        builder = builder.add_source(File::from(dir.join(env_name)).required(false));
    }

    // Load from environment variables
    builder = builder.add_source(
        Environment::with_prefix("VOICEBOT")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let mut settings: Settings = config.try_deserialize()?;

    if settings.services.api_key.is_empty() {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            settings.services.api_key = key;
        }
    }

    // Validate
    settings.validate()?;

    Ok(settings)
}
