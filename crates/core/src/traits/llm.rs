//! Language model trait

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};

use crate::conversation::Message;
use crate::Result;

/// Incremental response text
pub type TextStream<'a> = Pin<Box<dyn Stream<Item = Result<String>> + Send + 'a>>;

/// Language model interface
///
/// Implementations:
/// - `OpenAiLlm` - streaming chat completions
#[async_trait]
pub trait LanguageModel: Send + Sync + 'static {
    /// Stream a response to the given history as text fragments
    fn generate_stream<'a>(&'a self, messages: Vec<Message>) -> TextStream<'a>;

    /// Generate a complete response
    async fn generate(&self, messages: Vec<Message>) -> Result<String> {
        let mut stream = self.generate_stream(messages);
        let mut text = String::new();
        while let Some(fragment) = stream.next().await {
            text.push_str(&fragment?);
        }
        Ok(text)
    }

    /// Get model name for logging
    fn model_name(&self) -> &str;
}
