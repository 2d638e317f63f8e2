//! OpenAI Chat Completions dialect, shared by DeepSeek and custom endpoints

use serde::{Deserialize, Serialize};

use super::{ChatProvider, MAX_TOKENS, TEMPERATURE, base_headers};
use crate::{
    config::ProviderConfig,
    error::Result,
    transport::HttpRequest,
    types::{ChatResult, Message, TokenUsage},
};

/// OpenAI-compatible `/chat/completions` API
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAICompatible;

impl ChatProvider for OpenAICompatible {
    fn build_request(
        &self,
        config: &ProviderConfig,
        messages: &[Message],
        stream: bool,
    ) -> Result<HttpRequest> {
        let request = OpenAIRequest {
            model: &config.model,
            messages,
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
            stream: stream.then_some(true),
        };

        Ok(HttpRequest {
            url: format!("{}/chat/completions", config.base_url()),
            headers: base_headers(&config.credential),
            body: serde_json::to_value(&request)?,
        })
    }

    fn extract_text(&self, body: &str) -> serde_json::Result<ChatResult> {
        let completion: ChatCompletion = serde_json::from_str(body)?;

        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .unwrap_or_default();

        Ok(ChatResult {
            text,
            usage: completion.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }

    fn extract_stream_fragment(&self, payload: &str) -> serde_json::Result<String> {
        let chunk: StreamChunk = serde_json::from_str(payload)?;
        Ok(chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content)
            .unwrap_or_default())
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f64,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    message: Option<CompletionMessage>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

// Streaming response types

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}
