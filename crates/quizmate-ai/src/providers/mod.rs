//! LLM provider request/response dialects
//!
//! Each dialect knows how to turn the `[system, user]` conversation into an
//! HTTP request and how to pull answer text back out of the responses. The
//! client picks the dialect once per call via [`Provider::api`].

pub mod openai;
pub mod qwen;

use crate::{
    config::ProviderConfig,
    error::Result,
    transport::HttpRequest,
    types::{ChatResult, Message, Provider},
};

/// Sampling temperature sent with every request
pub const TEMPERATURE: f64 = 0.7;

/// Maximum tokens requested for every answer
pub const MAX_TOKENS: u32 = 2000;

/// Request building and response normalization for one provider family
pub trait ChatProvider: Send + Sync {
    /// Build the HTTP request for `messages`, streaming or not
    fn build_request(
        &self,
        config: &ProviderConfig,
        messages: &[Message],
        stream: bool,
    ) -> Result<HttpRequest>;

    /// Parse a complete (non-streaming) response body.
    /// A missing answer yields empty text.
    fn extract_text(&self, body: &str) -> serde_json::Result<ChatResult>;

    /// Extract the text fragment carried by one streaming frame payload.
    /// A frame without text yields an empty string.
    fn extract_stream_fragment(&self, payload: &str) -> serde_json::Result<String>;
}

static OPENAI_COMPATIBLE: openai::OpenAICompatible = openai::OpenAICompatible;
static QWEN: qwen::QwenProvider = qwen::QwenProvider;

impl Provider {
    /// Wire dialect used to talk to this provider
    pub fn api(&self) -> &'static dyn ChatProvider {
        match self {
            Provider::OpenAI | Provider::DeepSeek | Provider::Custom => &OPENAI_COMPATIBLE,
            Provider::Qwen => &QWEN,
        }
    }
}

/// Headers shared by every provider
pub(crate) fn base_headers(credential: &str) -> Vec<(String, String)> {
    vec![
        ("Content-Type".to_string(), "application/json".to_string()),
        ("Authorization".to_string(), format!("Bearer {}", credential)),
    ]
}
