//! Alibaba DashScope (Qwen) text-generation dialect

use serde::{Deserialize, Serialize};

use super::{ChatProvider, MAX_TOKENS, TEMPERATURE, base_headers};
use crate::{
    config::ProviderConfig,
    error::Result,
    transport::HttpRequest,
    types::{ChatResult, Message, TokenUsage},
};

/// Header that switches DashScope responses to server-sent events
pub const SSE_HEADER: &str = "X-DashScope-SSE";

/// DashScope `/services/aigc/text-generation/generation` API
#[derive(Debug, Clone, Copy, Default)]
pub struct QwenProvider;

impl ChatProvider for QwenProvider {
    fn build_request(
        &self,
        config: &ProviderConfig,
        messages: &[Message],
        stream: bool,
    ) -> Result<HttpRequest> {
        let request = QwenRequest {
            model: &config.model,
            input: QwenInput { messages },
            parameters: QwenParameters {
                temperature: TEMPERATURE,
                max_tokens: MAX_TOKENS,
                // Each frame then carries only the new text, not the whole answer so far
                incremental_output: stream.then_some(true),
            },
        };

        let mut headers = base_headers(&config.credential);
        if stream {
            headers.push((SSE_HEADER.to_string(), "enable".to_string()));
        }

        Ok(HttpRequest {
            url: format!(
                "{}/services/aigc/text-generation/generation",
                config.base_url()
            ),
            headers,
            body: serde_json::to_value(&request)?,
        })
    }

    fn extract_text(&self, body: &str) -> serde_json::Result<ChatResult> {
        let QwenResponse { output, usage } = serde_json::from_str(body)?;

        Ok(ChatResult {
            text: first_content(output),
            usage: usage.map(|u| TokenUsage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }

    fn extract_stream_fragment(&self, payload: &str) -> serde_json::Result<String> {
        let response: QwenResponse = serde_json::from_str(payload)?;
        Ok(first_content(response.output))
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct QwenRequest<'a> {
    model: &'a str,
    input: QwenInput<'a>,
    parameters: QwenParameters,
}

#[derive(Debug, Serialize)]
struct QwenInput<'a> {
    messages: &'a [Message],
}

#[derive(Debug, Serialize)]
struct QwenParameters {
    temperature: f64,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    incremental_output: Option<bool>,
}

/// Shared by full responses and streaming frames
#[derive(Debug, Deserialize)]
struct QwenResponse {
    #[serde(default)]
    output: Option<QwenOutput>,
    #[serde(default)]
    usage: Option<QwenUsage>,
}

fn first_content(output: Option<QwenOutput>) -> String {
    output
        .and_then(|output| output.choices.into_iter().next())
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
struct QwenOutput {
    #[serde(default)]
    choices: Vec<QwenChoice>,
}

#[derive(Debug, Deserialize)]
struct QwenChoice {
    #[serde(default)]
    message: Option<QwenMessage>,
}

#[derive(Debug, Deserialize)]
struct QwenMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QwenUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}
