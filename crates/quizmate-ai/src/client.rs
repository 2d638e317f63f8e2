//! Provider-agnostic chat client

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    config::{ConfigStore, ProviderConfig},
    context::{build_basic_context, build_context, build_messages},
    error::{Error, Result},
    stream::StreamResult,
    transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport},
    types::{ChatResult, Question},
};

/// Sends quiz questions to the configured LLM provider.
///
/// Configuration is re-read from the [`ConfigStore`] on every call, so
/// settings changes apply to the next question without rebuilding the client.
#[derive(Clone)]
pub struct AiClient {
    config: ConfigStore,
    transport: Arc<dyn HttpTransport>,
}

impl AiClient {
    /// Client using the default `reqwest` transport
    pub fn new(config: ConfigStore) -> Self {
        Self::with_transport(config, Arc::new(ReqwestTransport::new()))
    }

    pub fn with_transport(config: ConfigStore, transport: Arc<dyn HttpTransport>) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    /// Ask a question and wait for the complete answer
    pub async fn chat(&self, user_question: &str, context: Option<&str>) -> Result<ChatResult> {
        let config = self.config.require()?;
        self.complete(&config, user_question, context).await
    }

    /// Ask a question and receive the answer as it is generated
    pub async fn chat_stream(
        &self,
        user_question: &str,
        context: Option<&str>,
    ) -> Result<StreamResult> {
        self.chat_stream_with_cancel(user_question, context, CancellationToken::new())
            .await
    }

    /// Like [`chat_stream`](Self::chat_stream), stopping when `cancel` fires
    pub async fn chat_stream_with_cancel(
        &self,
        user_question: &str,
        context: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<StreamResult> {
        let config = self.config.require()?;
        self.open_stream(&config, user_question, context, cancel)
            .await
    }

    /// Ask about a question known only by title and body; nothing is disclosed
    pub async fn ask_about_question(
        &self,
        user_question: &str,
        title: &str,
        content: &str,
    ) -> Result<ChatResult> {
        let context = build_basic_context(title, content);
        self.chat(user_question, Some(&context)).await
    }

    pub async fn ask_about_question_stream(
        &self,
        user_question: &str,
        title: &str,
        content: &str,
    ) -> Result<StreamResult> {
        let context = build_basic_context(title, content);
        self.chat_stream(user_question, Some(&context)).await
    }

    /// Ask about a full question, revealing its answer according to the
    /// configured disclosure policy
    pub async fn ask_about_question_with_context(
        &self,
        user_question: &str,
        question: &Question,
        is_submitted: bool,
    ) -> Result<ChatResult> {
        let config = self.config.require()?;
        let context = build_context(question, is_submitted, config.disclosure_policy);
        self.complete(&config, user_question, Some(&context)).await
    }

    pub async fn ask_about_question_with_context_stream(
        &self,
        user_question: &str,
        question: &Question,
        is_submitted: bool,
    ) -> Result<StreamResult> {
        let config = self.config.require()?;
        let context = build_context(question, is_submitted, config.disclosure_policy);
        self.open_stream(&config, user_question, Some(&context), CancellationToken::new())
            .await
    }

    async fn complete(
        &self,
        config: &ProviderConfig,
        user_question: &str,
        context: Option<&str>,
    ) -> Result<ChatResult> {
        let api = config.provider.api();
        let messages = build_messages(user_question, context);
        let request = api.build_request(config, &messages, false)?;

        tracing::debug!("{} chat request: {}", config.provider.name(), request.url);

        let response = self.send(config, request).await?;
        let status = response.status;
        let body = response.text().await?;

        api.extract_text(&body).map_err(|e| {
            tracing::error!("Unreadable {} response: {}", config.provider.name(), e);
            Error::api(status, body)
        })
    }

    async fn open_stream(
        &self,
        config: &ProviderConfig,
        user_question: &str,
        context: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<StreamResult> {
        let api = config.provider.api();
        let messages = build_messages(user_question, context);
        let request = api.build_request(config, &messages, true)?;

        tracing::debug!("{} stream request: {}", config.provider.name(), request.url);

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Aborted),
            response = self.send(config, request) => response?,
        };

        Ok(StreamResult::spawn(response.body, api, cancel))
    }

    /// Dispatch a request, turning non-2xx responses into API errors
    async fn send(
        &self,
        config: &ProviderConfig,
        request: HttpRequest,
    ) -> Result<HttpResponse> {
        let response = self.transport.post(request).await.inspect_err(|e| {
            tracing::error!("{} request failed: {}", config.provider.name(), e);
        })?;

        if !response.is_success() {
            let status = response.status;
            // A failed read already comes back as an API error carrying `status`
            let body = response.text().await?;
            tracing::error!("{} API error ({}): {}", config.provider.name(), status, body);
            return Err(Error::api(status, body));
        }

        Ok(response)
    }
}

impl std::fmt::Debug for AiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
