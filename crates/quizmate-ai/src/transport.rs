//! HTTP transport seam
//!
//! Providers only describe requests; sending them goes through
//! [`HttpTransport`] so the client can be driven by something other than a
//! live network (an app's own HTTP stack, or a scripted transport in tests).

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use tokio_stream::Stream;

use crate::error::{Error, Result};

/// Raw response body, delivered in whatever chunks the network produced
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// A JSON POST request
#[derive(Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: serde_json::Value,
}

impl HttpRequest {
    /// Look up a header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(k, v)| {
                if k.eq_ignore_ascii_case("authorization") {
                    (k.as_str(), "<redacted>")
                } else {
                    (k.as_str(), v.as_str())
                }
            })
            .collect();
        f.debug_struct("HttpRequest")
            .field("url", &self.url)
            .field("headers", &headers)
            .field("body", &self.body)
            .finish()
    }
}

/// Response status plus a not-yet-read body
pub struct HttpResponse {
    pub status: u16,
    pub body: ByteStream,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Read the whole body as text. A failed read becomes an API error
    /// carrying this response's status.
    pub async fn text(self) -> Result<String> {
        let status = self.status;
        let bytes: Vec<u8> = self
            .body
            .try_concat()
            .await
            .map_err(|e| Error::api(status, e.to_string()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Sends one request and hands back the streaming response
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Default transport backed by `reqwest`
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut headers = reqwest::header::HeaderMap::new();
        for (key, value) in &request.headers {
            let name = key
                .parse::<reqwest::header::HeaderName>()
                .map_err(|e| Error::Transport(format!("invalid header name {key}: {e}")))?;
            let value = value
                .parse::<reqwest::header::HeaderValue>()
                .map_err(|e| Error::Transport(format!("invalid value for header {key}: {e}")))?;
            headers.insert(name, value);
        }

        let response = self
            .client
            .post(&request.url)
            .headers(headers)
            .json(&request.body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(Error::from));

        Ok(HttpResponse {
            status,
            body: Box::pin(body),
        })
    }
}
