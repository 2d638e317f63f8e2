//! quizmate-ai: provider-agnostic AI tutor client for programming quizzes
//!
//! This crate sends quiz questions, with optional question context, to one of
//! several LLM providers (OpenAI, DeepSeek, Qwen, or any OpenAI-compatible
//! endpoint) and returns the answer either whole or as a live text stream.

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod providers;
pub mod sse;
pub mod storage;
pub mod stream;
pub mod transport;
pub mod types;

pub use client::AiClient;
pub use config::{ConfigDraft, ConfigStore, ProviderConfig, resolve_endpoint, validate};
pub use context::{build_basic_context, build_context, build_messages};
pub use error::{Error, Result};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use stream::StreamResult;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use types::*;
