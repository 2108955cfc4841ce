//! # ai-gateway
//!
//! 面向多厂商大模型后端的能力网关：统一能力接口、调度前 token 预算检查、流式事件归一化。
//!
//! Capability-oriented gateway over heterogeneous LLM backends.
//!
//! ## Overview
//!
//! A backend declares the subset of capabilities it implements (chat,
//! streaming chat, structured chat, transcription, speech synthesis, image generation). The
//! [`Gateway`] routes each request by model name to one backend, checks the
//! prompt against a token budget before any network call, and returns either
//! the complete result or a normalized [`StreamEvent`] stream.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_gateway::{Gateway, GatewayConfig, Message, StreamEvent};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> ai_gateway::Result<()> {
//!     let gateway = Gateway::from_config(&GatewayConfig::from_env()?)?;
//!     let request = gateway.request("gpt-4.1-nano", vec![Message::user("Hello!")]);
//!
//!     let mut events = gateway.chat_stream(&request).await?;
//!     while let Some(event) = events.next().await {
//!         if let StreamEvent::Delta { text } = event {
//!             print!("{text}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`gateway`] | Dispatcher: routes, budget guard, timeouts, result shaping |
//! | [`tokens`] | Token counting, encoder cache, budget enforcement |
//! | [`provider`] | Capability traits and adapter declaration |
//! | [`drivers`] | OpenAI and Yandex Cloud adapters |
//! | [`pipeline`] | Stream decoding, normalization, cancellation |
//! | [`storage`] | File-backed audio and image output |
//! | [`structured`] | JSON Schema response formats and parsing |
//! | [`config`] | YAML and environment configuration |
//! | [`types`] | Messages, requests, events, binary results |

pub mod config;
pub mod drivers;
pub mod error;
pub mod error_code;
pub mod gateway;
pub mod pipeline;
pub mod provider;
pub mod storage;
pub mod structured;
pub mod tokens;
pub mod types;

pub use config::GatewayConfig;
pub use error::{Error, ErrorContext};
pub use error_code::{ErrorKind, ProviderErrorKind};
pub use gateway::{Gateway, GatewayBuilder, Route};
pub use pipeline::{CancelHandle, EventStream, StreamPipeline};
pub use provider::{Capability, ProviderAdapter};
pub use structured::JsonSchemaFormat;
pub use tokens::TokenAccountant;
pub use types::{
    message::{Message, MessageRole},
    BinaryOutput, GenerationRequest, ImageRequest, SpeechRequest, StreamEvent, TokenBudget,
    TranscriptionRequest,
};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream that emits `Result<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;
