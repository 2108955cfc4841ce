//! 类型系统模块：网关请求、消息、流事件与二进制结果的核心数据类型。
//!
//! # Types Module
//!
//! Core data types shared by the token accountant, the adapters, the
//! streaming pipeline and the gateway.
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Message`] | Immutable chat message (role + text) |
//! | [`TokenBudget`] | Prompt token ceiling under a model's tokenizer; `None` opts out |
//! | [`GenerationRequest`] | Chat request: messages, model, budget, options bag |
//! | [`StreamEvent`] | Normalized stream event (`Delta`, `Refusal`, `Completed`, `Error`) |
//! | [`ProviderChunk`] | Adapter-native incremental item, before normalization |
//! | [`BinaryOutput`] | Bytes or stored-file handle for audio/image results |
//!
//! ## Example
//!
//! ```rust
//! use ai_gateway::types::{GenerationRequest, Message, TokenBudget};
//!
//! let req = GenerationRequest::new(
//!     "gpt-4.1-nano",
//!     vec![Message::system("Be brief."), Message::user("Hi!")],
//!     TokenBudget::limited("gpt-4.1-nano", 1024),
//! )
//! .with_option("temperature", 0.2);
//! assert_eq!(req.messages.len(), 2);
//! ```

pub mod events;
pub mod media;
pub mod message;
pub mod request;

pub use events::{ProviderChunk, StreamEvent};
pub use media::{AudioFormat, AudioPayload, BinaryOutput, ImageFormat, ImagePayload, StoredFile};
pub use message::{Message, MessageRole};
pub use request::{
    AudioInput, AudioSource, GenerationRequest, ImageRequest, Options, SpeechRequest, TokenBudget,
    TranscriptionRequest,
};
