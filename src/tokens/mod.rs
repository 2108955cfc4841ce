//! Token 计数与预算模块：按模型分词器统计 Token 并在请求发出前执行预算检查。
//!
//! # Token Accounting Module
//!
//! Deterministic token counting per model and budget enforcement. The
//! budget check runs once per text request, before any network call.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`TokenAccountant`] | `count_tokens`, `count_message_tokens`, `enforce_budget` |
//! | [`EncoderCache`] | Bounded LRU of per-model encoders with single-flight construction |
//! | [`EncoderHandle`] | Shared, read-only tokenizer for one model |
//! | [`EncoderLoader`] | Injectable encoder factory ([`TiktokenLoader`] by default) |
//! | [`TokenCounter`] | Trait for counting implementations ([`BpeCounter`]) |
//!
//! ## Example
//!
//! ```rust
//! use ai_gateway::tokens::TokenAccountant;
//! use ai_gateway::types::{Message, TokenBudget};
//!
//! let accountant = TokenAccountant::new();
//! let messages = vec![Message::user("hi")];
//!
//! assert!(accountant
//!     .enforce_budget(&messages, &TokenBudget::limited("m1", 1000))
//!     .is_ok());
//! assert!(accountant
//!     .enforce_budget(&messages, &TokenBudget::limited("m1", 1))
//!     .is_err());
//! ```
//!
//! ## Unknown models
//!
//! Models without a registered tokenizer are counted with `cl100k_base` and a
//! warning is logged when the encoder is built. Counting never fails because a
//! model is unknown.

mod accountant;
mod cache;
mod counter;

pub use accountant::TokenAccountant;
pub use cache::EncoderCache;
pub use counter::{BpeCounter, EncoderHandle, EncoderLoader, TiktokenLoader, TokenCounter};
