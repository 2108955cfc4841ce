//! Token counting per model and pre-dispatch budget enforcement.

use super::cache::EncoderCache;
use crate::types::{Message, TokenBudget};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{debug, warn};

/// Counts tokens under a model's tokenizer and enforces [`TokenBudget`]s.
///
/// Pure, synchronous computation: no I/O, no side effects besides filling
/// the encoder cache. Cloning shares the cache.
#[derive(Clone)]
pub struct TokenAccountant {
    cache: Arc<EncoderCache>,
}

impl TokenAccountant {
    pub fn new() -> Self {
        Self::with_cache(Arc::new(EncoderCache::default()))
    }

    pub fn with_cache(cache: Arc<EncoderCache>) -> Self {
        Self { cache }
    }

    /// Tokens in `text` under `model`'s tokenizer. Empty text is 0 tokens.
    /// Unknown models are counted with the fallback family, never rejected.
    pub fn count_tokens(&self, text: &str, model: &str) -> Result<usize> {
        if text.is_empty() {
            return Ok(0);
        }
        let encoder = self.cache.get(model)?;
        let tokens = encoder.count(text);
        debug!(
            model = model,
            chars = text.chars().count(),
            tokens,
            "counted tokens"
        );
        Ok(tokens)
    }

    /// Sum over every message of its role label and its content.
    pub fn count_message_tokens(&self, messages: &[Message], model: &str) -> Result<usize> {
        let mut total = 0;
        for message in messages {
            total += self.count_tokens(message.role().as_str(), model)?;
            total += self.count_tokens(message.content(), model)?;
        }
        debug!(model = model, messages = messages.len(), total, "counted message tokens");
        Ok(total)
    }

    /// Fails with [`Error::TokenLimitExceeded`] when the messages exceed the budget.
    /// A budget without `max_tokens` always passes.
    pub fn enforce_budget(&self, messages: &[Message], budget: &TokenBudget) -> Result<()> {
        let Some(limit) = budget.max_tokens else {
            debug!(model = %budget.model_name, "no token limit set; skipping budget check");
            return Ok(());
        };
        let actual = self.count_message_tokens(messages, &budget.model_name)?;
        if actual > limit {
            warn!(
                model = %budget.model_name,
                tokens = actual,
                limit,
                "token budget exceeded"
            );
            return Err(Error::TokenLimitExceeded {
                actual,
                limit,
                model: budget.model_name.clone(),
            });
        }
        debug!(model = %budget.model_name, tokens = actual, limit, "token budget ok");
        Ok(())
    }

    pub fn cache(&self) -> &EncoderCache {
        &self.cache
    }
}

impl Default for TokenAccountant {
    fn default() -> Self {
        Self::new()
    }
}
