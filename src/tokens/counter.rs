//! Token counter implementations and per-model encoder loading.

use crate::{Error, ErrorContext, Result};
use std::fmt;
use std::sync::Arc;
use tiktoken_rs::tokenizer::{get_tokenizer, Tokenizer};
use tiktoken_rs::CoreBPE;
use tracing::{debug, warn};

pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// Byte-pair-encoding counter backed by a tiktoken vocabulary.
pub struct BpeCounter {
    bpe: CoreBPE,
}

impl BpeCounter {
    pub fn new(bpe: CoreBPE) -> Self {
        Self { bpe }
    }
}

impl TokenCounter for BpeCounter {
    fn count(&self, text: &str) -> usize {
        // Special-token markers in user text are counted as ordinary text.
        self.bpe.encode_ordinary(text).len()
    }
}

/// Shared, read-only tokenizer for one model name.
#[derive(Clone)]
pub struct EncoderHandle {
    model: Arc<str>,
    encoding: Arc<str>,
    exact: bool,
    counter: Arc<dyn TokenCounter>,
}

impl EncoderHandle {
    pub fn new(
        model: &str,
        encoding: &str,
        exact: bool,
        counter: Arc<dyn TokenCounter>,
    ) -> Self {
        Self {
            model: Arc::from(model),
            encoding: Arc::from(encoding),
            exact,
            counter,
        }
    }

    pub fn count(&self, text: &str) -> usize {
        self.counter.count(text)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Name of the vocabulary in use (e.g. `o200k_base`).
    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    /// `false` when the model was unknown and the fallback family is in use.
    pub fn is_exact(&self) -> bool {
        self.exact
    }
}

impl fmt::Debug for EncoderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncoderHandle")
            .field("model", &self.model)
            .field("encoding", &self.encoding)
            .field("exact", &self.exact)
            .finish()
    }
}

/// Builds the encoder for a model name. Injected into the encoder cache.
pub trait EncoderLoader: Send + Sync {
    fn load(&self, model: &str) -> Result<EncoderHandle>;
}

/// Loads tiktoken vocabularies; unknown models use a fixed fallback family.
#[derive(Debug, Clone)]
pub struct TiktokenLoader {
    fallback: Tokenizer,
}

impl TiktokenLoader {
    pub fn new() -> Self {
        Self {
            fallback: Tokenizer::Cl100kBase,
        }
    }

    pub fn with_fallback(fallback: Tokenizer) -> Self {
        Self { fallback }
    }
}

impl Default for TiktokenLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl EncoderLoader for TiktokenLoader {
    fn load(&self, model: &str) -> Result<EncoderHandle> {
        let (tokenizer, exact) = match get_tokenizer(model) {
            Some(t) => (t, true),
            None => {
                warn!(
                    model = model,
                    fallback = ?self.fallback,
                    "no registered tokenizer for model; token counts are approximate"
                );
                (self.fallback, false)
            }
        };
        let bpe = tiktoken_rs::get_bpe_from_tokenizer(tokenizer).map_err(|e| {
            Error::configuration_with_context(
                format!("failed to build tokenizer for model '{}': {}", model, e),
                ErrorContext::new()
                    .with_details(format!("{:?}", tokenizer))
                    .with_source("tiktoken_loader"),
            )
        })?;
        let encoding = encoding_name(tokenizer);
        debug!(model = model, encoding = encoding, exact, "encoder constructed");
        Ok(EncoderHandle::new(
            model,
            encoding,
            exact,
            Arc::new(BpeCounter::new(bpe)),
        ))
    }
}

fn encoding_name(tokenizer: Tokenizer) -> &'static str {
    match tokenizer {
        Tokenizer::O200kBase => "o200k_base",
        Tokenizer::Cl100kBase => "cl100k_base",
        Tokenizer::P50kBase => "p50k_base",
        Tokenizer::R50kBase => "r50k_base",
        Tokenizer::P50kEdit => "p50k_edit",
        Tokenizer::Gpt2 => "gpt2",
        #[allow(unreachable_patterns)]
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_model_is_exact() {
        let handle = TiktokenLoader::new().load("gpt-4o").unwrap();
        assert!(handle.is_exact());
        assert_eq!(handle.encoding(), "o200k_base");
        assert!(handle.count("hello world") >= 2);
    }

    #[test]
    fn test_unknown_model_falls_back() {
        let handle = TiktokenLoader::new().load("totally-unknown-model-xyz").unwrap();
        assert!(!handle.is_exact());
        assert_eq!(handle.encoding(), "cl100k_base");
        assert!(handle.count("some text") > 0);
    }
}
