//! Tokenizer integration.

use crate::error::{DataError, Result};
use std::path::Path;

/// Options forwarded to the tokenizer when encoding a text column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Add the model's special tokens (BOS/EOS) around the text.
    pub add_special_tokens: bool,
    /// Cut the sequence down to `max_length` when it is longer.
    pub truncation: bool,
    /// Maximum sequence length used with `truncation`.
    pub max_length: Option<usize>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            add_special_tokens: true,
            truncation: true,
            max_length: None,
        }
    }
}

impl EncodeOptions {
    /// Apply truncation to an encoded sequence.
    pub fn truncate(&self, ids: &mut Vec<u32>) {
        if let (true, Some(max_length)) = (self.truncation, self.max_length) {
            ids.truncate(max_length);
        }
    }
}

/// Text to token-id encoder used by the data handlers.
///
/// Implementations are shared read-only across records, possibly from
/// several threads at once.
pub trait TextEncoder: Send + Sync {
    /// Encode text into token IDs.
    fn encode_with_options(&self, text: &str, options: &EncodeOptions) -> Result<Vec<u32>>;

    /// End-of-sequence token string, if the vocabulary has one.
    fn eos_token(&self) -> Option<&str>;
}

/// Common end-of-sequence token spellings, in lookup order.
const EOS_CANDIDATES: &[&str] = &[
    "</s>",
    "<|endoftext|>",
    "<|end_of_text|>",
    "<|eot_id|>",
    "<|im_end|>",
    "<eos>",
];

/// Wrapper around the tokenizers library.
pub struct Tokenizer {
    inner: tokenizers::Tokenizer,
    eos_token: Option<String>,
}

impl Tokenizer {
    /// Load a tokenizer from a local `tokenizer.json` file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let inner = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| DataError::Tokenizer(e.to_string()))?;
        Ok(Self::new(inner))
    }

    /// Load a tokenizer from the bytes of a `tokenizer.json` file.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let inner = tokenizers::Tokenizer::from_bytes(bytes)
            .map_err(|e| DataError::Tokenizer(e.to_string()))?;
        Ok(Self::new(inner))
    }

    fn new(inner: tokenizers::Tokenizer) -> Self {
        let eos_token = EOS_CANDIDATES
            .iter()
            .find(|token| inner.token_to_id(token).is_some())
            .map(|token| token.to_string());
        Self { inner, eos_token }
    }

    /// Override the end-of-sequence token, e.g. from `tokenizer_config.json`.
    pub fn with_eos_token(mut self, token: impl Into<String>) -> Self {
        self.eos_token = Some(token.into());
        self
    }

    /// Get EOS token ID if available.
    pub fn eos_token_id(&self) -> Option<u32> {
        self.eos_token
            .as_deref()
            .and_then(|token| self.inner.token_to_id(token))
    }

    /// Decode token IDs to text.
    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        self.inner
            .decode(ids, true)
            .map_err(|e| DataError::Tokenizer(e.to_string()))
    }

    /// Get the underlying tokenizer.
    pub fn inner(&self) -> &tokenizers::Tokenizer {
        &self.inner
    }
}

impl TextEncoder for Tokenizer {
    fn encode_with_options(&self, text: &str, options: &EncodeOptions) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, options.add_special_tokens)
            .map_err(|e| DataError::Tokenizer(e.to_string()))?;
        let mut ids = encoding.get_ids().to_vec();
        options.truncate(&mut ids);
        Ok(ids)
    }

    fn eos_token(&self) -> Option<&str> {
        self.eos_token.as_deref()
    }
}
