use std::fmt;

use tiktoken_rs::CoreBPE;
use tracing::debug;

use crate::error::TokenizerError;

pub type TokenId = u32;

/// Splits text into model tokens. Counting is what budgeting relies on.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Vec<TokenId>;

    /// `None` when `tokens` end inside a multi-byte character.
    fn decode(&self, tokens: &[TokenId]) -> Option<String>;

    fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }
}

/// Encoding for model names the BPE tables do not know.
pub const FALLBACK_ENCODING: &str = "r50k_base";

/// Byte-pair encoder backed by the model's own vocabulary.
pub struct BpeTokenizer {
    encoding: String,
    bpe: CoreBPE,
}

impl fmt::Debug for BpeTokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BpeTokenizer")
            .field("encoding", &self.encoding)
            .finish_non_exhaustive()
    }
}

impl BpeTokenizer {
    /// Encoder for `model`, or the GPT-2 encoding when the model is unknown.
    pub fn for_model(model: &str) -> Result<Self, TokenizerError> {
        let model = model.trim();
        match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => Ok(Self {
                encoding: model.to_string(),
                bpe,
            }),
            Err(error) => {
                debug!(model, %error, "no BPE table for model, using {FALLBACK_ENCODING}");
                Self::r50k().map_err(|fallback| TokenizerError {
                    model: model.to_string(),
                    message: fallback.message,
                })
            }
        }
    }

    pub fn r50k() -> Result<Self, TokenizerError> {
        tiktoken_rs::r50k_base()
            .map(|bpe| Self {
                encoding: FALLBACK_ENCODING.to_string(),
                bpe,
            })
            .map_err(|error| TokenizerError::new(FALLBACK_ENCODING, error))
    }

    pub fn cl100k() -> Result<Self, TokenizerError> {
        tiktoken_rs::cl100k_base()
            .map(|bpe| Self {
                encoding: "cl100k_base".to_string(),
                bpe,
            })
            .map_err(|error| TokenizerError::new("cl100k_base", error))
    }

    /// Model name the table was resolved from, or the encoding name for fallbacks.
    #[must_use]
    pub fn encoding(&self) -> &str {
        &self.encoding
    }
}

impl Tokenizer for BpeTokenizer {
    fn encode(&self, text: &str) -> Vec<TokenId> {
        self.bpe
            .encode_with_special_tokens(text)
            .into_iter()
            .map(|token| token as TokenId)
            .collect()
    }

    fn decode(&self, tokens: &[TokenId]) -> Option<String> {
        self.bpe
            .decode(tokens.iter().map(|&token| token as _).collect())
            .ok()
    }
}
