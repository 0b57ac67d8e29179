use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblyError {
    #[error("prompt is too long: {prompt_tokens} tokens against a ceiling of {ceiling}")]
    PromptTooLong { prompt_tokens: usize, ceiling: usize },

    #[error("nothing is checked out; there is no path to send")]
    EmptyPath,
}

/// The BPE tables for a model could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no tokenizer for '{model}': {message}")]
pub struct TokenizerError {
    pub model: String,
    pub message: String,
}

impl TokenizerError {
    pub(crate) fn new(model: &str, error: impl std::fmt::Display) -> Self {
        Self {
            model: model.to_string(),
            message: error.to_string(),
        }
    }
}
