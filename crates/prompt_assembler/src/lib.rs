//! Turns a conversation path into a prompt that fits the model's token ceiling.
//!
//! The assembler owns no conversation state. It renders borrowed nodes into a
//! [`completion_provider::Prompt`], counts tokens with a [`Tokenizer`], and
//! reports how much room is left for the completion.

mod assembler;
mod budget;
mod chunk;
mod error;
mod render;
mod template;
mod tokenizer;

pub use assembler::{AssembledPrompt, PromptAssembler};
pub use budget::{
    compute_budget, effective_max_tokens, model_token_ceiling, OverflowPolicy, TokenCeilings,
    DEFAULT_TOKEN_CEILING, LARGE_MODEL_CEILING,
};
pub use chunk::chunk_by_tokens;
pub use error::{AssemblyError, TokenizerError};
pub use render::{render_completion_prompt, render_messages, render_path, RoleMarkers};
pub use template::{apply_template, TemplateConfig};
pub use tokenizer::{BpeTokenizer, TokenId, Tokenizer, FALLBACK_ENCODING};
