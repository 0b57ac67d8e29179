use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::AssemblyError;

/// Ceiling used for models missing from the table.
pub const DEFAULT_TOKEN_CEILING: usize = 2048;
/// Ceiling for the large-context models, a few tokens short of 4096.
pub const LARGE_MODEL_CEILING: usize = 4096 - 8;

const LARGE_MODELS: &[&str] = &[
    "gpt-4",
    "gpt-3.5-turbo",
    "text-davinci-003",
    "text-davinci-002",
    "code-davinci-002",
];

/// Combined prompt and completion token ceiling for `model`.
///
/// Dated snapshots (`gpt-3.5-turbo-0301`) share their family's ceiling.
#[must_use]
pub fn model_token_ceiling(model: &str) -> usize {
    let model = model.trim();
    let known = LARGE_MODELS.iter().any(|large| {
        model == *large
            || model
                .strip_prefix(large)
                .and_then(|rest| rest.strip_prefix('-'))
                .is_some_and(|date| !date.is_empty() && date.chars().all(|c| c.is_ascii_digit()))
    });
    if known {
        LARGE_MODEL_CEILING
    } else {
        DEFAULT_TOKEN_CEILING
    }
}

/// Per-model ceiling overrides layered over [`model_token_ceiling`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenCeilings {
    overrides: BTreeMap<String, usize>,
}

impl TokenCeilings {
    #[must_use]
    pub fn new(overrides: BTreeMap<String, usize>) -> Self {
        Self { overrides }
    }

    pub fn set(&mut self, model: impl Into<String>, ceiling: usize) {
        self.overrides.insert(model.into(), ceiling);
    }

    #[must_use]
    pub fn ceiling_for(&self, model: &str) -> usize {
        self.overrides
            .get(model.trim())
            .copied()
            .unwrap_or_else(|| model_token_ceiling(model))
    }

    #[must_use]
    pub fn overrides(&self) -> &BTreeMap<String, usize> {
        &self.overrides
    }
}

/// Tokens left for the completion once the prompt is counted.
///
/// A prompt that leaves no room at all is as unusable as one that overflows.
pub fn compute_budget(ceiling: usize, prompt_tokens: usize) -> Result<usize, AssemblyError> {
    match ceiling.checked_sub(prompt_tokens) {
        Some(budget) if budget > 0 => Ok(budget),
        _ => Err(AssemblyError::PromptTooLong {
            prompt_tokens,
            ceiling,
        }),
    }
}

/// Clamps the requested completion length to the remaining budget.
#[must_use]
pub fn effective_max_tokens(requested: u32, budget: usize) -> u32 {
    let budget = u32::try_from(budget).unwrap_or(u32::MAX);
    requested.min(budget)
}

/// What to do when the rendered path exceeds the ceiling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Refuse the request with [`AssemblyError::PromptTooLong`].
    #[default]
    Fail,
    /// Drop whole nodes from the root end, never the leaf, and report how many.
    TruncateOldest,
}

impl OverflowPolicy {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fail" => Some(Self::Fail),
            "truncate_oldest" | "truncate" => Some(Self::TruncateOldest),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fail => "fail",
            Self::TruncateOldest => "truncate_oldest",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_models_get_large_ceiling() {
        for model in LARGE_MODELS {
            assert_eq!(model_token_ceiling(model), 4088);
        }
        assert_eq!(model_token_ceiling("gpt-3.5-turbo-0301"), 4088);
        assert_eq!(model_token_ceiling("gpt-4-32k"), DEFAULT_TOKEN_CEILING);
        assert_eq!(model_token_ceiling("davinci"), DEFAULT_TOKEN_CEILING);
        assert_eq!(model_token_ceiling("test"), DEFAULT_TOKEN_CEILING);
    }

    #[test]
    fn overrides_win_over_table() {
        let mut ceilings = TokenCeilings::default();
        ceilings.set("gpt-4", 8192);
        ceilings.set("local-llm", 512);

        assert_eq!(ceilings.ceiling_for("gpt-4"), 8192);
        assert_eq!(ceilings.ceiling_for("local-llm"), 512);
        assert_eq!(ceilings.ceiling_for("text-davinci-003"), 4088);
    }

    #[test]
    fn budget_is_ceiling_minus_prompt() {
        assert_eq!(compute_budget(4088, 88), Ok(4000));
        assert_eq!(compute_budget(2048, 2047), Ok(1));
    }

    #[test]
    fn exhausted_budget_is_prompt_too_long() {
        assert_eq!(
            compute_budget(2048, 2048),
            Err(AssemblyError::PromptTooLong {
                prompt_tokens: 2048,
                ceiling: 2048
            })
        );
        assert_eq!(
            compute_budget(100, 5000),
            Err(AssemblyError::PromptTooLong {
                prompt_tokens: 5000,
                ceiling: 100
            })
        );
    }

    #[test]
    fn max_tokens_clamps_to_budget() {
        assert_eq!(effective_max_tokens(200, 4000), 200);
        assert_eq!(effective_max_tokens(200, 50), 50);
        assert_eq!(effective_max_tokens(u32::MAX, usize::MAX), u32::MAX);
    }

    #[test]
    fn policy_parses_aliases_and_defaults_to_fail() {
        assert_eq!(OverflowPolicy::default(), OverflowPolicy::Fail);
        assert_eq!(
            OverflowPolicy::parse("truncate-oldest"),
            Some(OverflowPolicy::TruncateOldest)
        );
        assert_eq!(OverflowPolicy::parse("FAIL"), Some(OverflowPolicy::Fail));
        assert_eq!(OverflowPolicy::parse("drop"), None);
    }
}
