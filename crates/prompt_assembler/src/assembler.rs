use std::sync::Arc;

use completion_provider::{ChatMessage, ChatRole, EngineParams, Prompt, PromptShape};
use conversation_tree::Node;
use tracing::{debug, warn};

use crate::budget::{compute_budget, effective_max_tokens, OverflowPolicy, TokenCeilings};
use crate::error::AssemblyError;
use crate::render::{render_completion_prompt, render_messages, RoleMarkers};
use crate::template::TemplateConfig;
use crate::tokenizer::Tokenizer;

/// A prompt ready to send plus the numbers it was sized with.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledPrompt {
    pub payload: Prompt,
    pub prompt_tokens: usize,
    /// Tokens left under the ceiling after the prompt.
    pub completion_budget: usize,
    /// `max_tokens` to request: the configured value clamped to the budget.
    pub max_tokens: u32,
    /// Nodes dropped from the root end to fit; non-zero only under `TruncateOldest`.
    pub truncated: usize,
}

/// Renders paths for one session's configuration.
#[derive(Clone)]
pub struct PromptAssembler {
    tokenizer: Arc<dyn Tokenizer>,
    markers: RoleMarkers,
    template: TemplateConfig,
    system_prompt: Option<String>,
    overflow: OverflowPolicy,
    ceilings: TokenCeilings,
    include_context: bool,
}

impl std::fmt::Debug for PromptAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptAssembler")
            .field("markers", &self.markers)
            .field("template", &self.template)
            .field("system_prompt", &self.system_prompt)
            .field("overflow", &self.overflow)
            .field("ceilings", &self.ceilings)
            .field("include_context", &self.include_context)
            .finish_non_exhaustive()
    }
}

impl PromptAssembler {
    #[must_use]
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self {
            tokenizer,
            markers: RoleMarkers::default(),
            template: TemplateConfig::default(),
            system_prompt: None,
            overflow: OverflowPolicy::default(),
            ceilings: TokenCeilings::default(),
            include_context: false,
        }
    }

    #[must_use]
    pub fn with_markers(mut self, markers: RoleMarkers) -> Self {
        self.markers = markers;
        self
    }

    #[must_use]
    pub fn with_template(mut self, template: TemplateConfig) -> Self {
        self.template = template;
        self
    }

    #[must_use]
    pub fn with_system_prompt(mut self, system_prompt: Option<String>) -> Self {
        self.system_prompt = system_prompt;
        self
    }

    #[must_use]
    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    #[must_use]
    pub fn with_ceilings(mut self, ceilings: TokenCeilings) -> Self {
        self.ceilings = ceilings;
        self
    }

    /// Sends attached context nodes along with the path.
    #[must_use]
    pub fn include_context(mut self, include: bool) -> Self {
        self.include_context = include;
        self
    }

    #[must_use]
    pub fn markers(&self) -> &RoleMarkers {
        &self.markers
    }

    #[must_use]
    pub fn tokenizer(&self) -> &dyn Tokenizer {
        self.tokenizer.as_ref()
    }

    /// Swaps the counting tokenizer, e.g. after the model changed.
    pub fn set_tokenizer(&mut self, tokenizer: Arc<dyn Tokenizer>) {
        self.tokenizer = tokenizer;
    }

    #[must_use]
    pub fn overflow(&self) -> OverflowPolicy {
        self.overflow
    }

    #[must_use]
    pub fn ceiling_for(&self, model: &str) -> usize {
        self.ceilings.ceiling_for(model)
    }

    /// Builds the payload for `path` and sizes the completion.
    ///
    /// Under [`OverflowPolicy::Fail`] an oversized prompt is an error. Under
    /// [`OverflowPolicy::TruncateOldest`] whole nodes are dropped from the root
    /// end until it fits; the leaf is always kept.
    pub fn build(
        &self,
        path: &[&Node],
        context: &[&Node],
        params: &EngineParams,
        shape: PromptShape,
    ) -> Result<AssembledPrompt, AssemblyError> {
        if path.is_empty() {
            return Err(AssemblyError::EmptyPath);
        }
        let context: &[&Node] = if self.include_context { context } else { &[] };
        let ceiling = self.ceilings.ceiling_for(&params.model);

        let mut start = 0;
        loop {
            let payload = self.render(&path[start..], context, shape);
            let prompt_tokens = self.tokenizer.count(&payload.flatten());

            match compute_budget(ceiling, prompt_tokens) {
                Ok(completion_budget) => {
                    let max_tokens = effective_max_tokens(params.max_tokens, completion_budget);
                    if start > 0 {
                        warn!(
                            truncated = start,
                            prompt_tokens, ceiling, "dropped oldest nodes to fit the prompt"
                        );
                    }
                    debug!(
                        prompt_tokens,
                        completion_budget,
                        max_tokens,
                        model = %params.model,
                        "assembled prompt"
                    );
                    return Ok(AssembledPrompt {
                        payload,
                        prompt_tokens,
                        completion_budget,
                        max_tokens,
                        truncated: start,
                    });
                }
                Err(error) => {
                    let can_drop = self.overflow == OverflowPolicy::TruncateOldest
                        && start + 1 < path.len();
                    if !can_drop {
                        return Err(error);
                    }
                    start += 1;
                }
            }
        }
    }

    fn render(&self, path: &[&Node], context: &[&Node], shape: PromptShape) -> Prompt {
        match shape {
            PromptShape::Text => {
                let mut prompt = String::new();
                for node in context {
                    prompt.push_str(&node.text);
                    prompt.push('\n');
                }
                prompt.push_str(&render_completion_prompt(path, &self.markers));
                let prompt = self.template.apply(&prompt);
                Prompt::Text(match self.system_prompt.as_deref() {
                    Some(system) if !system.trim().is_empty() => format!("{system}\n{prompt}"),
                    _ => prompt,
                })
            }
            PromptShape::Messages => {
                let mut messages = render_messages(path, self.system_prompt.as_deref());
                if !context.is_empty() {
                    let at = usize::from(
                        messages
                            .first()
                            .is_some_and(|message| message.role == ChatRole::System),
                    );
                    let joined = context
                        .iter()
                        .map(|node| node.text.as_str())
                        .collect::<Vec<_>>()
                        .join("\n\n");
                    messages.insert(at, ChatMessage::new(ChatRole::System, joined));
                }
                if !self.template.is_empty() {
                    if let Some(last) = messages
                        .iter_mut()
                        .rev()
                        .find(|message| message.role == ChatRole::User)
                    {
                        last.content = self.template.apply(&last.content);
                    }
                }
                Prompt::Messages(messages)
            }
        }
    }
}
