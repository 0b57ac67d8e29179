use serde::{Deserialize, Serialize};

/// Wraps `prompt` between `prefix` and `postfix`.
#[must_use]
pub fn apply_template(prompt: &str, prefix: &str, postfix: &str) -> String {
    let mut wrapped = String::with_capacity(prefix.len() + prompt.len() + postfix.len());
    wrapped.push_str(prefix);
    wrapped.push_str(prompt);
    wrapped.push_str(postfix);
    wrapped
}

/// Fixed text placed around every outgoing prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TemplateConfig {
    pub prefix: String,
    pub postfix: String,
}

impl TemplateConfig {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prefix.is_empty() && self.postfix.is_empty()
    }

    #[must_use]
    pub fn apply(&self, prompt: &str) -> String {
        apply_template(prompt, &self.prefix, &self.postfix)
    }
}
