use serde::{Deserialize, Serialize};

/// Why a choice stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
}

impl FinishReason {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "stop" => Self::Stop,
            "length" => Self::Length,
            "content_filter" => Self::ContentFilter,
            "tool_calls" | "function_call" => Self::ToolCalls,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::ContentFilter => "content_filter",
            Self::ToolCalls => "tool_calls",
        }
    }
}

/// Stream event emitted by the parser after normalization.
///
/// Chat deltas (`choices[].delta.content`) and legacy completion text
/// (`choices[].text`) both normalize to [`OpenAiStreamEvent::Delta`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpenAiStreamEvent {
    Delta {
        choice: usize,
        text: String,
    },
    ChoiceFinished {
        choice: usize,
        reason: Option<FinishReason>,
    },
    Error {
        code: Option<String>,
        message: Option<String>,
    },
    Done,
}

/// Folds stream deltas into per-choice text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamAccumulator {
    pub choices: Vec<String>,
    pub finish_reasons: Vec<Option<FinishReason>>,
    pub done: bool,
}

impl StreamAccumulator {
    pub fn apply(&mut self, event: &OpenAiStreamEvent) {
        match event {
            OpenAiStreamEvent::Delta { choice, text } => {
                self.ensure_choice(*choice);
                self.choices[*choice].push_str(text);
            }
            OpenAiStreamEvent::ChoiceFinished { choice, reason } => {
                self.ensure_choice(*choice);
                self.finish_reasons[*choice] = *reason;
            }
            OpenAiStreamEvent::Done => self.done = true,
            OpenAiStreamEvent::Error { .. } => {}
        }
    }

    fn ensure_choice(&mut self, choice: usize) {
        if self.choices.len() <= choice {
            self.choices.resize(choice + 1, String::new());
            self.finish_reasons.resize(choice + 1, None);
        }
    }
}
