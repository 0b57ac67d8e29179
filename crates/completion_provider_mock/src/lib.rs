//! Deterministic mock implementation of the shared `completion_provider` contract.
//!
//! This crate contains no transport/protocol logic and is intended for local
//! development (`--provider mock`) and contract-level integration testing.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use completion_provider::{
    BackendError, Completion, CompletionBackend, CompletionEvent, CompletionRequest, Prompt,
    PromptShape, ProviderProfile,
};

/// Stable provider identifier used for explicit startup selection.
pub const MOCK_PROVIDER_ID: &str = "mock";

/// Model id that echoes the prompt back, mirroring the CLI's `test` model.
pub const ECHO_MODEL_ID: &str = "test";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Reply {
    Echo,
    Scripted(VecDeque<Result<String, BackendError>>),
}

/// Deterministic backend used by `ttt` tests and offline runs.
#[derive(Debug)]
pub struct MockBackend {
    reply: Mutex<Reply>,
    shape: PromptShape,
    token_delay: Duration,
    observed: Mutex<Vec<CompletionRequest>>,
}

impl MockBackend {
    /// Creates a backend that echoes the flattened prompt for every choice.
    #[must_use]
    pub fn echo() -> Self {
        Self::with_reply(Reply::Echo)
    }

    /// Creates a backend that answers with `replies` in order.
    ///
    /// Once the script is exhausted every further call fails with a provider error.
    #[must_use]
    pub fn scripted<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_reply(Reply::Scripted(
            replies.into_iter().map(|reply| Ok(reply.into())).collect(),
        ))
    }

    /// Creates a backend whose script mixes replies and failures.
    #[must_use]
    pub fn scripted_results(replies: Vec<Result<String, BackendError>>) -> Self {
        Self::with_reply(Reply::Scripted(replies.into()))
    }

    fn with_reply(reply: Reply) -> Self {
        Self {
            reply: Mutex::new(reply),
            shape: PromptShape::Text,
            token_delay: Duration::ZERO,
            observed: Mutex::new(Vec::new()),
        }
    }

    /// Requests message-list prompts instead of plain text.
    #[must_use]
    pub fn with_prompt_shape(mut self, shape: PromptShape) -> Self {
        self.shape = shape;
        self
    }

    /// Sleeps between streamed chunks to imitate network pacing.
    #[must_use]
    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = delay;
        self
    }

    /// Appends a reply or failure to a scripted backend.
    pub fn push_result(&self, result: Result<String, BackendError>) {
        let mut reply = lock_unpoisoned(&self.reply);
        match &mut *reply {
            Reply::Scripted(queue) => queue.push_back(result),
            Reply::Echo => *reply = Reply::Scripted(VecDeque::from([result])),
        }
    }

    /// Returns every request observed so far, in call order.
    #[must_use]
    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock_unpoisoned(&self.observed).clone()
    }

    fn next_text(&self, prompt: &Prompt) -> Result<String, BackendError> {
        let mut reply = lock_unpoisoned(&self.reply);
        match &mut *reply {
            Reply::Echo => Ok(prompt.flatten()),
            Reply::Scripted(queue) => queue.pop_front().unwrap_or_else(|| {
                Err(BackendError::new(
                    completion_provider::BackendErrorKind::Provider,
                    "mock script exhausted",
                ))
            }),
        }
    }

    fn stream_text(
        &self,
        request_id: u64,
        choice: usize,
        text: &str,
        emit: &mut dyn FnMut(CompletionEvent),
    ) {
        let mut pending_token = String::new();
        for ch in text.chars() {
            pending_token.push(ch);

            if matches!(ch, ' ' | '\n') {
                emit(CompletionEvent::Chunk {
                    request_id,
                    choice,
                    text: std::mem::take(&mut pending_token),
                });
                self.pause();
            }
        }

        if !pending_token.is_empty() {
            emit(CompletionEvent::Chunk {
                request_id,
                choice,
                text: pending_token,
            });
            self.pause();
        }
    }

    fn pause(&self) {
        if !self.token_delay.is_zero() {
            thread::sleep(self.token_delay);
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::echo()
    }
}

impl CompletionBackend for MockBackend {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: MOCK_PROVIDER_ID.to_string(),
            model_id: ECHO_MODEL_ID.to_string(),
        }
    }

    fn prompt_shape(&self, _model: &str) -> PromptShape {
        self.shape
    }

    fn list_models(&self) -> Result<Vec<String>, BackendError> {
        Ok(vec![ECHO_MODEL_ID.to_string()])
    }

    fn complete(
        &self,
        request: CompletionRequest,
        emit: &mut dyn FnMut(CompletionEvent),
    ) -> Result<Completion, BackendError> {
        let request_id = request.request_id;
        lock_unpoisoned(&self.observed).push(request.clone());

        let text = self.next_text(&request.prompt)?;
        emit(CompletionEvent::Started { request_id });

        let choices = vec![text; request.params.n.max(1) as usize];
        if request.params.stream {
            for (choice, text) in choices.iter().enumerate() {
                self.stream_text(request_id, choice, text, emit);
            }
        }

        emit(CompletionEvent::Finished { request_id });

        Ok(Completion {
            request_id,
            model: request.params.model,
            choices,
        })
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
