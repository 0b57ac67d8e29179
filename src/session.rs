//! Session controller: drives one conversation through the tree, the prompt
//! assembler and the completion backend.

use std::fmt::Write as _;
use std::sync::Arc;

use completion_provider::{
    CompletionBackend, CompletionEvent, CompletionRequest, EngineParams, ParamError, Prompt,
    RequestId,
};
use conversation_tree::{
    list_chats, render_full, render_node, render_path, ConversationFile, DeleteReport, Node,
    NodeId, PersistenceError, RenderOptions, Role, StepOutcome, Tree, TreeError,
};
use prompt_assembler::{
    chunk_by_tokens, AssemblyError, BpeTokenizer, PromptAssembler, Tokenizer, TokenizerError,
};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::commands::{Command, DisplayMode, HELP};
use crate::config::{Config, ConfigError};
use crate::interrupt::Interrupt;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error(transparent)]
    Backend(#[from] completion_provider::BackendError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tokenizer(#[from] TokenizerError),

    #[error("invalid engine parameters: {0}")]
    Params(#[from] ParamError),

    #[error("failed to serialize conversation: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("the current leaf is not a user turn; nothing to retry")]
    NothingToRetry,

    #[error("the model returned no choices")]
    NoChoices,
}

/// Result of one completed exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub user_id: NodeId,
    pub reply_id: NodeId,
    pub reply: String,
    /// Extra choices stored as sibling replies; the first choice stays checked out.
    pub alternatives: Vec<NodeId>,
    /// Whether the reply was already delivered through the chunk callback.
    pub streamed: bool,
    pub prompt_tokens: usize,
    pub max_tokens: u32,
    /// Oldest path nodes left out of the prompt to fit the ceiling.
    pub truncated: usize,
    /// The prompt as it was sent.
    pub prompt: Prompt,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutput {
    Text(String),
    Turn(TurnOutcome),
    /// One turn per chunk of a prompt that was too long to send whole.
    Turns(Vec<TurnOutcome>),
    Quit,
}

pub struct Session {
    config: Config,
    tree: Tree,
    backend: Arc<dyn CompletionBackend>,
    assembler: PromptAssembler,
    /// Reload the BPE tables when `/params` changes the model.
    tokenizer_follows_model: bool,
    interrupt: Interrupt,
    next_request_id: RequestId,
}

impl Session {
    pub fn new(
        config: Config,
        tree: Tree,
        backend: Arc<dyn CompletionBackend>,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Self {
        let assembler = PromptAssembler::new(tokenizer)
            .with_markers(config.markers.clone())
            .with_template(config.template.clone())
            .with_system_prompt(config.system_prompt.clone())
            .with_overflow(config.overflow)
            .with_ceilings(config.token_ceilings.clone())
            .include_context(config.include_context);
        Self {
            config,
            tree,
            backend,
            assembler,
            tokenizer_follows_model: false,
            interrupt: Interrupt::new(),
            next_request_id: 1,
        }
    }

    /// Loads the configured chat file (or starts in memory) and counts tokens
    /// with the configured model's encoding.
    pub fn open(config: Config, backend: Arc<dyn CompletionBackend>) -> Result<Self, SessionError> {
        let tree = if config.persist {
            Tree::open(config.chat_path()?)?
        } else {
            Tree::new()
        };
        info!(
            chat = %config.chat_name,
            nodes = tree.len(),
            persist = config.persist,
            provider = %backend.profile().provider_id,
            "opened session"
        );
        let tokenizer = BpeTokenizer::for_model(&config.params.model)?;
        debug!(encoding = tokenizer.encoding(), "loaded tokenizer");
        let mut session = Self::new(config, tree, backend, Arc::new(tokenizer));
        session.tokenizer_follows_model = true;
        Ok(session)
    }

    /// Shares `interrupt` so Ctrl-C during a request cancels only that request.
    #[must_use]
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Records `text` as a user turn, then asks the model for the reply.
    ///
    /// The user turn is saved before the backend is called. When assembly or
    /// the backend fails it stays as the leaf, no reply node is created and
    /// [`Session::retry`] can complete it later.
    pub fn handle_turn(
        &mut self,
        text: &str,
        on_chunk: &mut dyn FnMut(&str),
    ) -> Result<TurnOutcome, SessionError> {
        let user_id = self.tree.input(text)?;
        self.tree.save()?;
        debug!(user_id, "recorded user turn");
        self.complete_leaf(user_id, on_chunk)
    }

    /// Sends `text`, falling back to one turn per `chunk_size`-token piece when
    /// the whole prompt does not fit.
    ///
    /// The oversized user turn is removed first. Every chunk is sent from the
    /// node the original turn would have followed, so no chunk sees another.
    pub fn handle_chunked_turn(
        &mut self,
        text: &str,
        chunk_size: usize,
        on_chunk: &mut dyn FnMut(&str),
    ) -> Result<Vec<TurnOutcome>, SessionError> {
        let (prompt_tokens, ceiling) = match self.handle_turn(text, on_chunk) {
            Ok(outcome) => return Ok(vec![outcome]),
            Err(SessionError::Assembly(AssemblyError::PromptTooLong {
                prompt_tokens,
                ceiling,
            })) => (prompt_tokens, ceiling),
            Err(error) => return Err(error),
        };

        if let Some(user_id) = self.tree.leaf() {
            self.tree.delete(user_id)?;
        }
        let parent = self.tree.leaf();
        self.tree.save()?;

        let chunks = chunk_by_tokens(self.assembler.tokenizer(), text, chunk_size);
        info!(
            prompt_tokens,
            ceiling,
            chunk_size,
            chunks = chunks.len(),
            "prompt too long; sending it in chunks"
        );
        let mut outcomes = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            match parent {
                Some(id) => {
                    self.tree.checkout(id)?;
                }
                None => self.tree.clear_checkout(),
            }
            outcomes.push(self.handle_turn(chunk, on_chunk)?);
        }
        Ok(outcomes)
    }

    /// Re-runs the completion for a user leaf left without a reply.
    pub fn retry(&mut self, on_chunk: &mut dyn FnMut(&str)) -> Result<TurnOutcome, SessionError> {
        let leaf = self.tree.leaf_node().ok_or(TreeError::NoCurrentLeaf)?;
        if leaf.role != Role::User {
            return Err(SessionError::NothingToRetry);
        }
        let user_id = leaf.id;
        self.complete_leaf(user_id, on_chunk)
    }

    fn complete_leaf(
        &mut self,
        user_id: NodeId,
        on_chunk: &mut dyn FnMut(&str),
    ) -> Result<TurnOutcome, SessionError> {
        let params = self.config.params.clone();
        let shape = self.backend.prompt_shape(&params.model);
        let assembled = {
            let path = self.tree.path();
            let context = self.tree.path_context();
            self.assembler.build(&path, &context, &params, shape)
        }
        .inspect_err(|error| warn!(%error, user_id, "prompt assembly failed"))?;

        let request_id = self.next_request_id;
        self.next_request_id += 1;
        let request = CompletionRequest {
            request_id,
            prompt: assembled.payload.clone(),
            params: EngineParams {
                max_tokens: assembled.max_tokens,
                ..params
            },
        };
        info!(
            request_id,
            prompt_tokens = assembled.prompt_tokens,
            max_tokens = assembled.max_tokens,
            "requesting completion"
        );

        let mut streamed = false;
        let completion = {
            let _in_flight = self.interrupt.begin_request();
            self.backend.complete(request, &mut |event| {
                if let CompletionEvent::Chunk {
                    choice: 0, text, ..
                } = event
                {
                    streamed = true;
                    on_chunk(&text);
                }
            })
        }
        .inspect_err(|error| {
            warn!(%error, user_id, "completion failed; user turn kept for retry");
        })?;

        let marker = self.config.markers.output.clone();
        let mut choices = completion
            .choices
            .iter()
            .map(|text| strip_output_marker(text, &marker).to_string());
        let reply = choices.next().ok_or(SessionError::NoChoices)?;

        let model = Value::String(completion.model.clone());
        let reply_id = self.tree.output(reply.clone())?;
        self.tree.set_metadata(reply_id, "model", model.clone())?;

        let mut alternatives = Vec::new();
        for text in choices {
            self.tree.checkout(user_id)?;
            let id = self.tree.output(text)?;
            self.tree.set_metadata(id, "model", model.clone())?;
            alternatives.push(id);
        }
        if !alternatives.is_empty() {
            self.tree.checkout(reply_id)?;
        }
        self.tree.save()?;

        info!(request_id, reply_id, alternatives = alternatives.len(), "stored reply");
        Ok(TurnOutcome {
            user_id,
            reply_id,
            reply,
            alternatives,
            streamed,
            prompt_tokens: assembled.prompt_tokens,
            max_tokens: assembled.max_tokens,
            truncated: assembled.truncated,
            prompt: assembled.payload,
        })
    }

    /// Runs one command. Failed lookups leave the tree untouched.
    pub fn execute(
        &mut self,
        command: Command,
        on_chunk: &mut dyn FnMut(&str),
    ) -> Result<CommandOutput, SessionError> {
        let output = match command {
            Command::Send(text) => CommandOutput::Turn(self.handle_turn(&text, on_chunk)?),
            Command::SendChunked { text, chunk_size } => {
                // Replies are printed whole, one per chunk.
                CommandOutput::Turns(self.handle_chunked_turn(&text, chunk_size, &mut |_| {})?)
            }
            Command::Retry => CommandOutput::Turn(self.retry(on_chunk)?),
            Command::Append(text) => {
                let id = self.tree.input(text)?;
                self.tree.save()?;
                CommandOutput::Text(format!("appended [{id}]"))
            }
            Command::New => {
                self.tree.clear_checkout();
                self.tree.save()?;
                CommandOutput::Text("the next turn starts a new conversation root".to_string())
            }
            Command::Tag(name) => {
                let id = self.tree.tag(&name)?;
                self.tree.save()?;
                CommandOutput::Text(format!("tagged [{id}] as {}", name.trim()))
            }
            Command::Untag(name) => {
                let id = self.tree.untag(&name)?;
                self.tree.save()?;
                CommandOutput::Text(format!("removed tag {} from [{id}]", name.trim()))
            }
            Command::Checkout(target) => {
                self.tree.checkout(target)?;
                self.tree.save()?;
                CommandOutput::Text(self.rendered_path())
            }
            Command::Delete(ids) => {
                let reports = self.tree.delete_many(&ids)?;
                self.tree.save()?;
                CommandOutput::Text(describe_deletions(&reports))
            }
            Command::CherryPick(targets) => {
                let created = self.tree.cherry_pick(&targets)?;
                self.tree.save()?;
                CommandOutput::Text(format!(
                    "copied {} node(s) as {}\n{}",
                    created.len(),
                    format_ids(&created),
                    self.rendered_path()
                ))
            }
            Command::Edit { id, text } => {
                self.tree.edit(id, text)?;
                self.tree.save()?;
                CommandOutput::Text(format!("edited [{id}]"))
            }
            Command::Display(mode) => CommandOutput::Text(self.display(mode)?),
            Command::Step(direction) => match self.tree.step(direction) {
                StepOutcome::Moved(_) => {
                    self.tree.save()?;
                    CommandOutput::Text(self.rendered_path())
                }
                StepOutcome::Unchanged => {
                    CommandOutput::Text(format!("no node {}", direction_phrase(direction)))
                }
            },
            Command::ContextAdd { anchor, text } => {
                let anchor = self.tree.resolve(&anchor)?;
                let id = self.tree.add_context(text, anchor)?;
                self.tree.save()?;
                CommandOutput::Text(format!("added context [{id}] to [{anchor}]"))
            }
            Command::ContextRemove(id) => {
                self.tree.delete_context(id)?;
                self.tree.save()?;
                CommandOutput::Text(format!("removed context [{id}]"))
            }
            Command::ContextList(anchor) => {
                let anchor = self.tree.resolve(&anchor)?;
                let lines: Vec<String> = self
                    .tree
                    .context_of(anchor)?
                    .into_iter()
                    .map(|node| format!("[{}] {}", node.id, node.text))
                    .collect();
                CommandOutput::Text(if lines.is_empty() {
                    format!("[{anchor}] has no context")
                } else {
                    lines.join("\n")
                })
            }
            Command::Params { pairs, save } => {
                if let Some(pairs) = pairs {
                    self.update_params(&pairs)?;
                }
                let mut out = self.params_json()?;
                if save {
                    let path = self.config.save_params()?;
                    let _ = write!(out, "\nsaved engine parameters to {}", path.display());
                }
                CommandOutput::Text(out)
            }
            Command::Tags => CommandOutput::Text(self.describe_tags()),
            Command::Chats => CommandOutput::Text(self.describe_chats()?),
            Command::Dump => CommandOutput::Text(serde_json::to_string_pretty(
                &ConversationFile::from(&self.tree),
            )?),
            Command::Models => {
                let models = self.backend.list_models()?;
                CommandOutput::Text(if models.is_empty() {
                    "no models reported".to_string()
                } else {
                    models.join("\n")
                })
            }
            Command::Help => CommandOutput::Text(HELP.to_string()),
            Command::Quit => CommandOutput::Quit,
        };
        Ok(output)
    }

    fn update_params(&mut self, pairs: &str) -> Result<(), SessionError> {
        let previous_model = self.config.params.model.clone();
        self.config.params.update_many(pairs)?;
        info!(%pairs, "updated engine parameters");

        if self.tokenizer_follows_model && self.config.params.model != previous_model {
            let tokenizer = BpeTokenizer::for_model(&self.config.params.model)?;
            debug!(
                model = %self.config.params.model,
                encoding = tokenizer.encoding(),
                "switched tokenizer"
            );
            self.assembler.set_tokenizer(Arc::new(tokenizer));
        }
        Ok(())
    }

    fn rendered_path(&self) -> String {
        render_path(&self.tree, &self.config.markers)
    }

    fn display(&self, mode: DisplayMode) -> Result<String, SessionError> {
        Ok(match mode {
            DisplayMode::Tree => render_full(
                &self.tree,
                &self.config.markers,
                RenderOptions {
                    summaries: true,
                    ..RenderOptions::default()
                },
            ),
            DisplayMode::All => render_full(
                &self.tree,
                &self.config.markers,
                RenderOptions::default(),
            ),
            DisplayMode::Path => self.rendered_path(),
            DisplayMode::Node(target) => {
                let id = self.tree.resolve(&target)?;
                render_node(&self.tree, id)?
            }
        })
    }

    fn params_json(&self) -> Result<String, SessionError> {
        Ok(serde_json::to_string_pretty(&self.config.params)?)
    }

    fn describe_tags(&self) -> String {
        if self.tree.tags().is_empty() {
            return "no tags".to_string();
        }
        self.tree
            .tags()
            .iter()
            .map(|(name, id)| match self.tree.node(*id) {
                Ok(node) => format!("{name} -> [{id}] {}", first_line(node)),
                Err(_) => format!("{name} -> [{id}]"),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn describe_chats(&self) -> Result<String, SessionError> {
        let listings = list_chats(&self.config.chat_dir)?;
        if listings.is_empty() {
            return Ok(format!("no chats in {}", self.config.chat_dir.display()));
        }
        let mut out = String::new();
        for listing in listings {
            let current = if listing.name == self.config.chat_name {
                '*'
            } else {
                ' '
            };
            let _ = write!(out, "{current} {} ({} nodes)", listing.name, listing.nodes);
            if let Some(summary) = &listing.summary {
                let _ = write!(out, " {summary}");
            }
            out.push('\n');
        }
        Ok(out.trim_end().to_string())
    }
}

/// Removes an output marker the model echoed at the start of its reply.
pub fn strip_output_marker<'a>(text: &'a str, marker: &str) -> &'a str {
    if marker.is_empty() {
        return text;
    }
    text.strip_prefix(marker)
        .or_else(|| {
            let bare = marker.trim_end();
            (!bare.is_empty())
                .then(|| text.strip_prefix(bare))
                .flatten()
        })
        .unwrap_or(text)
}

fn first_line(node: &Node) -> String {
    node.summary()
        .unwrap_or_else(|| node.text.lines().next().unwrap_or(""))
        .to_string()
}

fn format_ids(ids: &[NodeId]) -> String {
    ids.iter()
        .map(|id| format!("[{id}]"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_deletions(reports: &[DeleteReport]) -> String {
    let mut out = String::new();
    for report in reports {
        let _ = write!(out, "deleted [{}]", report.node.id);
        if !report.orphaned.is_empty() {
            let _ = write!(out, "; {} now root(s)", format_ids(&report.orphaned));
        }
        if !report.dropped_tags.is_empty() {
            let _ = write!(out, "; dropped tag(s) {}", report.dropped_tags.join(", "));
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}

fn direction_phrase(direction: conversation_tree::Direction) -> &'static str {
    match direction {
        conversation_tree::Direction::Up => "above",
        conversation_tree::Direction::Down => "below",
        conversation_tree::Direction::Left => "under the leaf",
        conversation_tree::Direction::Right => "above the leaf",
    }
}

#[cfg(test)]
mod tests {
    use super::strip_output_marker;

    #[test]
    fn echoed_output_marker_is_stripped_once() {
        assert_eq!(strip_output_marker("Out: hi", "Out: "), "hi");
        assert_eq!(strip_output_marker("Out:hi", "Out: "), "hi");
        assert_eq!(strip_output_marker("Out: Out: hi", "Out: "), "Out: hi");
        assert_eq!(strip_output_marker(" hi", "Out: "), " hi");
        assert_eq!(strip_output_marker("Out: hi", ""), "Out: hi");
    }
}
