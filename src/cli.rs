//! Command-line surface. Every subcommand maps onto the same [`Command`] the
//! REPL uses, so both paths share one implementation.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use conversation_tree::{Direction, NodeId, NodeRef};
use prompt_assembler::OverflowPolicy;

use crate::commands::{parse_display, parse_ids, Command, CommandParseError};
use crate::config::CliOverrides;

#[derive(Debug, Parser)]
#[command(name = "ttt", version)]
#[command(about = "Branching conversations with text-completion models", long_about = None)]
pub struct Cli {
    /// Chat name; selects <chat-dir>/<name>.json
    #[arg(short, long, global = true)]
    pub chat: Option<String>,

    /// Directory holding chat files
    #[arg(long, global = true)]
    pub chat_dir: Option<PathBuf>,

    /// Config file (defaults to ~/.config/ttt/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Completion provider id (openai, mock)
    #[arg(long, global = true)]
    pub provider: Option<String>,

    /// Model id
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Upper bound on generated tokens
    #[arg(long, global = true)]
    pub max_tokens: Option<u32>,

    /// Sampling temperature
    #[arg(short, long, global = true)]
    pub temperature: Option<f64>,

    /// Number of choices to request
    #[arg(short, long = "number", global = true)]
    pub n: Option<u32>,

    /// Stream the reply as it is generated
    #[arg(long, global = true)]
    pub stream: bool,

    /// What to do when the prompt exceeds the model's context (fail, truncate-oldest)
    #[arg(long, global = true, value_parser = parse_overflow)]
    pub overflow: Option<OverflowPolicy>,

    /// Keep the conversation in memory only
    #[arg(long, global = true)]
    pub no_file: bool,

    /// Prepend context nodes attached to the path
    #[arg(long, global = true)]
    pub include_context: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Send a user turn and print the reply; reads stdin when no text is given
    Send {
        text: Vec<String>,

        /// Read the prompt from a file
        #[arg(short = 'P', long, conflicts_with = "text")]
        prompt_file: Option<PathBuf>,

        /// Print the assembled prompt before the reply
        #[arg(short, long)]
        echo_prompt: bool,

        /// When the prompt does not fit, send it as turns of at most this many tokens
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        chunk_size: Option<u64>,
    },

    /// Add a user turn without calling the model
    Append {
        #[arg(required = true)]
        text: Vec<String>,
    },

    /// Ask the model again for the current user leaf
    Retry,

    /// Start a new root on the next turn
    New,

    /// Name the current leaf
    Tag { name: String },

    /// Remove a tag
    Untag { name: String },

    /// Make a node the current leaf
    Checkout { target: String },

    /// Delete nodes; their children become roots
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Copy nodes onto the current leaf
    CherryPick {
        #[arg(required = true)]
        targets: Vec<String>,
    },

    /// Replace a node's text
    Edit {
        id: NodeId,
        #[arg(required = true)]
        text: Vec<String>,
    },

    /// Show the tree, every node, the path or one node
    Display {
        /// tree, all, path or node
        mode: Option<String>,
        /// Node id or tag for `node`
        target: Option<String>,
    },

    /// Move to the previous sibling
    Up,

    /// Move to the next sibling
    Down,

    /// Move to the first child
    Child,

    /// Move to the parent
    Parent,

    /// Manage context nodes
    Context {
        #[command(subcommand)]
        action: ContextAction,
    },

    /// Show engine parameters, or update them (k=v,...) in the config file
    Params {
        pairs: Option<String>,
        /// Write the parameters to the config file even without updates
        #[arg(long)]
        save: bool,
    },

    /// List tags
    Tags,

    /// List chats in the chat directory
    Chats,

    /// Print the conversation file
    Dump,

    /// List models the provider offers
    Models,

    /// Start the interactive loop
    Repl,
}

#[derive(Debug, Subcommand)]
pub enum ContextAction {
    /// Attach a context node to a node
    Add {
        anchor: String,
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Remove a context node
    Rm { id: NodeId },
    /// List context nodes attached to a node
    Ls { anchor: String },
}

/// What `main` should do after parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliAction {
    Repl,
    Send(SendRequest),
    Run(Command),
}

/// Where a one-shot prompt comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptSource {
    Text(String),
    File(PathBuf),
    Stdin,
}

/// A one-shot turn with its output options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    pub source: PromptSource,
    pub chunk_size: Option<usize>,
    pub echo_prompt: bool,
}

impl SendRequest {
    #[must_use]
    pub fn stdin() -> Self {
        Self {
            source: PromptSource::Stdin,
            chunk_size: None,
            echo_prompt: false,
        }
    }

    /// The command sending `text` once the source has been read.
    #[must_use]
    pub fn command(&self, text: String) -> Command {
        match self.chunk_size {
            Some(chunk_size) => Command::SendChunked { text, chunk_size },
            None => Command::Send(text),
        }
    }
}

impl Cli {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            chat_name: self.chat.clone(),
            chat_dir: self.chat_dir.clone(),
            provider: self.provider.clone(),
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            n: self.n,
            stream: self.stream,
            overflow: self.overflow,
            no_file: self.no_file,
            include_context: self.include_context,
        }
    }

    /// Without a subcommand the caller decides between the REPL and stdin.
    pub fn action(&self) -> Result<Option<CliAction>, CommandParseError> {
        let Some(command) = &self.command else {
            return Ok(None);
        };
        let command = match command {
            CliCommand::Send {
                text,
                prompt_file,
                echo_prompt,
                chunk_size,
            } => {
                let source = match prompt_file {
                    Some(path) => PromptSource::File(path.clone()),
                    None if text.is_empty() => PromptSource::Stdin,
                    None => PromptSource::Text(text.join(" ")),
                };
                return Ok(Some(CliAction::Send(SendRequest {
                    source,
                    chunk_size: chunk_size.and_then(|size| usize::try_from(size).ok()),
                    echo_prompt: *echo_prompt,
                })));
            }
            CliCommand::Append { text } => Command::Append(text.join(" ")),
            CliCommand::Retry => Command::Retry,
            CliCommand::New => Command::New,
            CliCommand::Tag { name } => Command::Tag(name.clone()),
            CliCommand::Untag { name } => Command::Untag(name.clone()),
            CliCommand::Checkout { target } => Command::Checkout(NodeRef::parse(target)),
            CliCommand::Delete { ids } => Command::Delete(parse_ids(&ids.join(","))?),
            CliCommand::CherryPick { targets } => {
                Command::CherryPick(NodeRef::parse_list(&targets.join(",")))
            }
            CliCommand::Edit { id, text } => Command::Edit {
                id: *id,
                text: text.join(" "),
            },
            CliCommand::Display { mode, target } => {
                let raw = [mode.as_deref(), target.as_deref()]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(" ");
                Command::Display(parse_display(&raw)?)
            }
            CliCommand::Up => Command::Step(Direction::Up),
            CliCommand::Down => Command::Step(Direction::Down),
            CliCommand::Child => Command::Step(Direction::Left),
            CliCommand::Parent => Command::Step(Direction::Right),
            CliCommand::Context { action } => match action {
                ContextAction::Add { anchor, text } => Command::ContextAdd {
                    anchor: NodeRef::parse(anchor),
                    text: text.join(" "),
                },
                ContextAction::Rm { id } => Command::ContextRemove(*id),
                ContextAction::Ls { anchor } => Command::ContextList(NodeRef::parse(anchor)),
            },
            // A one-shot process would forget in-memory updates, so they are saved.
            CliCommand::Params { pairs, save } => Command::Params {
                pairs: pairs.clone(),
                save: *save || pairs.is_some(),
            },
            CliCommand::Tags => Command::Tags,
            CliCommand::Chats => Command::Chats,
            CliCommand::Dump => Command::Dump,
            CliCommand::Models => Command::Models,
            CliCommand::Repl => return Ok(Some(CliAction::Repl)),
        };
        Ok(Some(CliAction::Run(command)))
    }
}

fn parse_overflow(raw: &str) -> Result<OverflowPolicy, String> {
    OverflowPolicy::parse(raw)
        .ok_or_else(|| format!("unknown overflow policy '{raw}'; use fail or truncate-oldest"))
}
