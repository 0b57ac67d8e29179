//! `ttt`: a command-line and REPL client for text-completion models built
//! around a branching conversation tree.
//!
//! # Layout
//! - [`config`]: layered configuration (defaults, `~/.config/ttt/config.json`,
//!   environment, CLI flags), validated once.
//! - [`logging`]: `tracing` subscriber writing to `<log_dir>/<timestamp>.log`.
//! - [`providers`]: selects the [`completion_provider::CompletionBackend`].
//! - [`session`]: turns, retries and every tree command.
//! - [`commands`]: the slash-command language shared by the REPL and CLI.
//! - [`cli`] and [`repl`]: the two front ends.
//! - [`interrupt`]: Ctrl-C cancels the request in flight.
//!
//! # Environment
//! - `TTT_CHAT_DIR`, `TTT_CHAT_NAME`: where the conversation file lives.
//! - `TTT_PROVIDER`: `openai` (default) or `mock`.
//! - `OPENAI_API_KEY`, `OPENAI_BASE_URL`: OpenAI credentials and endpoint.
//! - `TTT_LOG_DIR`, `TTT_LOG`: log directory and `EnvFilter` directive.

pub mod cli;
pub mod commands;
pub mod config;
pub mod interrupt;
pub mod logging;
pub mod providers;
pub mod repl;
pub mod session;

pub use commands::{Command, CommandParseError, DisplayMode};
pub use config::{Config, ConfigError};
pub use session::{CommandOutput, Session, SessionError, TurnOutcome};
