//! REPL command language.
//!
//! Lines starting with `/` are commands (`/tag v1`, `/checkout 3`); any other
//! line is sent to the model as the next user turn.

use conversation_tree::{Direction, NodeId, NodeRef};
use thiserror::Error;

/// What `display` shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayMode {
    /// Every node as a one-line preview.
    Tree,
    /// Every node with its full text.
    All,
    /// The checked-out path as it is sent to the model.
    Path,
    /// One node in detail.
    Node(NodeRef),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    /// Sends `text`; if it does not fit the context, each `chunk_size`-token
    /// piece goes out as its own turn from the same parent.
    SendChunked {
        text: String,
        chunk_size: usize,
    },
    Append(String),
    Retry,
    New,
    Tag(String),
    Untag(String),
    Checkout(NodeRef),
    Delete(Vec<NodeId>),
    CherryPick(Vec<NodeRef>),
    Edit { id: NodeId, text: String },
    Display(DisplayMode),
    Step(Direction),
    ContextAdd { anchor: NodeRef, text: String },
    ContextRemove(NodeId),
    ContextList(NodeRef),
    /// Applies `pairs` (when given), then writes the parameters out if `save`.
    Params {
        pairs: Option<String>,
        save: bool,
    },
    Tags,
    Chats,
    Dump,
    Models,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandParseError {
    #[error("unknown command '{0}'; try /help")]
    Unknown(String),

    #[error("{command} needs an argument: {usage}")]
    MissingArgument {
        command: &'static str,
        usage: &'static str,
    },

    #[error("'{0}' is not a node id")]
    InvalidId(String),
}

pub const HELP: &str = "\
Plain text is sent as the next user turn. Commands:
  /send <text>              send a turn (same as plain text)
  /append <text>            add a user turn without calling the model
  /retry                    ask the model again for the current leaf
  /new                      start a new root on the next turn
  /tag <name>               name the current leaf
  /untag <name>             remove a tag
  /checkout <id|tag>        make a node the current leaf
  /delete <id,...>          delete nodes; their children become roots
  /cherry-pick <id|tag,...> copy nodes onto the current leaf
  /edit <id> <text>         replace a node's text
  /display [tree|all|path|node <id>]
  /up /down                 previous or next sibling
  /child /parent            first child or parent
  /context add <id|tag> <text>
  /context rm <id>
  /context ls <id|tag>
  /params [k=v,...]         show or update engine parameters
  /params save [k=v,...]    update, then write engine parameters to the config file
  /tags /chats /dump /models
  /help /quit";

/// Parses one REPL line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<Command>, CommandParseError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match trimmed.strip_prefix('/') {
        Some(command) => parse_command(command).map(Some),
        None => Ok(Some(Command::Send(line.trim_end_matches(['\r', '\n']).to_string()))),
    }
}

/// Parses a command without its leading slash.
pub fn parse_command(input: &str) -> Result<Command, CommandParseError> {
    let input = input.trim();
    let (name, rest) = match input.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (input, ""),
    };

    let command = match name {
        "send" | "s" => Command::Send(required(rest, "send", "/send <text>")?.to_string()),
        "append" | "a" => Command::Append(required(rest, "append", "/append <text>")?.to_string()),
        "retry" => Command::Retry,
        "new" => Command::New,
        "tag" | "t" => Command::Tag(required(rest, "tag", "/tag <name>")?.to_string()),
        "untag" => Command::Untag(required(rest, "untag", "/untag <name>")?.to_string()),
        "checkout" | "co" => Command::Checkout(NodeRef::parse(required(
            rest,
            "checkout",
            "/checkout <id|tag>",
        )?)),
        "delete" | "rm" => Command::Delete(parse_ids(required(
            rest,
            "delete",
            "/delete <id,...>",
        )?)?),
        "cherry-pick" | "cp" => {
            let targets = NodeRef::parse_list(required(
                rest,
                "cherry-pick",
                "/cherry-pick <id|tag,...>",
            )?);
            if targets.is_empty() {
                return Err(CommandParseError::MissingArgument {
                    command: "cherry-pick",
                    usage: "/cherry-pick <id|tag,...>",
                });
            }
            Command::CherryPick(targets)
        }
        "edit" => {
            let usage = "/edit <id> <text>";
            let (id, text) = required(rest, "edit", usage)?
                .split_once(char::is_whitespace)
                .ok_or(CommandParseError::MissingArgument {
                    command: "edit",
                    usage,
                })?;
            Command::Edit {
                id: parse_id(id)?,
                text: text.trim_start().to_string(),
            }
        }
        "display" | "d" | "p" => Command::Display(parse_display(rest)?),
        "up" | "prev" => Command::Step(Direction::Up),
        "down" | "next" => Command::Step(Direction::Down),
        "child" | "left" => Command::Step(Direction::Left),
        "parent" | "right" => Command::Step(Direction::Right),
        "context" | "ctx" => parse_context(rest)?,
        "params" | "u" => {
            let (save, pairs) = match rest.strip_prefix("save") {
                Some(after) if after.is_empty() || after.starts_with(char::is_whitespace) => {
                    (true, after.trim())
                }
                _ => (false, rest),
            };
            Command::Params {
                pairs: (!pairs.is_empty()).then(|| pairs.to_string()),
                save,
            }
        }
        "tags" => Command::Tags,
        "chats" => Command::Chats,
        "dump" => Command::Dump,
        "models" => Command::Models,
        "help" | "h" | "?" => Command::Help,
        "quit" | "q" | "exit" => Command::Quit,
        unknown => return Err(CommandParseError::Unknown(unknown.to_string())),
    };
    Ok(command)
}

pub fn parse_display(rest: &str) -> Result<DisplayMode, CommandParseError> {
    let (mode, argument) = match rest.split_once(char::is_whitespace) {
        Some((mode, argument)) => (mode, argument.trim()),
        None => (rest, ""),
    };
    match mode {
        "" | "tree" => Ok(DisplayMode::Tree),
        "all" => Ok(DisplayMode::All),
        "path" => Ok(DisplayMode::Path),
        "node" => Ok(DisplayMode::Node(NodeRef::parse(required(
            argument,
            "display node",
            "/display node <id|tag>",
        )?))),
        other => Err(CommandParseError::Unknown(format!("display {other}"))),
    }
}

fn parse_context(rest: &str) -> Result<Command, CommandParseError> {
    let (action, argument) = match rest.split_once(char::is_whitespace) {
        Some((action, argument)) => (action, argument.trim()),
        None => (rest, ""),
    };
    match action {
        "add" => {
            let usage = "/context add <id|tag> <text>";
            let (anchor, text) = argument.split_once(char::is_whitespace).ok_or(
                CommandParseError::MissingArgument {
                    command: "context add",
                    usage,
                },
            )?;
            Ok(Command::ContextAdd {
                anchor: NodeRef::parse(anchor),
                text: text.trim_start().to_string(),
            })
        }
        "rm" | "remove" => Ok(Command::ContextRemove(parse_id(required(
            argument,
            "context rm",
            "/context rm <id>",
        )?)?)),
        "ls" | "list" => Ok(Command::ContextList(NodeRef::parse(required(
            argument,
            "context ls",
            "/context ls <id|tag>",
        )?))),
        "" => Err(CommandParseError::MissingArgument {
            command: "context",
            usage: "/context add|rm|ls ...",
        }),
        other => Err(CommandParseError::Unknown(format!("context {other}"))),
    }
}

fn required<'a>(
    rest: &'a str,
    command: &'static str,
    usage: &'static str,
) -> Result<&'a str, CommandParseError> {
    if rest.trim().is_empty() {
        Err(CommandParseError::MissingArgument { command, usage })
    } else {
        Ok(rest.trim())
    }
}

fn parse_id(raw: &str) -> Result<NodeId, CommandParseError> {
    raw.trim()
        .parse()
        .map_err(|_| CommandParseError::InvalidId(raw.trim().to_string()))
}

/// Parses `1,2, 3` into ids.
pub fn parse_ids(raw: &str) -> Result<Vec<NodeId>, CommandParseError> {
    let ids = raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(parse_id)
        .collect::<Result<Vec<_>, _>>()?;
    if ids.is_empty() {
        return Err(CommandParseError::InvalidId(raw.trim().to_string()));
    }
    Ok(ids)
}
