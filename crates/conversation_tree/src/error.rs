use std::path::PathBuf;

use thiserror::Error;

use crate::node::NodeId;

/// Lookup and navigation failures. None of them leave the tree modified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("node {0} cannot be used as a parent")]
    InvalidParent(NodeId),

    #[error("no node is checked out")]
    NoCurrentLeaf,

    #[error("tag '{0}' not found")]
    TagNotFound(String),

    #[error("node {0} is a context node and cannot be on the path")]
    NotOnPath(NodeId),

    #[error("node {0} is not a context node")]
    NotContext(NodeId),

    #[error("tag name must not be empty")]
    EmptyTagName,

    #[error("tag name '{0}' is numeric and would shadow node ids")]
    NumericTagName(String),

    #[error("context nodes can only be created with add_context")]
    ContextRole,
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse conversation JSON at {path}: {source}")]
    JsonParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize conversation for {path}: {source}")]
    JsonSerialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path} has unsupported conversation version {found}; expected 1")]
    UnsupportedVersion { path: PathBuf, found: u32 },

    #[error("{path} contains a duplicate node id {id}")]
    DuplicateNodeId { path: PathBuf, id: NodeId },

    #[error("{path} has next_id {next_id} but already uses id {max_id}")]
    NextIdTooSmall {
        path: PathBuf,
        next_id: NodeId,
        max_id: NodeId,
    },

    #[error("{path} contains dangling parent id {parent_id} for node {node_id}")]
    DanglingParent {
        path: PathBuf,
        node_id: NodeId,
        parent_id: NodeId,
    },

    #[error("{path} lists child {child_id} under node {node_id} but the child does not point back")]
    ChildMismatch {
        path: PathBuf,
        node_id: NodeId,
        child_id: NodeId,
    },

    #[error("{path} contains dangling context id {context_id} on node {node_id}")]
    DanglingContext {
        path: PathBuf,
        node_id: NodeId,
        context_id: NodeId,
    },

    #[error("{path} has invalid context node {node_id}: {reason}")]
    InvalidContext {
        path: PathBuf,
        node_id: NodeId,
        reason: &'static str,
    },

    #[error("{path} binds tag '{tag}' to unusable node {node_id}")]
    DanglingTag {
        path: PathBuf,
        tag: String,
        node_id: NodeId,
    },

    #[error("{path} has unusable leaf id {leaf_id}")]
    DanglingLeaf { path: PathBuf, leaf_id: NodeId },

    #[error("cycle detected through node {node_id} in {path}")]
    Cycle { path: PathBuf, node_id: NodeId },

    #[error("invalid conversation name '{0}'")]
    InvalidChatName(String),
}

impl PersistenceError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn json_parse(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::JsonParse {
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn json_serialize(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::JsonSerialize {
            path: path.into(),
            source,
        }
    }
}
