use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type NodeId = u64;

/// Who produced a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// An "In" turn typed by the user.
    User,
    /// An "Out" turn produced by the model.
    Assistant,
    /// Side attachment; never part of a path.
    Context,
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Context => "context",
        }
    }

    /// True for roles that may appear on the checked-out path.
    #[must_use]
    pub fn is_path_capable(&self) -> bool {
        !matches!(self, Self::Context)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One conversation turn or side attachment.
///
/// Checked-out membership is not stored here; ask the owning tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub role: Role,
    pub text: String,
    pub parent_id: Option<NodeId>,
    pub child_ids: Vec<NodeId>,
    pub context_ids: BTreeSet<NodeId>,
    pub embedding: Option<Vec<f32>>,
    pub metadata: Map<String, Value>,
}

impl Node {
    pub(crate) fn new(id: NodeId, role: Role, text: String, parent_id: Option<NodeId>) -> Self {
        Self {
            id,
            role,
            text,
            parent_id,
            child_ids: Vec::new(),
            context_ids: BTreeSet::new(),
            embedding: None,
            metadata: Map::new(),
        }
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none() && self.role.is_path_capable()
    }

    /// Advisory one-line summary stored in metadata, if any.
    #[must_use]
    pub fn summary(&self) -> Option<&str> {
        self.metadata
            .get("summary")
            .and_then(Value::as_str)
            .filter(|summary| !summary.trim().is_empty())
    }
}

/// A user-supplied reference to a node: a numeric id or a tag name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRef {
    Id(NodeId),
    Tag(String),
}

impl NodeRef {
    /// Numeric text resolves as an id, anything else as a tag.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<NodeId>() {
            Ok(id) => Self::Id(id),
            Err(_) => Self::Tag(trimmed.to_string()),
        }
    }

    /// Parses a comma-separated list such as `3,v1,7`.
    #[must_use]
    pub fn parse_list(raw: &str) -> Vec<Self> {
        raw.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(Self::parse)
            .collect()
    }
}

impl FromStr for NodeRef {
    type Err = std::convert::Infallible;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(raw))
    }
}

impl From<NodeId> for NodeRef {
    fn from(id: NodeId) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for NodeRef {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<String> for NodeRef {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<&NodeRef> for NodeRef {
    fn from(target: &NodeRef) -> Self {
        target.clone()
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Tag(tag) => f.write_str(tag),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{NodeRef, Role};

    #[test]
    fn numeric_refs_parse_as_ids_and_others_as_tags() {
        assert_eq!(NodeRef::parse(" 12 "), NodeRef::Id(12));
        assert_eq!(NodeRef::parse("v1"), NodeRef::Tag("v1".to_string()));
        assert_eq!(
            NodeRef::parse_list("3, v1,,7"),
            vec![
                NodeRef::Id(3),
                NodeRef::Tag("v1".to_string()),
                NodeRef::Id(7)
            ]
        );
    }

    #[test]
    fn only_context_is_excluded_from_paths() {
        assert!(Role::User.is_path_capable());
        assert!(Role::Assistant.is_path_capable());
        assert!(!Role::Context.is_path_capable());
    }
}
