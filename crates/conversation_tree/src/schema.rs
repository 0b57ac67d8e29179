use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::node::{Node, NodeId, Role};

pub const CONVERSATION_VERSION: u32 = 1;

/// On-disk form of one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConversationFile {
    pub version: u32,
    pub next_id: NodeId,
    #[serde(default)]
    pub leaf_id: Option<NodeId>,
    #[serde(default)]
    pub tags: BTreeMap<String, NodeId>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
}

/// On-disk form of one node. `checked_out` is written for readers of the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeRecord {
    pub id: NodeId,
    pub role: Role,
    pub text: String,
    #[serde(default)]
    pub parent_id: Option<NodeId>,
    #[serde(default)]
    pub child_ids: Vec<NodeId>,
    #[serde(default)]
    pub checked_out: bool,
    #[serde(default)]
    pub context_ids: BTreeSet<NodeId>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl NodeRecord {
    pub(crate) fn from_node(node: &Node, checked_out: bool) -> Self {
        Self {
            id: node.id,
            role: node.role,
            text: node.text.clone(),
            parent_id: node.parent_id,
            child_ids: node.child_ids.clone(),
            checked_out,
            context_ids: node.context_ids.clone(),
            embedding: node.embedding.clone(),
            metadata: node.metadata.clone(),
        }
    }

    pub(crate) fn into_node(self) -> Node {
        Node {
            id: self.id,
            role: self.role,
            text: self.text,
            parent_id: self.parent_id,
            child_ids: self.child_ids,
            context_ids: self.context_ids,
            embedding: self.embedding,
            metadata: self.metadata,
        }
    }
}
