use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::error::{PersistenceError, TreeError};
use crate::node::{Node, NodeId, NodeRef, Role};
use crate::persist;
use crate::store::NodeStore;

/// Navigation direction for [`Tree::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Previous sibling.
    Up,
    /// Next sibling.
    Down,
    /// First child.
    Left,
    /// Parent.
    Right,
}

impl Direction {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw.trim().to_ascii_lowercase().as_str() {
            "up" | "prev" => Self::Up,
            "down" | "next" => Self::Down,
            "left" | "child" => Self::Left,
            "right" | "parent" => Self::Right,
            _ => return None,
        })
    }
}

/// Result of a navigation step; boundaries are no-ops rather than errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Moved(NodeId),
    Unchanged,
}

/// What a deletion removed and what it detached.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteReport {
    pub node: Node,
    /// Former children, now roots.
    pub orphaned: Vec<NodeId>,
    pub dropped_tags: Vec<String>,
    pub removed_context: Vec<NodeId>,
}

/// Conversation forest with a single checked-out leaf.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tree {
    store: NodeStore,
    leaf: Option<NodeId>,
    tags: BTreeMap<String, NodeId>,
    summary: Option<String>,
    backing: Option<PathBuf>,
}

impl Tree {
    /// Creates an empty in-memory tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty tree that saves to `path`.
    #[must_use]
    pub fn with_backing_path(path: impl Into<PathBuf>) -> Self {
        Self {
            backing: Some(path.into()),
            ..Self::default()
        }
    }

    /// Loads `path`, or starts an empty tree backed by it when the file is absent.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        persist::load(path)
    }

    /// Saves to the backing file. In-memory trees are a no-op.
    pub fn save(&self) -> Result<(), PersistenceError> {
        match &self.backing {
            Some(path) => persist::save(self, path),
            None => Ok(()),
        }
    }

    pub(crate) fn from_parts(
        store: NodeStore,
        leaf: Option<NodeId>,
        tags: BTreeMap<String, NodeId>,
        summary: Option<String>,
        backing: Option<PathBuf>,
    ) -> Self {
        Self {
            store,
            leaf,
            tags,
            summary,
            backing,
        }
    }

    #[must_use]
    pub fn backing_path(&self) -> Option<&Path> {
        self.backing.as_deref()
    }

    pub fn set_backing_path(&mut self, path: Option<PathBuf>) {
        self.backing = path;
    }

    #[must_use]
    pub fn store(&self) -> &NodeStore {
        &self.store
    }

    /// Number of nodes created and not deleted, context nodes included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, TreeError> {
        self.store.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.store.all_nodes()
    }

    #[must_use]
    pub fn leaf(&self) -> Option<NodeId> {
        self.leaf
    }

    #[must_use]
    pub fn leaf_node(&self) -> Option<&Node> {
        self.leaf.and_then(|id| self.store.get(id).ok())
    }

    #[must_use]
    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn set_summary(&mut self, summary: Option<String>) {
        self.summary = summary;
    }

    /// Ids of the checked-out chain, root first.
    #[must_use]
    pub fn path_ids(&self) -> Vec<NodeId> {
        let mut ids = Vec::new();
        let mut cursor = self.leaf;
        while let Some(id) = cursor {
            let Ok(node) = self.store.get(id) else {
                break;
            };
            ids.push(id);
            if ids.len() > self.store.len() {
                break;
            }
            cursor = node.parent_id;
        }
        ids.reverse();
        ids
    }

    /// Nodes of the checked-out chain, root first.
    #[must_use]
    pub fn path(&self) -> Vec<&Node> {
        self.path_ids()
            .into_iter()
            .filter_map(|id| self.store.get(id).ok())
            .collect()
    }

    #[must_use]
    pub fn is_checked_out(&self, id: NodeId) -> bool {
        let mut cursor = self.leaf;
        let mut hops = 0;
        while let Some(current) = cursor {
            if current == id {
                return true;
            }
            hops += 1;
            if hops > self.store.len() {
                return false;
            }
            cursor = self.store.get(current).ok().and_then(|node| node.parent_id);
        }
        false
    }

    /// Path-capable nodes without a parent, ascending by id.
    #[must_use]
    pub fn roots(&self) -> Vec<NodeId> {
        self.store
            .all_nodes()
            .filter(|node| node.is_root())
            .map(|node| node.id)
            .collect()
    }

    /// Sibling list containing `id`, in sibling order.
    pub fn siblings(&self, id: NodeId) -> Result<Vec<NodeId>, TreeError> {
        let node = self.store.get(id)?;
        if !node.role.is_path_capable() {
            return Err(TreeError::NotOnPath(id));
        }
        match node.parent_id {
            Some(parent_id) => Ok(self.store.get(parent_id)?.child_ids.clone()),
            None => Ok(self.roots()),
        }
    }

    /// Appends a node under the current leaf (or as a new root) and checks it out.
    pub fn extend(&mut self, role: Role, text: impl Into<String>) -> Result<NodeId, TreeError> {
        if !role.is_path_capable() {
            return Err(TreeError::ContextRole);
        }
        let id = self.store.create(role, text, self.leaf)?.id;
        debug!(id, parent = ?self.leaf, role = role.as_str(), "extended path");
        self.leaf = Some(id);
        Ok(id)
    }

    pub fn input(&mut self, text: impl Into<String>) -> Result<NodeId, TreeError> {
        self.extend(Role::User, text)
    }

    pub fn output(&mut self, text: impl Into<String>) -> Result<NodeId, TreeError> {
        self.extend(Role::Assistant, text)
    }

    /// Moves the leaf to a sibling, the first child or the parent.
    pub fn step(&mut self, direction: Direction) -> StepOutcome {
        let Some(leaf) = self.leaf else {
            return StepOutcome::Unchanged;
        };

        let target = match direction {
            Direction::Up | Direction::Down => {
                let Ok(siblings) = self.siblings(leaf) else {
                    return StepOutcome::Unchanged;
                };
                let Some(position) = siblings.iter().position(|id| *id == leaf) else {
                    return StepOutcome::Unchanged;
                };
                match direction {
                    Direction::Up => position
                        .checked_sub(1)
                        .and_then(|previous| siblings.get(previous).copied()),
                    _ => siblings.get(position + 1).copied(),
                }
            }
            Direction::Left => self
                .store
                .get(leaf)
                .ok()
                .and_then(|node| node.child_ids.first().copied()),
            Direction::Right => self.store.get(leaf).ok().and_then(|node| node.parent_id),
        };

        match target {
            Some(id) => {
                debug!(from = leaf, to = id, ?direction, "stepped");
                self.leaf = Some(id);
                StepOutcome::Moved(id)
            }
            None => StepOutcome::Unchanged,
        }
    }

    /// Resolves an id or tag to an existing node id.
    pub fn resolve(&self, target: &NodeRef) -> Result<NodeId, TreeError> {
        match target {
            NodeRef::Id(id) => self.store.get(*id).map(|node| node.id),
            NodeRef::Tag(tag) => self
                .tags
                .get(tag)
                .copied()
                .ok_or_else(|| TreeError::TagNotFound(tag.clone())),
        }
    }

    /// Makes `target` the leaf; the path becomes its ancestor chain.
    pub fn checkout(&mut self, target: impl Into<NodeRef>) -> Result<NodeId, TreeError> {
        let id = self.resolve(&target.into())?;
        if !self.store.get(id)?.role.is_path_capable() {
            return Err(TreeError::NotOnPath(id));
        }
        debug!(id, "checked out");
        self.leaf = Some(id);
        Ok(id)
    }

    /// Empties the path; the next input starts a fresh root.
    pub fn clear_checkout(&mut self) {
        self.leaf = None;
    }

    /// Binds `name` to the current leaf, overwriting an existing binding.
    pub fn tag(&mut self, name: &str) -> Result<NodeId, TreeError> {
        let name = validate_tag_name(name)?;
        let leaf = self.leaf.ok_or(TreeError::NoCurrentLeaf)?;
        self.tags.insert(name.to_string(), leaf);
        debug!(tag = name, id = leaf, "tagged");
        Ok(leaf)
    }

    pub fn untag(&mut self, name: &str) -> Result<NodeId, TreeError> {
        self.tags
            .remove(name.trim())
            .ok_or_else(|| TreeError::TagNotFound(name.trim().to_string()))
    }

    #[must_use]
    pub fn tags(&self) -> &BTreeMap<String, NodeId> {
        &self.tags
    }

    /// Tag names bound to `id`, sorted.
    #[must_use]
    pub fn tags_for(&self, id: NodeId) -> Vec<&str> {
        self.tags
            .iter()
            .filter(|(_, target)| **target == id)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Copies each target's role and text onto the leaf, in order.
    ///
    /// Every target is resolved before anything is created.
    pub fn cherry_pick(&mut self, targets: &[NodeRef]) -> Result<Vec<NodeId>, TreeError> {
        let mut copies = Vec::with_capacity(targets.len());
        for target in targets {
            let id = self.resolve(target)?;
            let node = self.store.get(id)?;
            if !node.role.is_path_capable() {
                return Err(TreeError::NotOnPath(id));
            }
            copies.push((node.role, node.text.clone()));
        }

        let mut created = Vec::with_capacity(copies.len());
        for (role, text) in copies {
            created.push(self.extend(role, text)?);
        }
        debug!(?created, "cherry-picked");
        Ok(created)
    }

    pub fn edit(&mut self, id: NodeId, text: impl Into<String>) -> Result<(), TreeError> {
        self.store.get_mut(id)?.text = text.into();
        debug!(id, "edited");
        Ok(())
    }

    pub fn set_metadata(
        &mut self,
        id: NodeId,
        key: impl Into<String>,
        value: Value,
    ) -> Result<(), TreeError> {
        self.store.get_mut(id)?.metadata.insert(key.into(), value);
        Ok(())
    }

    /// Deletes one node; children are orphaned into roots.
    ///
    /// When the node was on the path the leaf moves to its parent. Tags bound to
    /// it are dropped and its own context nodes are deleted with it.
    pub fn delete(&mut self, id: NodeId) -> Result<DeleteReport, TreeError> {
        let node = self.store.get(id)?;
        if node.role == Role::Context {
            let node = self.delete_context(id)?;
            return Ok(DeleteReport {
                node,
                orphaned: Vec::new(),
                dropped_tags: Vec::new(),
                removed_context: Vec::new(),
            });
        }

        let was_on_path = self.is_checked_out(id);
        let parent_id = node.parent_id;
        let context_ids: Vec<NodeId> = node.context_ids.iter().copied().collect();

        let removed = self.store.delete(id)?;
        let removed_context: Vec<NodeId> = context_ids
            .into_iter()
            .filter(|context_id| self.store.delete(*context_id).is_ok())
            .collect();

        let dropped_tags: Vec<String> = self
            .tags
            .iter()
            .filter(|(_, target)| **target == id)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &dropped_tags {
            self.tags.remove(name);
        }

        if was_on_path {
            self.leaf = parent_id;
        }

        debug!(id, orphaned = ?removed.child_ids, ?dropped_tags, "deleted node");
        Ok(DeleteReport {
            orphaned: removed.child_ids.clone(),
            node: removed,
            dropped_tags,
            removed_context,
        })
    }

    /// Validates every id, then deletes them in order.
    pub fn delete_many(&mut self, ids: &[NodeId]) -> Result<Vec<DeleteReport>, TreeError> {
        for id in ids {
            self.store.get(*id)?;
        }

        let mut reports = Vec::with_capacity(ids.len());
        for id in ids {
            // Context nodes may already be gone with their anchor.
            if self.store.contains(*id) {
                reports.push(self.delete(*id)?);
            }
        }
        Ok(reports)
    }

    /// Attaches a side context node to `anchor`.
    pub fn add_context(
        &mut self,
        text: impl Into<String>,
        anchor: NodeId,
    ) -> Result<NodeId, TreeError> {
        if !self.store.get(anchor)?.role.is_path_capable() {
            return Err(TreeError::InvalidParent(anchor));
        }
        let id = self.store.create(Role::Context, text, None)?.id;
        self.store.get_mut(anchor)?.context_ids.insert(id);
        debug!(id, anchor, "added context");
        Ok(id)
    }

    /// Detaches and removes a context node.
    pub fn delete_context(&mut self, id: NodeId) -> Result<Node, TreeError> {
        if self.store.get(id)?.role != Role::Context {
            return Err(TreeError::NotContext(id));
        }
        let anchor = self
            .store
            .all_nodes()
            .find(|node| node.context_ids.contains(&id))
            .map(|node| node.id);
        if let Some(anchor) = anchor {
            self.store.get_mut(anchor)?.context_ids.remove(&id);
        }
        let removed = self.store.delete(id)?;
        debug!(id, ?anchor, "deleted context");
        Ok(removed)
    }

    /// Context nodes attached to `anchor`, ascending by id.
    pub fn context_of(&self, anchor: NodeId) -> Result<Vec<&Node>, TreeError> {
        let anchor = self.store.get(anchor)?;
        Ok(anchor
            .context_ids
            .iter()
            .filter_map(|id| self.store.get(*id).ok())
            .collect())
    }

    /// Context nodes attached anywhere on the path, in path order.
    #[must_use]
    pub fn path_context(&self) -> Vec<&Node> {
        self.path()
            .into_iter()
            .flat_map(|node| node.context_ids.iter())
            .filter_map(|id| self.store.get(*id).ok())
            .collect()
    }
}

fn validate_tag_name(name: &str) -> Result<&str, TreeError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TreeError::EmptyTagName);
    }
    if name.parse::<NodeId>().is_ok() {
        return Err(TreeError::NumericTagName(name.to_string()));
    }
    Ok(name)
}
