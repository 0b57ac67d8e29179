use std::collections::BTreeMap;

use crate::error::TreeError;
use crate::node::{Node, NodeId, Role};

/// Id-keyed node storage with monotonically assigned ids.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeStore {
    nodes: BTreeMap<NodeId, Node>,
    next_id: NodeId,
}

impl Default for NodeStore {
    fn default() -> Self {
        Self {
            nodes: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl NodeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a store from already validated nodes.
    pub(crate) fn from_parts(nodes: BTreeMap<NodeId, Node>, next_id: NodeId) -> Self {
        Self { nodes, next_id }
    }

    /// Allocates the next id and links the node under `parent_id`.
    ///
    /// Context nodes never take a parent, and only path-capable nodes can be parents.
    pub fn create(
        &mut self,
        role: Role,
        text: impl Into<String>,
        parent_id: Option<NodeId>,
    ) -> Result<&Node, TreeError> {
        if let Some(parent_id) = parent_id {
            let parent = self
                .nodes
                .get(&parent_id)
                .ok_or(TreeError::InvalidParent(parent_id))?;
            if !parent.role.is_path_capable() || !role.is_path_capable() {
                return Err(TreeError::InvalidParent(parent_id));
            }
        }

        let id = self.next_id;
        self.next_id += 1;

        if let Some(parent) = parent_id.and_then(|parent_id| self.nodes.get_mut(&parent_id)) {
            parent.child_ids.push(id);
        }
        let node = self
            .nodes
            .entry(id)
            .or_insert_with(|| Node::new(id, role, text.into(), parent_id));
        Ok(&*node)
    }

    pub fn get(&self, id: NodeId) -> Result<&Node, TreeError> {
        self.nodes.get(&id).ok_or(TreeError::NodeNotFound(id))
    }

    pub fn get_mut(&mut self, id: NodeId) -> Result<&mut Node, TreeError> {
        self.nodes.get_mut(&id).ok_or(TreeError::NodeNotFound(id))
    }

    /// Removes `id`, unlinking it from its parent. Its children become roots.
    pub fn delete(&mut self, id: NodeId) -> Result<Node, TreeError> {
        let node = self.nodes.remove(&id).ok_or(TreeError::NodeNotFound(id))?;

        if let Some(parent) = node
            .parent_id
            .and_then(|parent_id| self.nodes.get_mut(&parent_id))
        {
            parent.child_ids.retain(|child| *child != id);
        }
        for child_id in &node.child_ids {
            if let Some(child) = self.nodes.get_mut(child_id) {
                child.parent_id = None;
            }
        }

        Ok(node)
    }

    /// Every node in ascending id order.
    pub fn all_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Id the next created node will receive.
    #[must_use]
    pub fn next_id(&self) -> NodeId {
        self.next_id
    }
}

#[cfg(test)]
mod tests {
    use super::NodeStore;
    use crate::error::TreeError;
    use crate::node::Role;

    #[test]
    fn ids_are_monotonic_and_never_reused() {
        let mut store = NodeStore::new();
        let first = store.create(Role::User, "a", None).expect("root").id;
        let second = store
            .create(Role::Assistant, "b", Some(first))
            .expect("child")
            .id;
        store.delete(second).expect("delete child");
        let third = store.create(Role::User, "c", Some(first)).expect("child").id;

        assert_eq!((first, second, third), (1, 2, 3));
        assert_eq!(store.next_id(), 4);
        assert_eq!(store.get(first).expect("root").child_ids, vec![3]);
    }

    #[test]
    fn unknown_or_context_parent_is_rejected() {
        let mut store = NodeStore::new();
        assert_eq!(
            store.create(Role::User, "x", Some(9)).err(),
            Some(TreeError::InvalidParent(9))
        );

        let context = store.create(Role::Context, "side", None).expect("context").id;
        assert_eq!(
            store.create(Role::User, "x", Some(context)).err(),
            Some(TreeError::InvalidParent(context))
        );
        assert!(store.get(9).is_err());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn delete_orphans_children() {
        let mut store = NodeStore::new();
        let root = store.create(Role::User, "root", None).expect("root").id;
        let middle = store
            .create(Role::Assistant, "middle", Some(root))
            .expect("middle")
            .id;
        let leaf = store.create(Role::User, "leaf", Some(middle)).expect("leaf").id;

        let removed = store.delete(middle).expect("delete middle");

        assert_eq!(removed.child_ids, vec![leaf]);
        assert!(store.get(root).expect("root").child_ids.is_empty());
        assert_eq!(store.get(leaf).expect("leaf").parent_id, None);
        assert_eq!(
            store.all_nodes().map(|node| node.id).collect::<Vec<_>>(),
            vec![root, leaf]
        );
    }
}
