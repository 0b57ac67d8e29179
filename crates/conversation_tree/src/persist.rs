use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::PersistenceError;
use crate::node::{Node, NodeId};
use crate::schema::{ConversationFile, NodeRecord, CONVERSATION_VERSION};
use crate::store::NodeStore;
use crate::tree::Tree;

/// Writes `tree` to `path` atomically: a sibling temp file renamed over the target.
///
/// A failed save leaves any previous file untouched.
pub fn save(tree: &Tree, path: &Path) -> Result<(), PersistenceError> {
    let file = to_file(tree);
    let body = serde_json::to_vec_pretty(&file)
        .map_err(|source| PersistenceError::json_serialize(path, source))?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)
        .map_err(|source| PersistenceError::io("creating conversation directory", dir, source))?;

    let mut temp = NamedTempFile::new_in(dir)
        .map_err(|source| PersistenceError::io("creating temporary file", dir, source))?;
    temp.write_all(&body)
        .and_then(|()| temp.write_all(b"\n"))
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|source| PersistenceError::io("writing temporary file", temp.path(), source))?;
    temp.persist(path)
        .map_err(|error| PersistenceError::io("replacing conversation file", path, error.error))?;

    info!(path = %path.display(), nodes = tree.len(), "saved conversation");
    Ok(())
}

/// Reads and validates `path`. A missing file yields an empty tree backed by it.
pub fn load(path: impl AsRef<Path>) -> Result<Tree, PersistenceError> {
    let path = path.as_ref();
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "conversation file absent; starting empty");
            return Ok(Tree::with_backing_path(path));
        }
        Err(source) => {
            return Err(PersistenceError::io(
                "reading conversation file",
                path,
                source,
            ))
        }
    };

    let file: ConversationFile = serde_json::from_slice(&bytes)
        .map_err(|source| PersistenceError::json_parse(path, source))?;
    let tree = from_file(file, path)?;
    info!(path = %path.display(), nodes = tree.len(), "loaded conversation");
    Ok(tree)
}

impl From<&Tree> for ConversationFile {
    fn from(tree: &Tree) -> Self {
        to_file(tree)
    }
}

pub(crate) fn to_file(tree: &Tree) -> ConversationFile {
    ConversationFile {
        version: CONVERSATION_VERSION,
        next_id: tree.store().next_id(),
        leaf_id: tree.leaf(),
        tags: tree.tags().clone(),
        summary: tree.summary().map(str::to_string),
        nodes: tree
            .nodes()
            .map(|node| NodeRecord::from_node(node, tree.is_checked_out(node.id)))
            .collect(),
    }
}

pub(crate) fn from_file(file: ConversationFile, path: &Path) -> Result<Tree, PersistenceError> {
    if file.version != CONVERSATION_VERSION {
        return Err(PersistenceError::UnsupportedVersion {
            path: path.to_path_buf(),
            found: file.version,
        });
    }

    let mut nodes: BTreeMap<NodeId, Node> = BTreeMap::new();
    let mut checked_out = Vec::new();
    for record in file.nodes {
        if record.checked_out {
            checked_out.push(record.id);
        }
        let id = record.id;
        if nodes.insert(id, record.into_node()).is_some() {
            return Err(PersistenceError::DuplicateNodeId {
                path: path.to_path_buf(),
                id,
            });
        }
    }

    if let Some(max_id) = nodes.keys().next_back().copied() {
        if file.next_id <= max_id {
            return Err(PersistenceError::NextIdTooSmall {
                path: path.to_path_buf(),
                next_id: file.next_id,
                max_id,
            });
        }
    }

    validate_links(&nodes, path)?;
    validate_context(&nodes, path)?;
    validate_acyclic(&nodes, path)?;

    for (tag, node_id) in &file.tags {
        if !is_path_node(&nodes, *node_id) {
            return Err(PersistenceError::DanglingTag {
                path: path.to_path_buf(),
                tag: tag.clone(),
                node_id: *node_id,
            });
        }
    }

    let leaf = match file.leaf_id {
        Some(leaf_id) if is_path_node(&nodes, leaf_id) => Some(leaf_id),
        Some(leaf_id) => {
            return Err(PersistenceError::DanglingLeaf {
                path: path.to_path_buf(),
                leaf_id,
            })
        }
        None => deepest_checked_out(&nodes, &checked_out),
    };

    Ok(Tree::from_parts(
        NodeStore::from_parts(nodes, file.next_id),
        leaf,
        file.tags,
        file.summary,
        Some(path.to_path_buf()),
    ))
}

fn is_path_node(nodes: &BTreeMap<NodeId, Node>, id: NodeId) -> bool {
    nodes
        .get(&id)
        .is_some_and(|node| node.role.is_path_capable())
}

fn validate_links(nodes: &BTreeMap<NodeId, Node>, path: &Path) -> Result<(), PersistenceError> {
    for node in nodes.values() {
        if let Some(parent_id) = node.parent_id {
            let parent_ok = nodes.get(&parent_id).is_some_and(|parent| {
                parent.role.is_path_capable() && parent.child_ids.contains(&node.id)
            });
            if !parent_ok {
                return Err(PersistenceError::DanglingParent {
                    path: path.to_path_buf(),
                    node_id: node.id,
                    parent_id,
                });
            }
        }

        let mut seen = Vec::with_capacity(node.child_ids.len());
        for child_id in &node.child_ids {
            let child_ok = !seen.contains(child_id)
                && nodes
                    .get(child_id)
                    .is_some_and(|child| child.parent_id == Some(node.id));
            if !child_ok {
                return Err(PersistenceError::ChildMismatch {
                    path: path.to_path_buf(),
                    node_id: node.id,
                    child_id: *child_id,
                });
            }
            seen.push(*child_id);
        }
    }
    Ok(())
}

fn validate_context(nodes: &BTreeMap<NodeId, Node>, path: &Path) -> Result<(), PersistenceError> {
    let mut anchors: HashMap<NodeId, NodeId> = HashMap::new();

    for node in nodes.values() {
        if !node.role.is_path_capable() {
            let reason = if node.parent_id.is_some() || !node.child_ids.is_empty() {
                Some("context nodes cannot have a parent or children")
            } else if !node.context_ids.is_empty() {
                Some("context nodes cannot anchor other context")
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(PersistenceError::InvalidContext {
                    path: path.to_path_buf(),
                    node_id: node.id,
                    reason,
                });
            }
        }

        for context_id in &node.context_ids {
            let is_context = nodes
                .get(context_id)
                .is_some_and(|context| !context.role.is_path_capable());
            if !is_context {
                return Err(PersistenceError::DanglingContext {
                    path: path.to_path_buf(),
                    node_id: node.id,
                    context_id: *context_id,
                });
            }
            if anchors.insert(*context_id, node.id).is_some() {
                return Err(PersistenceError::InvalidContext {
                    path: path.to_path_buf(),
                    node_id: *context_id,
                    reason: "context node is anchored more than once",
                });
            }
        }
    }

    for node in nodes.values() {
        if !node.role.is_path_capable() && !anchors.contains_key(&node.id) {
            return Err(PersistenceError::InvalidContext {
                path: path.to_path_buf(),
                node_id: node.id,
                reason: "context node has no anchor",
            });
        }
    }
    Ok(())
}

fn validate_acyclic(nodes: &BTreeMap<NodeId, Node>, path: &Path) -> Result<(), PersistenceError> {
    for node in nodes.values() {
        let mut hops = 0;
        let mut cursor = node.parent_id;
        while let Some(id) = cursor {
            hops += 1;
            if hops > nodes.len() {
                return Err(PersistenceError::Cycle {
                    path: path.to_path_buf(),
                    node_id: node.id,
                });
            }
            cursor = nodes.get(&id).and_then(|parent| parent.parent_id);
        }
    }
    Ok(())
}

/// Recovers a leaf from `checked_out` flags when the file has no `leaf_id`.
fn deepest_checked_out(nodes: &BTreeMap<NodeId, Node>, checked_out: &[NodeId]) -> Option<NodeId> {
    checked_out
        .iter()
        .copied()
        .filter(|id| is_path_node(nodes, *id))
        .max_by_key(|id| {
            let mut depth = 0usize;
            let mut cursor = nodes.get(id).and_then(|node| node.parent_id);
            while let Some(parent) = cursor {
                depth += 1;
                cursor = nodes.get(&parent).and_then(|node| node.parent_id);
            }
            (depth, *id)
        })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{from_file, to_file};
    use crate::error::PersistenceError;
    use crate::tree::Tree;

    #[test]
    fn checked_out_flags_follow_the_leaf() {
        let mut tree = Tree::new();
        let root = tree.input("a").expect("a");
        let reply = tree.output("b").expect("b");
        tree.checkout(root).expect("checkout root");
        let branch = tree.output("c").expect("c");

        let file = to_file(&tree);
        let flags: Vec<(u64, bool)> = file
            .nodes
            .iter()
            .map(|node| (node.id, node.checked_out))
            .collect();

        assert_eq!(flags, vec![(root, true), (reply, false), (branch, true)]);
        assert_eq!(file.leaf_id, Some(branch));
    }

    #[test]
    fn missing_leaf_id_is_recovered_from_flags() {
        let mut tree = Tree::new();
        tree.input("a").expect("a");
        let leaf = tree.output("b").expect("b");
        let mut file = to_file(&tree);
        file.leaf_id = None;

        let restored = from_file(file, Path::new("mem.json")).expect("valid file");
        assert_eq!(restored.leaf(), Some(leaf));
    }

    #[test]
    fn next_id_must_exceed_every_id() {
        let mut tree = Tree::new();
        tree.input("a").expect("a");
        let mut file = to_file(&tree);
        file.next_id = 1;

        let error = from_file(file, Path::new("mem.json")).expect_err("stale next_id");
        assert!(matches!(error, PersistenceError::NextIdTooSmall { .. }));
    }
}
