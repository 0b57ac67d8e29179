//! Pure text views of a tree.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::error::TreeError;
use crate::node::{Node, NodeId, Role};
use crate::tree::Tree;

/// Prefixes applied to user and assistant turns when rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoleMarkers {
    pub input: String,
    pub output: String,
}

impl Default for RoleMarkers {
    fn default() -> Self {
        Self {
            input: "In: ".to_string(),
            output: "Out: ".to_string(),
        }
    }
}

impl RoleMarkers {
    #[must_use]
    pub fn marker(&self, role: Role) -> &str {
        match role {
            Role::User => &self.input,
            Role::Assistant => &self.output,
            Role::Context => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// One preview line per node instead of the full text.
    pub summaries: bool,
    /// Maximum characters in a preview line.
    pub preview_width: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            summaries: false,
            preview_width: 60,
        }
    }
}

/// Joins `marker + text` for each node with newlines.
#[must_use]
pub fn render_nodes(nodes: &[&Node], markers: &RoleMarkers) -> String {
    nodes
        .iter()
        .map(|node| format!("{}{}", markers.marker(node.role), node.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The checked-out path as prompt text.
#[must_use]
pub fn render_path(tree: &Tree, markers: &RoleMarkers) -> String {
    render_nodes(&tree.path(), markers)
}

/// Every root's subtree, indented by depth.
///
/// Checked-out nodes carry `*`; nodes with siblings show `[i/n]`; tags follow
/// in parentheses.
#[must_use]
pub fn render_full(tree: &Tree, markers: &RoleMarkers, options: RenderOptions) -> String {
    let roots = tree.roots();
    let mut out = String::new();

    let mut stack: Vec<(NodeId, usize, usize, usize)> = roots
        .iter()
        .enumerate()
        .rev()
        .map(|(index, id)| (*id, 0, index + 1, roots.len()))
        .collect();

    while let Some((id, depth, position, siblings)) = stack.pop() {
        let Ok(node) = tree.node(id) else {
            continue;
        };
        let indent = "  ".repeat(depth);
        let mark = if tree.is_checked_out(id) { '*' } else { ' ' };
        let _ = write!(out, "{indent}{mark} [{id}]");
        if siblings > 1 {
            let _ = write!(out, " {position}/{siblings}");
        }
        let tags = tree.tags_for(id);
        if !tags.is_empty() {
            let _ = write!(out, " ({})", tags.join(", "));
        }
        let body = if options.summaries {
            preview(node, options.preview_width)
        } else {
            node.text
                .replace('\n', &format!("\n{indent}    "))
        };
        let _ = writeln!(out, " {}{body}", markers.marker(node.role));

        for context_id in &node.context_ids {
            if let Ok(context) = tree.node(*context_id) {
                let _ = writeln!(
                    out,
                    "{indent}    ~ [{context_id}] {}",
                    preview(context, options.preview_width)
                );
            }
        }

        let children = &node.child_ids;
        for (index, child) in children.iter().enumerate().rev() {
            stack.push((*child, depth + 1, index + 1, children.len()));
        }
    }

    out
}

/// Detailed view of a single node.
pub fn render_node(tree: &Tree, id: NodeId) -> Result<String, TreeError> {
    let node = tree.node(id)?;
    let mut out = String::new();

    let _ = writeln!(out, "id: {}", node.id);
    let _ = writeln!(out, "role: {}", node.role);
    match node.parent_id {
        Some(parent) => {
            let _ = writeln!(out, "parent: {parent}");
        }
        None => {
            let _ = writeln!(out, "parent: none");
        }
    }
    if !node.child_ids.is_empty() {
        let _ = writeln!(out, "children: {}", join_ids(&node.child_ids));
    }
    let _ = writeln!(
        out,
        "checked out: {}",
        if tree.is_checked_out(id) { "yes" } else { "no" }
    );
    let tags = tree.tags_for(id);
    if !tags.is_empty() {
        let _ = writeln!(out, "tags: {}", tags.join(", "));
    }
    if !node.context_ids.is_empty() {
        let context: Vec<NodeId> = node.context_ids.iter().copied().collect();
        let _ = writeln!(out, "context: {}", join_ids(&context));
    }
    if node.embedding.is_some() {
        let _ = writeln!(out, "embedding: present");
    }
    if !node.metadata.is_empty() {
        let _ = writeln!(
            out,
            "metadata: {}",
            serde_json::Value::Object(node.metadata.clone())
        );
    }
    let _ = write!(out, "\n{}", node.text);
    Ok(out)
}

fn preview(node: &Node, width: usize) -> String {
    let source = node
        .summary()
        .unwrap_or_else(|| node.text.lines().next().unwrap_or(""));
    let mut line: String = source.chars().take(width).collect();
    let truncated = source.chars().count() > width || node.text.lines().nth(1).is_some();
    if truncated && node.summary().is_none() {
        line.push_str("...");
    }
    line
}

fn join_ids(ids: &[NodeId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn full_view_marks_path_positions_and_tags() {
        let mut tree = Tree::new();
        let root = tree.input("hello").expect("root");
        tree.output("hi there").expect("reply");
        tree.tag("v1").expect("tag");
        tree.checkout(root).expect("checkout root");
        tree.output("howdy").expect("alt reply");

        let rendered = render_full(&tree, &RoleMarkers::default(), RenderOptions::default());

        assert_eq!(
            rendered,
            "* [1] In: hello\n    [2] 1/2 (v1) Out: hi there\n  * [3] 2/2 Out: howdy\n"
        );
    }

    #[test]
    fn summaries_use_metadata_or_first_line() {
        let mut tree = Tree::new();
        let root = tree.input("first line\nsecond line").expect("root");
        let reply = tree.output("a reply").expect("reply");
        tree.set_metadata(reply, "summary", json!("short"))
            .expect("metadata");
        tree.add_context("side notes", root).expect("context");

        let rendered = render_full(
            &tree,
            &RoleMarkers::default(),
            RenderOptions {
                summaries: true,
                preview_width: 40,
            },
        );

        assert_eq!(
            rendered,
            "* [1] In: first line...\n    ~ [3] side notes\n  * [2] Out: short\n"
        );
    }

    #[test]
    fn full_view_uses_the_configured_markers() {
        let mut tree = Tree::new();
        tree.input("hello").expect("root");
        tree.output("hi").expect("reply");
        let markers = RoleMarkers {
            input: "Q: ".to_string(),
            output: "A: ".to_string(),
        };

        let rendered = render_full(&tree, &markers, RenderOptions::default());

        assert_eq!(rendered, "* [1] Q: hello\n  * [2] A: hi\n");
    }

    #[test]
    fn node_view_lists_links() {
        let mut tree = Tree::new();
        let root = tree.input("hello").expect("root");
        tree.output("hi").expect("reply");
        tree.tag("v1").expect("tag");

        assert_eq!(
            render_node(&tree, root).expect("root view"),
            "id: 1\nrole: user\nparent: none\nchildren: 2\nchecked out: yes\n\nhello"
        );
        assert!(matches!(
            render_node(&tree, 99),
            Err(TreeError::NodeNotFound(99))
        ));
    }
}
