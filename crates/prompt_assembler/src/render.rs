use completion_provider::{ChatMessage, ChatRole};
use conversation_tree::{Node, Role};

pub use conversation_tree::RoleMarkers;

/// `marker + text` per node, joined with `\n`, root first.
#[must_use]
pub fn render_path(nodes: &[&Node], markers: &RoleMarkers) -> String {
    conversation_tree::render::render_nodes(nodes, markers)
}

/// Completion-model form: the path followed by the output marker on a new line.
///
/// An empty output marker adds no cue.
#[must_use]
pub fn render_completion_prompt(nodes: &[&Node], markers: &RoleMarkers) -> String {
    let mut prompt = render_path(nodes, markers);
    if !markers.output.is_empty() {
        prompt.push('\n');
        prompt.push_str(&markers.output);
    }
    prompt
}

/// Chat-model form: raw node text under `user`/`assistant` roles.
///
/// Context nodes are skipped here; the assembler places them itself.
#[must_use]
pub fn render_messages(nodes: &[&Node], system_prompt: Option<&str>) -> Vec<ChatMessage> {
    let system = system_prompt
        .filter(|prompt| !prompt.trim().is_empty())
        .map(|prompt| ChatMessage::new(ChatRole::System, prompt));

    system
        .into_iter()
        .chain(nodes.iter().filter_map(|node| {
            let role = match node.role {
                Role::User => ChatRole::User,
                Role::Assistant => ChatRole::Assistant,
                Role::Context => return None,
            };
            Some(ChatMessage::new(role, node.text.clone()))
        }))
        .collect()
}
