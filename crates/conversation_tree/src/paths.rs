use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::PersistenceError;
use crate::node::Role;
use crate::schema::ConversationFile;

pub const CHAT_FILE_EXTENSION: &str = "json";

/// One saved conversation found under the chat directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatListing {
    pub name: String,
    pub path: PathBuf,
    pub summary: Option<String>,
    pub nodes: usize,
}

/// `<chat_dir>/<name>.json`, rejecting names that would escape the directory.
pub fn chat_file_path(chat_dir: &Path, name: &str) -> Result<PathBuf, PersistenceError> {
    let name = name.trim();
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control);
    if invalid {
        return Err(PersistenceError::InvalidChatName(name.to_string()));
    }
    Ok(chat_dir.join(format!("{name}.{CHAT_FILE_EXTENSION}")))
}

/// Lists saved conversations sorted by name. A missing directory lists nothing.
///
/// Unreadable files are skipped with a warning.
pub fn list_chats(chat_dir: &Path) -> Result<Vec<ChatListing>, PersistenceError> {
    let entries = match fs::read_dir(chat_dir) {
        Ok(entries) => entries,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(PersistenceError::io(
                "listing conversations",
                chat_dir,
                source,
            ))
        }
    };

    let mut listings = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|source| PersistenceError::io("listing conversations", chat_dir, source))?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(CHAT_FILE_EXTENSION) {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };

        match read_listing(&path) {
            Ok((summary, nodes)) => listings.push(ChatListing {
                name: name.to_string(),
                path: path.clone(),
                summary,
                nodes,
            }),
            Err(error) => warn!(path = %path.display(), %error, "skipping unreadable conversation"),
        }
    }

    listings.sort_by(|left, right| left.name.cmp(&right.name));
    Ok(listings)
}

fn read_listing(path: &Path) -> Result<(Option<String>, usize), PersistenceError> {
    let bytes =
        fs::read(path).map_err(|source| PersistenceError::io("reading conversation", path, source))?;
    let file: ConversationFile =
        serde_json::from_slice(&bytes).map_err(|source| PersistenceError::json_parse(path, source))?;

    let summary = file
        .summary
        .clone()
        .filter(|summary| !summary.trim().is_empty())
        .or_else(|| {
            file.nodes
                .iter()
                .find(|node| node.role == Role::User)
                .and_then(|node| node.text.lines().next())
                .map(str::to_string)
        });
    Ok((summary, file.nodes.len()))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::chat_file_path;
    use crate::error::PersistenceError;

    #[test]
    fn chat_names_map_to_json_files() {
        assert_eq!(
            chat_file_path(Path::new("/tmp/chats"), " default ").expect("valid name"),
            Path::new("/tmp/chats/default.json")
        );
    }

    #[test]
    fn path_like_names_are_rejected() {
        for name in ["", "..", "a/b", "a\\b"] {
            assert!(matches!(
                chat_file_path(Path::new("/tmp/chats"), name),
                Err(PersistenceError::InvalidChatName(_))
            ));
        }
    }
}
