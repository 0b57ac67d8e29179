//! Branching conversation history with checkout, tags and cherry-pick.
//!
//! A [`Tree`] owns every [`Node`] through its [`NodeStore`] and tracks a single
//! current leaf; the checked-out path is always derived from it.

mod error;
mod node;
mod paths;
mod persist;
pub mod render;
mod schema;
mod store;
mod tree;

pub use error::{PersistenceError, TreeError};
pub use node::{Node, NodeId, NodeRef, Role};
pub use paths::{chat_file_path, list_chats, ChatListing, CHAT_FILE_EXTENSION};
pub use persist::{load, save};
pub use render::{render_full, render_node, render_path, RenderOptions, RoleMarkers};
pub use schema::{ConversationFile, NodeRecord, CONVERSATION_VERSION};
pub use store::NodeStore;
pub use tree::{DeleteReport, Direction, StepOutcome, Tree};
