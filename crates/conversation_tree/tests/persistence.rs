use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use conversation_tree::{
    chat_file_path, list_chats, load, save, NodeRef, PersistenceError, Tree,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::TempDir;

fn temp_chat() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let path = dir.path().join("chats").join("default.json");
    (dir, path)
}

fn populated(path: &Path) -> Tree {
    let mut tree = Tree::with_backing_path(path);
    let root = tree.input("hello").expect("hello");
    tree.output("hi there").expect("reply");
    tree.tag("v1").expect("tag");
    tree.checkout(root).expect("checkout root");
    tree.output("alternative").expect("alt");
    tree.add_context("facts", root).expect("context");
    tree.set_metadata(root, "summary", json!("greeting"))
        .expect("metadata");
    tree.set_summary(Some("a short chat".to_string()));
    tree
}

fn write_json(path: &Path, value: &Value) {
    fs::create_dir_all(path.parent().expect("parent")).expect("dir");
    fs::write(path, serde_json::to_vec(value).expect("json")).expect("write");
}

#[test]
fn missing_file_loads_as_empty_backed_tree() {
    let (_dir, path) = temp_chat();
    let tree = Tree::open(&path).expect("missing file is fine");

    assert!(tree.is_empty());
    assert_eq!(tree.backing_path(), Some(path.as_path()));
    assert!(!path.exists());
}

#[test]
fn round_trip_preserves_path_tags_and_contents() {
    let (_dir, path) = temp_chat();
    let tree = populated(&path);
    tree.save().expect("save");

    let loaded = load(&path).expect("load");

    assert_eq!(loaded.path_ids(), tree.path_ids());
    assert_eq!(loaded.tags(), tree.tags());
    assert_eq!(loaded.summary(), Some("a short chat"));
    for node in tree.nodes() {
        assert_eq!(loaded.node(node.id).expect("same ids"), node);
    }
    assert_eq!(loaded.store().next_id(), tree.store().next_id());
}

#[test]
fn ids_are_not_reused_after_delete_and_reload() {
    let (_dir, path) = temp_chat();
    let mut tree = Tree::with_backing_path(&path);
    tree.input("a").expect("a");
    let b = tree.output("b").expect("b");
    tree.delete(b).expect("delete b");
    tree.save().expect("save");

    let mut loaded = Tree::open(&path).expect("load");
    let c = loaded.output("c").expect("c");
    assert!(c > b);
}

#[test]
fn saved_file_matches_documented_shape() {
    let (_dir, path) = temp_chat();
    let mut tree = Tree::with_backing_path(&path);
    tree.input("hello").expect("hello");
    tree.tag("v1").expect("tag");
    tree.save().expect("save");

    let value: Value = serde_json::from_slice(&fs::read(&path).expect("read")).expect("json");

    assert_eq!(
        value,
        json!({
            "version": 1,
            "next_id": 2,
            "leaf_id": 1,
            "tags": { "v1": 1 },
            "summary": null,
            "nodes": [{
                "id": 1,
                "role": "user",
                "text": "hello",
                "parent_id": null,
                "child_ids": [],
                "checked_out": true,
                "context_ids": [],
                "embedding": null,
                "metadata": {}
            }]
        })
    );
}

#[test]
fn load_rejects_unsupported_version() {
    let (_dir, path) = temp_chat();
    write_json(&path, &json!({ "version": 2, "next_id": 1, "nodes": [] }));

    let error = load(&path).expect_err("version 2 must fail");
    assert!(matches!(
        error,
        PersistenceError::UnsupportedVersion { found: 2, .. }
    ));
}

#[test]
fn load_rejects_duplicate_ids() {
    let (_dir, path) = temp_chat();
    write_json(
        &path,
        &json!({
            "version": 1,
            "next_id": 3,
            "nodes": [
                { "id": 1, "role": "user", "text": "a" },
                { "id": 1, "role": "user", "text": "b" }
            ]
        }),
    );

    let error = load(&path).expect_err("duplicate id must fail");
    assert!(matches!(error, PersistenceError::DuplicateNodeId { id: 1, .. }));
}

#[test]
fn load_rejects_one_sided_links() {
    let (_dir, path) = temp_chat();
    write_json(
        &path,
        &json!({
            "version": 1,
            "next_id": 3,
            "nodes": [
                { "id": 1, "role": "user", "text": "a", "child_ids": [] },
                { "id": 2, "role": "assistant", "text": "b", "parent_id": 1 }
            ]
        }),
    );
    let error = load(&path).expect_err("parent without child link must fail");
    assert!(matches!(
        error,
        PersistenceError::DanglingParent {
            node_id: 2,
            parent_id: 1,
            ..
        }
    ));

    write_json(
        &path,
        &json!({
            "version": 1,
            "next_id": 3,
            "nodes": [
                { "id": 1, "role": "user", "text": "a", "child_ids": [2] },
                { "id": 2, "role": "assistant", "text": "b" }
            ]
        }),
    );
    let error = load(&path).expect_err("child without parent link must fail");
    assert!(matches!(
        error,
        PersistenceError::ChildMismatch {
            node_id: 1,
            child_id: 2,
            ..
        }
    ));
}

#[test]
fn load_rejects_dangling_tags_and_leaf() {
    let (_dir, path) = temp_chat();
    write_json(
        &path,
        &json!({
            "version": 1,
            "next_id": 2,
            "tags": { "v1": 9 },
            "nodes": [{ "id": 1, "role": "user", "text": "a" }]
        }),
    );
    assert!(matches!(
        load(&path).expect_err("dangling tag"),
        PersistenceError::DanglingTag { node_id: 9, .. }
    ));

    write_json(
        &path,
        &json!({
            "version": 1,
            "next_id": 2,
            "leaf_id": 5,
            "nodes": [{ "id": 1, "role": "user", "text": "a" }]
        }),
    );
    assert!(matches!(
        load(&path).expect_err("dangling leaf"),
        PersistenceError::DanglingLeaf { leaf_id: 5, .. }
    ));
}

#[test]
fn load_rejects_malformed_json_and_unknown_fields() {
    let (_dir, path) = temp_chat();
    fs::create_dir_all(path.parent().expect("parent")).expect("dir");
    fs::write(&path, "{ not json").expect("write");
    assert!(matches!(
        load(&path).expect_err("garbage"),
        PersistenceError::JsonParse { .. }
    ));

    write_json(
        &path,
        &json!({ "version": 1, "next_id": 1, "nodes": [], "extra": true }),
    );
    assert!(matches!(
        load(&path).expect_err("unknown field"),
        PersistenceError::JsonParse { .. }
    ));
}

#[test]
fn failed_save_keeps_previous_file() {
    let (_dir, path) = temp_chat();
    let tree = populated(&path);
    tree.save().expect("first save");
    let before = fs::read(&path).expect("read");

    let blocked = path.parent().expect("parent").join("blocked");
    fs::create_dir_all(&blocked).expect("dir");
    let error = save(&tree, &blocked).expect_err("cannot replace a directory");
    assert!(matches!(error, PersistenceError::Io { .. }));

    assert_eq!(fs::read(&path).expect("read"), before);
    let leftovers: Vec<_> = fs::read_dir(path.parent().expect("parent"))
        .expect("list")
        .map(|entry| entry.expect("entry").file_name())
        .collect();
    assert_eq!(leftovers.len(), 2);
}

#[test]
fn concurrent_writers_are_last_write_wins() {
    let (_dir, path) = temp_chat();
    let mut first = Tree::with_backing_path(&path);
    first.input("from first").expect("first");
    first.save().expect("create file");

    let mut second = Tree::open(&path).expect("second session");
    first.output("first reply").expect("first reply");
    second.output("second reply").expect("second reply");

    let handles: Vec<_> = [first, second]
        .into_iter()
        .map(|tree| {
            thread::spawn(move || {
                for _ in 0..20 {
                    tree.save().expect("save");
                }
                tree
            })
        })
        .collect();
    let trees: Vec<Tree> = handles
        .into_iter()
        .map(|handle| handle.join().expect("writer thread"))
        .collect();

    let loaded = load(&path).expect("file always parses");
    let leaf_text = loaded.leaf_node().map(|node| node.text.clone());
    let winner = trees
        .iter()
        .find(|tree| tree.leaf_node().map(|node| node.text.clone()) == leaf_text)
        .expect("result matches exactly one writer");
    assert_eq!(loaded.len(), winner.len());
    assert_eq!(loaded.path_ids(), winner.path_ids());

    winner.save().expect("final save");
    let reloaded = load(&path).expect("reload");
    assert_eq!(reloaded.path_ids(), winner.path_ids());
}

#[test]
fn list_chats_reports_summaries_and_skips_garbage() {
    let dir = tempfile::tempdir().expect("tempdir");
    let chats = dir.path();

    let mut named = Tree::with_backing_path(chat_file_path(chats, "named").expect("path"));
    named.input("ignored first line").expect("input");
    named.set_summary(Some("explicit summary".to_string()));
    named.save().expect("save named");

    let mut plain = Tree::with_backing_path(chat_file_path(chats, "plain").expect("path"));
    plain.input("what is rust?\nmore").expect("input");
    plain.output("a language").expect("output");
    plain.save().expect("save plain");

    fs::write(chats.join("broken.json"), "nope").expect("write garbage");
    fs::write(chats.join("notes.txt"), "ignored").expect("write other");

    let listings = list_chats(chats).expect("list");

    assert_eq!(
        listings
            .iter()
            .map(|listing| (listing.name.as_str(), listing.summary.as_deref(), listing.nodes))
            .collect::<Vec<_>>(),
        vec![
            ("named", Some("explicit summary"), 1),
            ("plain", Some("what is rust?"), 2),
        ]
    );
    assert!(list_chats(&chats.join("missing")).expect("missing dir").is_empty());
}

#[test]
fn node_refs_round_trip_through_tags_after_reload() {
    let (_dir, path) = temp_chat();
    let tree = populated(&path);
    tree.save().expect("save");

    let mut loaded = load(&path).expect("load");
    let id = loaded.checkout(NodeRef::parse("v1")).expect("tag survives");
    assert_eq!(loaded.node(id).expect("node").text, "hi there");
}
