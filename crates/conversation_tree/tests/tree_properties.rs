use conversation_tree::{
    render_path, Direction, NodeRef, Role, RoleMarkers, StepOutcome, Tree, TreeError,
};
use pretty_assertions::assert_eq;

fn texts(tree: &Tree) -> Vec<String> {
    tree.path().iter().map(|node| node.text.clone()).collect()
}

fn scenario() -> Tree {
    let mut tree = Tree::new();
    tree.input("hello").expect("hello");
    tree.output("hi there").expect("hi there");
    tree.input("how are you").expect("how are you");
    tree
}

#[test]
fn linear_appends_grow_one_chain() {
    let mut tree = Tree::new();
    for turn in 0..7 {
        if turn % 2 == 0 {
            tree.input(format!("in {turn}")).expect("input");
        } else {
            tree.output(format!("out {turn}")).expect("output");
        }
        assert_eq!(tree.len(), turn + 1);
        assert_eq!(tree.path().len(), turn + 1);
    }
    assert_eq!(tree.roots().len(), 1);
}

#[test]
fn hello_scenario_renders_with_role_markers() {
    let tree = scenario();

    assert_eq!(tree.len(), 3);
    assert_eq!(texts(&tree), vec!["hello", "hi there", "how are you"]);
    assert_eq!(
        render_path(&tree, &RoleMarkers::default()),
        "In: hello\nOut: hi there\nIn: how are you"
    );

    let custom = RoleMarkers {
        input: "Q: ".to_string(),
        output: "A: ".to_string(),
    };
    assert_eq!(
        render_path(&tree, &custom),
        "Q: hello\nA: hi there\nQ: how are you"
    );
}

#[test]
fn checkout_renders_exact_ancestor_chain_regardless_of_prior_state() {
    let mut tree = scenario();
    let hi = tree.path()[1].id;
    tree.clear_checkout();
    tree.input("elsewhere").expect("other root");
    tree.output("reply").expect("other reply");

    for _ in 0..2 {
        tree.checkout(hi).expect("checkout by id");
        assert_eq!(
            render_path(&tree, &RoleMarkers::default()),
            "In: hello\nOut: hi there"
        );
        tree.step(Direction::Down);
    }
}

#[test]
fn tag_then_checkout_restores_path_after_branching() {
    let mut tree = scenario();
    let before = tree.path_ids();
    let rendered = render_path(&tree, &RoleMarkers::default());
    tree.tag("v1").expect("tag leaf");

    tree.clear_checkout();
    let first = tree.input("branch one").expect("branch one");
    let second = tree.input("branch two").expect("branch two");

    tree.checkout("v1").expect("checkout tag");
    assert_eq!(tree.path_ids(), before);
    assert_eq!(render_path(&tree, &RoleMarkers::default()), rendered);

    tree.checkout(second).expect("branched nodes stay reachable");
    assert_eq!(tree.path_ids(), vec![first, second]);
}

#[test]
fn retagging_overwrites_and_untag_removes() {
    let mut tree = scenario();
    let leaf = tree.leaf().expect("leaf");
    tree.tag("v1").expect("tag");
    tree.step(Direction::Right);
    let parent = tree.tag("v1").expect("retag");

    assert_ne!(parent, leaf);
    assert_eq!(tree.tags().get("v1"), Some(&parent));
    assert_eq!(tree.untag("v1"), Ok(parent));
    assert_eq!(
        tree.checkout("v1"),
        Err(TreeError::TagNotFound("v1".to_string()))
    );
}

#[test]
fn tag_without_leaf_fails() {
    let mut tree = Tree::new();
    assert_eq!(tree.tag("v1"), Err(TreeError::NoCurrentLeaf));
}

#[test]
fn lookups_fail_with_typed_errors_and_leave_state() {
    let mut tree = scenario();
    let before = tree.clone();

    assert_eq!(tree.checkout(99), Err(TreeError::NodeNotFound(99)));
    assert_eq!(
        tree.checkout("nope"),
        Err(TreeError::TagNotFound("nope".to_string()))
    );
    assert_eq!(tree.edit(42, "x"), Err(TreeError::NodeNotFound(42)));
    assert_eq!(tree.delete(42).err(), Some(TreeError::NodeNotFound(42)));
    assert_eq!(tree, before);
}

#[test]
fn step_boundaries_are_no_ops() {
    let mut tree = Tree::new();
    assert_eq!(tree.step(Direction::Up), StepOutcome::Unchanged);
    assert_eq!(tree.step(Direction::Left), StepOutcome::Unchanged);

    let root = tree.input("root").expect("root");
    let first = tree.output("first").expect("first");
    tree.checkout(root).expect("back to root");
    let second = tree.output("second").expect("second");

    assert_eq!(tree.step(Direction::Down), StepOutcome::Unchanged);
    assert_eq!(tree.step(Direction::Up), StepOutcome::Moved(first));
    assert_eq!(tree.step(Direction::Up), StepOutcome::Unchanged);
    assert_eq!(tree.step(Direction::Down), StepOutcome::Moved(second));

    assert_eq!(tree.step(Direction::Left), StepOutcome::Unchanged);
    assert_eq!(tree.step(Direction::Right), StepOutcome::Moved(root));
    assert_eq!(tree.step(Direction::Right), StepOutcome::Unchanged);
    assert_eq!(tree.step(Direction::Left), StepOutcome::Moved(first));
    assert_eq!(tree.path_ids(), vec![root, first]);
}

#[test]
fn checked_out_set_is_exactly_the_path() {
    let mut tree = scenario();
    let hi = tree.path()[1].id;
    tree.checkout(hi).expect("checkout");
    let branch = tree.input("different question").expect("branch");

    let checked: Vec<u64> = tree
        .nodes()
        .filter(|node| tree.is_checked_out(node.id))
        .map(|node| node.id)
        .collect();
    assert_eq!(checked, tree.path_ids());
    assert_eq!(tree.path_ids().last(), Some(&branch));
}

#[test]
fn deleting_interior_node_orphans_children() {
    let mut tree = scenario();
    let ids = tree.path_ids();
    let before = tree.len();

    let report = tree.delete(ids[1]).expect("delete interior");

    assert_eq!(tree.len(), before - 1);
    assert_eq!(report.orphaned, vec![ids[2]]);
    assert!(tree.node(ids[0]).expect("root").child_ids.is_empty());
    assert_eq!(tree.node(ids[2]).expect("orphan").parent_id, None);
    assert_eq!(tree.roots(), vec![ids[0], ids[2]]);
    assert_eq!(tree.path_ids(), vec![ids[0]]);
}

#[test]
fn deleting_tagged_node_drops_its_tags() {
    let mut tree = scenario();
    let leaf = tree.leaf().expect("leaf");
    tree.tag("v1").expect("tag");
    tree.tag("latest").expect("tag");

    let report = tree.delete(leaf).expect("delete leaf");

    assert_eq!(
        report.dropped_tags,
        vec!["latest".to_string(), "v1".to_string()]
    );
    assert!(tree.tags().is_empty());
    assert_eq!(tree.path().len(), 2);
}

#[test]
fn delete_many_is_validated_up_front() {
    let mut tree = scenario();
    let ids = tree.path_ids();

    assert_eq!(
        tree.delete_many(&[ids[0], 77]).err(),
        Some(TreeError::NodeNotFound(77))
    );
    assert_eq!(tree.len(), 3);

    tree.delete_many(&[ids[2], ids[0]]).expect("delete two");
    assert_eq!(tree.len(), 1);
    assert_eq!(tree.roots(), vec![ids[1]]);
}

#[test]
fn cherry_pick_copies_in_order_and_keeps_originals() {
    let mut tree = scenario();
    let ids = tree.path_ids();
    tree.tag("greeting").expect("tag");
    tree.clear_checkout();
    let root = tree.input("fresh start").expect("fresh root");

    let created = tree
        .cherry_pick(&[NodeRef::Id(ids[1]), NodeRef::parse("greeting")])
        .expect("cherry-pick");

    assert_eq!(created.len(), 2);
    assert!(created.iter().all(|id| !ids.contains(id)));
    assert_eq!(
        texts(&tree),
        vec!["fresh start", "hi there", "how are you"]
    );
    assert_eq!(tree.node(created[0]).expect("copy").role, Role::Assistant);
    assert_eq!(tree.path_ids()[0], root);
    assert_eq!(tree.node(ids[1]).expect("original").parent_id, Some(ids[0]));
    assert_eq!(tree.node(ids[1]).expect("original").text, "hi there");
}

#[test]
fn cherry_pick_is_all_or_nothing() {
    let mut tree = scenario();
    let ids = tree.path_ids();
    let before = tree.clone();

    let error = tree
        .cherry_pick(&[NodeRef::Id(ids[0]), NodeRef::parse("missing")])
        .expect_err("bad target");

    assert_eq!(error, TreeError::TagNotFound("missing".to_string()));
    assert_eq!(tree, before);
}

#[test]
fn edit_replaces_text_in_place() {
    let mut tree = scenario();
    let ids = tree.path_ids();
    tree.edit(ids[1], "hey").expect("edit");

    assert_eq!(texts(&tree), vec!["hello", "hey", "how are you"]);
    assert_eq!(tree.path_ids(), ids);
}

#[test]
fn context_nodes_stay_off_the_path() {
    let mut tree = scenario();
    let ids = tree.path_ids();
    let context = tree.add_context("background facts", ids[0]).expect("context");

    assert_eq!(tree.len(), 4);
    assert_eq!(tree.path_ids(), ids);
    assert!(!tree.roots().contains(&context));
    assert_eq!(tree.checkout(context), Err(TreeError::NotOnPath(context)));
    assert_eq!(
        tree.context_of(ids[0])
            .expect("anchor")
            .iter()
            .map(|node| node.text.as_str())
            .collect::<Vec<_>>(),
        vec!["background facts"]
    );
    assert_eq!(tree.path_context().len(), 1);
    assert!(!render_path(&tree, &RoleMarkers::default()).contains("background"));

    assert_eq!(tree.delete_context(ids[0]), Err(TreeError::NotContext(ids[0])));
    tree.delete_context(context).expect("delete context");
    assert!(tree.context_of(ids[0]).expect("anchor").is_empty());
    assert_eq!(tree.len(), 3);
}

#[test]
fn new_root_after_clear_checkout_forms_forest() {
    let mut tree = scenario();
    tree.clear_checkout();
    assert!(tree.path().is_empty());

    let root = tree.input("second conversation").expect("new root");
    assert_eq!(tree.roots().len(), 2);
    assert_eq!(tree.path_ids(), vec![root]);
}
