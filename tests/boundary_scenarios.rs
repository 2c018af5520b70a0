//! Integration tests for the six boundary scenarios and the testable
//! properties that exercise more than one module at once. Single-module
//! unit tests live alongside their modules; these need the full facade.

use std::sync::Arc;

use vfs_engine::{Event, EventType, Facade, MemoryAdapter, MergeOptions};

fn open(name: &str) -> Facade {
    Facade::open(Arc::new(MemoryAdapter::new()), name).unwrap()
}

/// Boundary scenario 1.
#[test]
fn create_then_read() {
    let facade = open("boundary-create-then-read");
    let node = facade.create_file("default", "/a.md", Some("hello"), None).unwrap();
    assert_eq!(node.size, 5);
    assert_eq!(facade.read("default", "/a.md").unwrap(), "hello");
    Facade::shutdown("boundary-create-then-read").unwrap();
}

/// Boundary scenario 2.
#[test]
fn unique_path_collision_leaves_state_unchanged() {
    let facade = open("boundary-unique-path");
    facade.create_file("default", "/a.md", Some("x"), None).unwrap();
    let err = facade.create_file("default", "/a.md", Some("y"), None).unwrap_err();
    assert!(err.to_string().contains("already exists"));
    assert_eq!(facade.read("default", "/a.md").unwrap(), "x");
    Facade::shutdown("boundary-unique-path").unwrap();
}

/// Boundary scenario 3.
#[test]
fn recursive_delete_removes_every_descendant_and_its_content() {
    let facade = open("boundary-recursive-delete");
    facade.create_directory("default", "/d", None).unwrap();
    facade.create_file("default", "/d/f1.md", Some("a"), None).unwrap();
    facade.create_file("default", "/d/f2.md", Some("b"), None).unwrap();

    facade.delete("default", "/d", true).unwrap();

    assert!(facade.vfs().resolve("default", "/d").unwrap().is_none());
    assert!(facade.vfs().resolve("default", "/d/f1.md").unwrap().is_none());
    assert!(facade.vfs().resolve("default", "/d/f2.md").unwrap().is_none());

    let contents = facade.vfs().storage().get_collection("contents").unwrap().get_all().unwrap();
    assert!(contents.is_empty());
    Facade::shutdown("boundary-recursive-delete").unwrap();
}

/// Boundary scenario 4 (P4, P6).
#[test]
fn cross_module_batch_move_rewrites_module_id_and_srs_rows() {
    let facade = open("boundary-cross-module-move");
    facade.mount_module("a", Default::default()).unwrap();
    facade.mount_module("b", Default::default()).unwrap();

    facade.create_directory("a", "/x", None).unwrap();
    let y = facade.create_file("a", "/x/y.md", Some("hi"), None).unwrap();
    facade
        .update_srs_item(&y.node_id, "c1", "a", 0, 1, 2.5)
        .unwrap();

    let b_root = facade.vfs().resolve("b", "/").unwrap().unwrap();
    facade.vfs().batch_move(&[y.node_id.clone()], &b_root).unwrap();

    let moved = facade.vfs().get_node(&y.node_id).unwrap().unwrap();
    assert_eq!(moved.module_id, "b");
    assert_eq!(moved.system_path, "/b/y.md");

    let items = facade.vfs().get_srs_items_by_node_id(&y.node_id).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].module_id, "b");

    Facade::shutdown("boundary-cross-module-move").unwrap();
}

/// Boundary scenario 5 (P8).
#[test]
fn incremental_restore_keeps_live_edits_and_unions_tags() {
    let facade = open("boundary-incremental-restore");
    facade.create_file("default", "/n.md", Some("A"), None).unwrap();
    facade.set_tags("default", "/n.md", &["t1".to_string()]).unwrap();

    let backup = facade.create_system_backup().unwrap();

    facade.write("default", "/n.md", "B").unwrap();
    facade.set_tags("default", "/n.md", &["t2".to_string()]).unwrap();

    facade
        .restore_system_backup_incrementally(
            &backup,
            MergeOptions {
                overwrite: false,
                merge_tags: true,
            },
        )
        .unwrap();

    assert_eq!(facade.read("default", "/n.md").unwrap(), "B");
    let node = facade.vfs().get_node(
        &facade.vfs().resolve("default", "/n.md").unwrap().unwrap(),
    ).unwrap().unwrap();
    let mut tags = node.tags.clone();
    tags.sort();
    assert_eq!(tags, vec!["t1".to_string(), "t2".to_string()]);

    Facade::shutdown("boundary-incremental-restore").unwrap();
}

/// Boundary scenario 6. The bus is synchronous and single-threaded, so
/// "without awaiting" collapses to two back-to-back calls on one thread;
/// what's asserted is that both still land, in order, as distinct events.
#[test]
fn back_to_back_writes_land_in_call_order() {
    let facade = open("boundary-concurrent-writes");
    let node = facade.create_file("default", "/a.md", Some("v0"), None).unwrap();

    let seen: Arc<std::sync::Mutex<Vec<u64>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    facade.event_bus().on(EventType::NodeUpdated, move |event: &Event| {
        sink.lock().unwrap().push(event.timestamp);
    });

    facade.write("default", "/a.md", "v1").unwrap();
    facade.write("default", "/a.md", "v2").unwrap();

    assert_eq!(facade.read("default", "/a.md").unwrap(), "v2");
    assert_eq!(node.system_path, "/default/a.md");
    let recorded = seen.lock().unwrap();
    assert_eq!(recorded.len(), 2);
    assert!(recorded[0] <= recorded[1]);
    Facade::shutdown("boundary-concurrent-writes").unwrap();
}
