//! Integration tests for the session-engine adapter (spec.md §4.8) and the
//! tag/search properties that only show up once a module boundary and a
//! second consumer are both in play.

use std::sync::Arc;

use vfs_engine::engine::{SearchOptions, SearchScope};
use vfs_engine::{Facade, MemoryAdapter, SessionEngine};

fn session(db_name: &str, module: &str) -> SessionEngine {
    let facade = Facade::open(Arc::new(MemoryAdapter::new()), db_name).unwrap();
    facade.mount_module(module, Default::default()).unwrap();
    SessionEngine::new(facade, module)
}

/// P4: a session scoped to one module never sees another module's nodes,
/// even when both share the same database and the search has no filters.
#[test]
fn search_stays_within_the_session_module() {
    let facade = Facade::open(Arc::new(MemoryAdapter::new()), "session-tags-isolation").unwrap();
    facade.mount_module("notes", Default::default()).unwrap();
    facade.mount_module("work", Default::default()).unwrap();
    facade.create_file("notes", "/a.md", Some("hi"), None).unwrap();
    facade.create_file("work", "/b.md", Some("hi"), None).unwrap();

    let session = SessionEngine::new(facade.clone(), "notes");
    let results = session
        .search(SearchOptions {
            scope: SearchScope::All,
            ..Default::default()
        })
        .unwrap();

    assert!(results.iter().all(|n| n.module_id == "notes"));
    assert!(results.iter().any(|n| n.name == "a.md"));
    assert!(results.iter().all(|n| n.name != "b.md"));

    Facade::shutdown("session-tags-isolation").unwrap();
}

/// P7: `set_tags` dedupes and the node's `tags` field is the source of
/// truth a session consumer reads back.
#[test]
fn set_tags_dedupes_and_round_trips() {
    let session = session("session-tag-dedup", "notes");
    session.create_file("/a.md", Some("x"), None).unwrap();
    let updated = session
        .set_tags("/a.md", &["rust".to_string(), "rust".to_string(), "vfs".to_string()])
        .unwrap();

    let mut tags = updated.tags.clone();
    tags.sort();
    assert_eq!(tags, vec!["rust".to_string(), "vfs".to_string()]);
    Facade::shutdown("session-tag-dedup").unwrap();
}

/// set_tags_batch is all-or-nothing: a missing path aborts before any
/// update lands.
#[test]
fn set_tags_batch_is_all_or_nothing() {
    let session = session("session-tag-batch", "notes");
    session.create_file("/a.md", Some("x"), None).unwrap();

    let result = session.set_tags_batch(&[
        ("/a.md".to_string(), vec!["keep".to_string()]),
        ("/missing.md".to_string(), vec!["nope".to_string()]),
    ]);
    assert!(result.is_err());

    let node = session.get_node("/a.md").unwrap().unwrap();
    assert!(node.tags.is_empty());
    Facade::shutdown("session-tag-batch").unwrap();
}

/// Due-card lookups stay scoped to the session's own module.
#[test]
fn due_cards_are_scoped_to_the_session_module() {
    let facade = Facade::open(Arc::new(MemoryAdapter::new()), "session-srs-scope").unwrap();
    facade.mount_module("notes", Default::default()).unwrap();
    facade.mount_module("work", Default::default()).unwrap();
    let a = facade.create_file("notes", "/a.md", Some("x"), None).unwrap();
    let b = facade.create_file("work", "/b.md", Some("y"), None).unwrap();
    facade.update_srs_item(&a.node_id, "c1", "notes", 0, 1, 2.5).unwrap();
    facade.update_srs_item(&b.node_id, "c1", "work", 0, 1, 2.5).unwrap();

    let session = SessionEngine::new(facade, "notes");
    let due = session.get_due_cards(None).unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].node_id, a.node_id);

    Facade::shutdown("session-srs-scope").unwrap();
}
