use partmap_core::{
    Dimensions, ImpressionCategory, JournalEntry, JournalFilter, MapGraph, NodeId, NodeKind,
    Position, Store, StoreError, UserId,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn store() -> (tempfile::TempDir, Store) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path());
    (dir, store)
}

fn user(name: &str) -> UserId {
    UserId::parse(name).unwrap()
}

fn sample_graph() -> MapGraph {
    let mut graph = MapGraph::new();
    let part = graph.create_node(NodeKind::Part, Position::new(100.0, 100.0), "Critic").id;
    graph.set_measured(&part, Dimensions::new(200.0, 150.0));
    let rel = graph.create_node(NodeKind::Relationship, Position::new(400.0, 0.0), "Standoff").id;
    graph.add_part_to_relationship(&rel, &part).unwrap();
    let imp = graph
        .create_node(
            NodeKind::Impression(ImpressionCategory::Emotion),
            Position::new(0.0, 0.0),
            "shame",
        )
        .id;
    graph.on_node_drag_stop(&imp, Position::new(150.0, 120.0)).unwrap();
    graph.add_sidebar_impression(ImpressionCategory::Thought, "I should");
    graph
}

#[test]
fn saved_map_hydrates_unchanged() {
    let (_dir, store) = store();
    let alice = user("alice");

    let mut doc = store.create_map(&alice, "Morning map").unwrap();
    doc.graph = sample_graph();
    store.save_map(&alice, &mut doc).unwrap();

    let loaded = store.read_map(&alice, &doc.id).unwrap();
    assert_eq!(loaded, doc);
    assert!(loaded.graph.violations().is_empty());
}

#[test]
fn maps_are_scoped_per_user() {
    let (_dir, store) = store();
    let alice = user("alice");
    let bob = user("bob");

    let doc = store.create_map(&alice, "Private").unwrap();
    assert!(matches!(
        store.read_map(&bob, &doc.id),
        Err(StoreError::NotFound { what: "map", .. })
    ));
    assert!(store.list_maps(&bob).unwrap().is_empty());
    assert_eq!(store.list_maps(&alice).unwrap().len(), 1);
}

#[test]
fn list_maps_sorts_by_name() {
    let (_dir, store) = store();
    let alice = user("alice");
    store.create_map(&alice, "b").unwrap();
    store.create_map(&alice, "a").unwrap();
    store.create_map(&alice, "c").unwrap();

    let names: Vec<String> = store
        .list_maps(&alice)
        .unwrap()
        .into_iter()
        .map(|m| m.name)
        .collect();
    assert_eq!(names, vec!["a", "b", "c"]);
}

#[test]
fn save_graph_rename_and_delete() {
    let (_dir, store) = store();
    let alice = user("alice");
    let doc = store.create_map(&alice, "Draft").unwrap();

    let saved = store.save_map_graph(&alice, &doc.id, sample_graph()).unwrap();
    assert!(saved.updated_at >= doc.updated_at);
    assert_eq!(saved.graph.nodes.len(), 2);

    let renamed = store.rename_map(&alice, &doc.id, "Final").unwrap();
    assert_eq!(renamed.name, "Final");
    assert_eq!(renamed.graph, saved.graph);

    store.delete_map(&alice, &doc.id).unwrap();
    store.delete_map(&alice, &doc.id).unwrap();
    assert!(store.list_maps(&alice).unwrap().is_empty());
}

#[test]
fn last_write_wins() {
    let (_dir, store) = store();
    let alice = user("alice");
    let doc = store.create_map(&alice, "Shared").unwrap();

    let mut tab_one = store.read_map(&alice, &doc.id).unwrap();
    let mut tab_two = store.read_map(&alice, &doc.id).unwrap();
    tab_one
        .graph
        .create_node(NodeKind::Part, Position::default(), "from tab one");
    tab_two
        .graph
        .create_node(NodeKind::Part, Position::default(), "from tab two");
    store.save_map(&alice, &mut tab_one).unwrap();
    store.save_map(&alice, &mut tab_two).unwrap();

    let loaded = store.read_map(&alice, &doc.id).unwrap();
    assert_eq!(loaded.graph.nodes.len(), 1);
    assert_eq!(loaded.graph.nodes[0].label(), "from tab two");
}

#[test]
fn invalid_ids_are_rejected() {
    let (_dir, store) = store();
    let alice = user("alice");
    assert!(matches!(
        store.read_map(&alice, "../bob/maps/x"),
        Err(StoreError::InvalidId { .. })
    ));
    assert!(matches!(
        store.delete_journal_entry(&alice, "a.b"),
        Err(StoreError::InvalidId { .. })
    ));
}

fn entry(title: &str, part: Option<&str>) -> JournalEntry {
    let now = chrono::Utc::now();
    JournalEntry {
        id: String::new(),
        owner: String::new(),
        map_id: Some("map-1".into()),
        part_id: part.map(NodeId::from),
        title: title.into(),
        content: json!({"type": "doc", "content": [{"type": "paragraph"}]}),
        created_at: now,
        updated_at: now,
    }
}

#[test]
fn journal_entries_create_update_filter() {
    let (_dir, store) = store();
    let alice = user("alice");

    let first = store.write_journal_entry(&alice, entry("first", Some("node-1"))).unwrap();
    assert!(!first.id.is_empty());
    assert_eq!(first.owner, "alice");
    let second = store.write_journal_entry(&alice, entry("second", None)).unwrap();

    let mut edited = first.clone();
    edited.title = "first, revised".into();
    let edited = store.write_journal_entry(&alice, edited).unwrap();
    assert_eq!(edited.created_at, first.created_at);
    assert!(edited.updated_at >= first.updated_at);

    let all = store.list_journal(&alice, &JournalFilter::default()).unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, edited.id);

    let about_part = store
        .list_journal(
            &alice,
            &JournalFilter {
                map_id: None,
                part_id: Some(NodeId::from("node-1")),
            },
        )
        .unwrap();
    assert_eq!(about_part.len(), 1);
    assert_eq!(about_part[0].title, "first, revised");
    assert_eq!(about_part[0].content, first.content);

    store.delete_journal_entry(&alice, &second.id).unwrap();
    assert!(matches!(
        store.read_journal_entry(&alice, &second.id),
        Err(StoreError::NotFound { .. })
    ));
}

#[test]
fn journal_entries_are_private() {
    let (_dir, store) = store();
    let alice = user("alice");
    let bob = user("bob");
    let written = store.write_journal_entry(&alice, entry("mine", None)).unwrap();

    assert!(store.read_journal_entry(&bob, &written.id).is_err());
    assert!(store
        .list_journal(&bob, &JournalFilter::default())
        .unwrap()
        .is_empty());
}

#[test]
fn concurrent_saves_of_one_map_all_land() {
    let (dir, store) = store();
    let alice = user("alice");
    let doc = store.create_map(&alice, "Busy").unwrap();

    std::thread::scope(|scope| {
        for t in 0..4 {
            let store = &store;
            let alice = &alice;
            let mut copy = doc.clone();
            scope.spawn(move || {
                for i in 0..25 {
                    copy.graph
                        .create_node(NodeKind::Part, Position::default(), &format!("{t}-{i}"));
                    store.save_map(alice, &mut copy).unwrap();
                }
            });
        }
    });

    let loaded = store.read_map(&alice, &doc.id).unwrap();
    assert_eq!(loaded.graph.nodes.len(), 25);
    let leftovers: Vec<_> = walk(dir.path())
        .into_iter()
        .filter(|p| p.to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

fn walk(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir).unwrap().flatten() {
        let path = entry.path();
        if path.is_dir() {
            out.extend(walk(&path));
        } else {
            out.push(path);
        }
    }
    out
}
