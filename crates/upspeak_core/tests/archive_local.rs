use serde_json::json;
use upspeak_core::{
    Annotation, Archive, ArchiveError, Edge, LocalArchive, Node, ResourceKind,
};
use uuid::Uuid;

fn open_archive() -> (tempfile::TempDir, LocalArchive) {
    let dir = tempfile::tempdir().unwrap();
    let archive = LocalArchive::open(dir.path()).unwrap();
    (dir, archive)
}

#[test]
fn open_creates_metadata_layout() {
    let (dir, archive) = open_archive();

    assert_eq!(archive.root(), dir.path());
    assert!(archive.metadata_db_path().ends_with(".meta/metadata.db"));
    assert!(archive.metadata_db_path().is_file());
}

#[test]
fn node_round_trip_keeps_every_field() {
    let (_dir, archive) = open_archive();
    let node = Node::new("Comment", "application/json", json!({"text": "hello", "n": 3}))
        .with_subject("greeting")
        .with_metadata(json!({"lang": "en"}));

    archive.save_node(&node).unwrap();

    assert_eq!(archive.get_node(node.id).unwrap(), node);
    assert!(archive.blobs().top_level_path(node.id).is_file());
}

#[test]
fn node_without_body_writes_no_blob() {
    let (_dir, archive) = open_archive();
    let node = Node::new("Node", "text/plain", serde_json::Value::Null);

    archive.save_node(&node).unwrap();

    assert!(!archive.blobs().top_level_path(node.id).exists());
    assert_eq!(archive.get_node(node.id).unwrap().body, serde_json::Value::Null);
}

#[test]
fn saving_same_node_twice_is_last_writer_wins() {
    let (_dir, archive) = open_archive();
    let mut node = Node::text("first");
    archive.save_node(&node).unwrap();
    archive.save_node(&node).unwrap();

    node.body = json!("second");
    node.subject = "edited".to_string();
    archive.save_node(&node).unwrap();

    let stored = archive.get_node(node.id).unwrap();
    assert_eq!(stored.body, json!("second"));
    assert_eq!(stored.subject, "edited");
}

#[test]
fn saving_a_null_body_clears_the_previous_blob() {
    let (_dir, archive) = open_archive();
    let mut node = Node::text("old");
    archive.save_node(&node).unwrap();

    node.body = serde_json::Value::Null;
    archive.save_node(&node).unwrap();

    assert_eq!(archive.get_node(node.id).unwrap(), node);
    assert!(!archive.blobs().top_level_path(node.id).exists());
}

#[test]
fn missing_entities_report_not_found_per_kind() {
    let (_dir, archive) = open_archive();
    let id = Uuid::now_v7();

    let cases = [
        (archive.get_node(id).map(|_| ()), ResourceKind::Node),
        (archive.get_edge(id).map(|_| ()), ResourceKind::Edge),
        (archive.get_thread(id).map(|_| ()), ResourceKind::Thread),
        (archive.get_annotation(id).map(|_| ()), ResourceKind::Annotation),
    ];
    for (result, expected) in cases {
        match result.unwrap_err() {
            ArchiveError::NotFound { resource, id: missing } => {
                assert_eq!(resource, expected);
                assert_eq!(missing, id);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

#[test]
fn delete_node_removes_row_and_blob() {
    let (_dir, archive) = open_archive();
    let node = Node::text("bye");
    archive.save_node(&node).unwrap();

    archive.delete_node(node.id).unwrap();

    assert!(archive.get_node(node.id).unwrap_err().is_not_found());
    assert!(!archive.blobs().top_level_path(node.id).exists());
}

#[test]
fn edges_survive_node_deletion_until_cascade() {
    let (_dir, archive) = open_archive();
    let (a, b) = (Node::text("a"), Node::text("b"));
    archive.save_node(&a).unwrap();
    archive.save_node(&b).unwrap();
    let edge = Edge::reply(a.id, b.id).with_label("answers");
    archive.save_edge(&edge).unwrap();

    archive.delete_node(b.id).unwrap();

    assert_eq!(archive.get_edge(edge.id).unwrap(), edge);
    assert_eq!(archive.delete_edges_by_node(b.id).unwrap(), 1);
    assert!(archive.get_edge(edge.id).unwrap_err().is_not_found());
}

#[test]
fn edge_round_trip_and_update() {
    let (_dir, archive) = open_archive();
    let mut edge = Edge::child(Uuid::now_v7(), Uuid::now_v7());
    archive.save_edge(&edge).unwrap();
    assert_eq!(archive.get_edge(edge.id).unwrap(), edge);

    edge.weight = 0.75;
    edge.label = "moved".to_string();
    archive.save_edge(&edge).unwrap();
    assert_eq!(archive.get_edge(edge.id).unwrap(), edge);

    archive.delete_edge(edge.id).unwrap();
    assert!(archive.get_edge(edge.id).unwrap_err().is_not_found());
}

#[test]
fn edges_by_node_matches_both_directions() {
    let (_dir, archive) = open_archive();
    let (a, b, c) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());
    let outgoing = Edge::reply(a, b);
    let incoming = Edge::fork(c, a);
    let unrelated = Edge::child(b, c);
    for edge in [&outgoing, &incoming, &unrelated] {
        archive.save_edge(edge).unwrap();
    }

    let mut ids: Vec<Uuid> = archive
        .edges_by_node(a)
        .unwrap()
        .into_iter()
        .map(|edge| edge.id)
        .collect();
    ids.sort();
    let mut expected = vec![outgoing.id, incoming.id];
    expected.sort();
    assert_eq!(ids, expected);
}

#[test]
fn annotation_round_trip_and_idempotent_delete() {
    let (_dir, archive) = open_archive();
    let target = Node::text("paragraph");
    archive.save_node(&target).unwrap();
    let annotation = Annotation::new(
        Node::new("Annotation", "text/plain", json!("nice point")),
        target.id,
        "commenting",
    );

    archive.save_annotation(&annotation).unwrap();

    let stored = archive.get_annotation(annotation.id()).unwrap();
    assert_eq!(stored, annotation);
    assert_eq!(stored.target(), target.id);
    assert_eq!(stored.edge.weight, 0.25);

    archive.delete_annotation(annotation.id()).unwrap();
    assert!(archive
        .get_annotation(annotation.id())
        .unwrap_err()
        .is_not_found());
    assert!(archive.get_edge(annotation.edge.id).unwrap_err().is_not_found());
    assert!(archive.get_node(annotation.id()).unwrap_err().is_not_found());

    archive.delete_annotation(annotation.id()).unwrap();
}
