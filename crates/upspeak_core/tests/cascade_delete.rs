use serde_json::json;
use std::sync::{Arc, Mutex};
use upspeak_core::config::{ArchiveConfig, RepoConfig};
use upspeak_core::model::event::{NodeCreatePayload, NodeDeletePayload};
use upspeak_core::{
    outbound_subject, Archive, ArchiveError, ArchiveResult, CascadeDeleteListener,
    CascadeOutcome, CoreConfig, Edge, Event, EventType, LocalArchive, LocalBus, Node, Payload,
    Publisher, RepoId, Runtime, OUTBOUND_WILDCARD,
};
use uuid::Uuid;

const REPO_ID: &str = "0190a3c4-8e2f-7000-8000-0000000000aa";

fn start_runtime(dir: &tempfile::TempDir) -> (Runtime, RepoId) {
    let config = CoreConfig {
        archive: ArchiveConfig {
            path: dir.path().to_path_buf(),
        },
        repos: vec![RepoConfig {
            id: Some(REPO_ID.to_string()),
            name: "main".to_string(),
        }],
        ..CoreConfig::default()
    };
    let runtime = Runtime::start(&config).unwrap();
    (runtime, Uuid::parse_str(REPO_ID).unwrap())
}

fn record_outbound(runtime: &Runtime) -> Arc<Mutex<Vec<Event>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    runtime
        .bus()
        .subscribe(OUTBOUND_WILDCARD, move |message| {
            sink.lock()
                .unwrap()
                .push(Event::from_slice(&message.data).unwrap());
        })
        .unwrap();
    seen
}

#[test]
fn deleting_a_node_removes_its_edges_through_the_bus() {
    let dir = tempfile::tempdir().unwrap();
    let (runtime, repo_id) = start_runtime(&dir);
    let outbound = record_outbound(&runtime);
    let repository = runtime.registry().get(repo_id).unwrap();

    let nodes: Vec<Node> = ["A", "B", "C", "D", "E"]
        .into_iter()
        .map(|text| Node::new("Node", "text/plain", json!(text)))
        .collect();
    for node in &nodes {
        runtime
            .submit(
                repo_id,
                &Event::new(Payload::CreateNode(NodeCreatePayload { node: node.clone() }))
                    .unwrap(),
            )
            .unwrap();
    }
    let (a, b, c, d, e) = (nodes[0].id, nodes[1].id, nodes[2].id, nodes[3].id, nodes[4].id);
    let a_to_b = Edge::new("Child", a, b, "", 1.0);
    let b_to_c = Edge::new("Child", b, c, "", 1.0);
    let d_to_e = Edge::new("Child", d, e, "", 1.0);
    for edge in [&a_to_b, &b_to_c, &d_to_e] {
        repository.archive().save_edge(edge).unwrap();
    }

    runtime
        .submit(
            repo_id,
            &Event::new(Payload::DeleteNode(NodeDeletePayload { node_id: b })).unwrap(),
        )
        .unwrap();

    let archive = repository.archive();
    assert!(archive.get_edge(a_to_b.id).unwrap_err().is_not_found());
    assert!(archive.get_edge(b_to_c.id).unwrap_err().is_not_found());
    assert_eq!(archive.get_edge(d_to_e.id).unwrap(), d_to_e);

    let kinds: Vec<Option<EventType>> = outbound.lock().unwrap().iter().map(Event::kind).collect();
    assert_eq!(kinds.len(), 6);
    assert_eq!(kinds[5], Some(EventType::NodeDeleted));

    drop(repository);
    assert_eq!(runtime.shutdown().unwrap(), 1);
}

#[test]
fn invalid_command_on_the_bus_is_dropped_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let (runtime, repo_id) = start_runtime(&dir);
    let outbound = record_outbound(&runtime);

    let bogus = Event {
        id: Uuid::now_v7(),
        event_type: "NodeCreated".to_string(),
        payload: json!({}),
    };
    runtime.submit(repo_id, &bogus).unwrap();

    assert!(outbound.lock().unwrap().is_empty());
    runtime.shutdown().unwrap();
}

/// Archive whose cascade delete always fails.
struct BrokenCascade {
    inner: LocalArchive,
}

impl Archive for BrokenCascade {
    fn save_node(&self, node: &Node) -> ArchiveResult<()> {
        self.inner.save_node(node)
    }
    fn get_node(&self, id: Uuid) -> ArchiveResult<Node> {
        self.inner.get_node(id)
    }
    fn delete_node(&self, id: Uuid) -> ArchiveResult<()> {
        self.inner.delete_node(id)
    }
    fn save_edge(&self, edge: &Edge) -> ArchiveResult<()> {
        self.inner.save_edge(edge)
    }
    fn get_edge(&self, id: Uuid) -> ArchiveResult<Edge> {
        self.inner.get_edge(id)
    }
    fn delete_edge(&self, id: Uuid) -> ArchiveResult<()> {
        self.inner.delete_edge(id)
    }
    fn save_thread(&self, thread: &upspeak_core::Thread) -> ArchiveResult<()> {
        self.inner.save_thread(thread)
    }
    fn get_thread(&self, id: Uuid) -> ArchiveResult<upspeak_core::Thread> {
        self.inner.get_thread(id)
    }
    fn delete_thread(&self, id: Uuid) -> ArchiveResult<()> {
        self.inner.delete_thread(id)
    }
    fn save_annotation(&self, annotation: &upspeak_core::Annotation) -> ArchiveResult<()> {
        self.inner.save_annotation(annotation)
    }
    fn get_annotation(&self, id: Uuid) -> ArchiveResult<upspeak_core::Annotation> {
        self.inner.get_annotation(id)
    }
    fn delete_annotation(&self, id: Uuid) -> ArchiveResult<()> {
        self.inner.delete_annotation(id)
    }
    fn edges_by_node(&self, id: Uuid) -> ArchiveResult<Vec<Edge>> {
        self.inner.edges_by_node(id)
    }
    fn delete_edges_by_node(&self, _: Uuid) -> ArchiveResult<usize> {
        Err(ArchiveError::InvalidData("cascade unavailable".to_string()))
    }
}

#[test]
fn failed_cascade_is_logged_and_leaves_dangling_edges() {
    let dir = tempfile::tempdir().unwrap();
    let archive = Arc::new(BrokenCascade {
        inner: LocalArchive::open(dir.path()).unwrap(),
    });
    let (a, b) = (Node::text("a"), Node::text("b"));
    archive.save_node(&a).unwrap();
    archive.save_node(&b).unwrap();
    let edge = Edge::reply(a.id, b.id);
    archive.save_edge(&edge).unwrap();
    archive.delete_node(b.id).unwrap();

    let listener = Arc::new(CascadeDeleteListener::new(archive.clone()));
    let bus = LocalBus::new();
    let repo_id = Uuid::now_v7();
    listener.attach(&bus, &outbound_subject(repo_id)).unwrap();

    let deleted = Event::new(Payload::NodeDeleted(NodeDeletePayload { node_id: b.id })).unwrap();
    assert_eq!(listener.on_event(&deleted), CascadeOutcome::Failed);
    bus.publish(&outbound_subject(repo_id), &deleted.to_vec().unwrap())
        .unwrap();

    // No retry: the edge now points at a node that no longer exists.
    assert_eq!(archive.get_edge(edge.id).unwrap(), edge);
    assert!(archive.get_node(b.id).unwrap_err().is_not_found());
}
