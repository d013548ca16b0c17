//! Local hybrid archive: SQLite metadata plus one blob file per node.
//!
//! # Responsibility
//! - Persist scalar fields of every entity in `<root>/.meta/metadata.db`.
//! - Persist node bodies as individually addressed files under `<root>`.
//!
//! # Invariants
//! - Node bodies are never stored in SQLite.
//! - Multi-row writes for one entity run in a single SQLite transaction.
//! - The two stores are never updated under one lock. Thread blob relocation
//!   runs after the metadata commit, so readers accept a node's blob either at
//!   the top level or inside a thread directory.
//! - `nodes.blob_thread_id` records the thread directory holding a relocated
//!   blob. It survives edge deletes and thread re-saves, so a moved blob stays
//!   reachable after the node leaves every thread.

use crate::archive::blob::BlobStore;
use crate::archive::{Archive, ArchiveError, ArchiveResult, ResourceKind};
use crate::db::{open_db, DbError};
use crate::model::annotation::Annotation;
use crate::model::edge::{Edge, EdgeId};
use crate::model::node::{Node, NodeId};
use crate::model::thread::{Thread, ThreadId, ThreadMetadata};
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Directory holding the structured store, relative to the archive root.
pub const META_DIR: &str = ".meta";
/// File name of the structured store inside [`META_DIR`].
pub const METADATA_DB_FILE: &str = "metadata.db";

const NODE_SELECT_SQL: &str = "SELECT
    id,
    kind,
    subject,
    content_type,
    metadata,
    created_at
FROM nodes";

const EDGE_SELECT_SQL: &str = "SELECT
    id,
    type,
    source,
    target,
    label,
    weight,
    created_at
FROM edges";

/// SQLite + filesystem archive for one repository.
pub struct LocalArchive {
    blobs: BlobStore,
    conn: Mutex<Connection>,
}

impl LocalArchive {
    /// Opens (or creates) an archive rooted at `root`.
    ///
    /// # Side effects
    /// - Creates `<root>` and `<root>/.meta` when missing.
    /// - Applies pending schema migrations to the metadata database.
    pub fn open(root: impl AsRef<Path>) -> ArchiveResult<Self> {
        let blobs = BlobStore::open(root.as_ref())?;
        let meta_dir = blobs.root().join(META_DIR);
        fs::create_dir_all(&meta_dir).map_err(|source| ArchiveError::Io {
            context: "failed to create metadata directory",
            path: meta_dir.clone(),
            source,
        })?;

        let conn = open_db(meta_dir.join(METADATA_DB_FILE)).map_err(|source| ArchiveError::Db {
            context: "failed to open metadata database",
            source,
        })?;

        info!(
            "event=archive_open module=archive status=ok root={}",
            blobs.root().display()
        );
        Ok(Self {
            blobs,
            conn: Mutex::new(conn),
        })
    }

    pub fn root(&self) -> &Path {
        self.blobs.root()
    }

    /// Path of the structured store.
    pub fn metadata_db_path(&self) -> PathBuf {
        self.root().join(META_DIR).join(METADATA_DB_FILE)
    }

    /// Blob layout helpers, exposed for diagnostics and crash-window tests.
    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    fn lock(&self) -> ArchiveResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| ArchiveError::Poisoned)
    }

    /// Writes the body where the node's blob currently lives. A null body
    /// removes any stored blob.
    fn write_body(&self, node: &Node, location: Option<ThreadId>) -> ArchiveResult<()> {
        if !node.has_body() {
            return self.blobs.remove(node.id, location);
        }
        let bytes = serde_json::to_vec(&node.body).map_err(|source| ArchiveError::Json {
            context: "failed to encode node body",
            source,
        })?;
        self.blobs.write(node.id, location, &bytes)
    }

    fn load_body(&self, node: &mut Node, location: Option<ThreadId>) -> ArchiveResult<()> {
        if let Some(bytes) = self.blobs.read_first(node.id, location)? {
            node.body = serde_json::from_slice(&bytes).map_err(|source| ArchiveError::Json {
                context: "failed to decode node body",
                source,
            })?;
        }
        Ok(())
    }
}

impl Archive for LocalArchive {
    fn save_node(&self, node: &Node) -> ArchiveResult<()> {
        let location = {
            let conn = self.lock()?;
            upsert_node_row(&conn, node)?;
            blob_location(&conn, node.id)?
        };
        self.write_body(node, location)
    }

    fn get_node(&self, id: NodeId) -> ArchiveResult<Node> {
        let (mut node, location) = {
            let conn = self.lock()?;
            let node = query_node(&conn, id)?
                .ok_or_else(|| ArchiveError::not_found(ResourceKind::Node, id))?;
            (node, blob_location(&conn, id)?)
        };
        self.load_body(&mut node, location)?;
        Ok(node)
    }

    fn delete_node(&self, id: NodeId) -> ArchiveResult<()> {
        let location = {
            let conn = self.lock()?;
            let location = blob_location(&conn, id)?;
            conn.execute("DELETE FROM nodes WHERE id = ?1;", [id.to_string()])
                .map_err(db_error("failed to delete node metadata"))?;
            location
        };
        self.blobs.remove(id, location)
    }

    fn save_edge(&self, edge: &Edge) -> ArchiveResult<()> {
        let conn = self.lock()?;
        upsert_edge_row(&conn, edge)
    }

    fn get_edge(&self, id: EdgeId) -> ArchiveResult<Edge> {
        let conn = self.lock()?;
        query_edge(&conn, id)?.ok_or_else(|| ArchiveError::not_found(ResourceKind::Edge, id))
    }

    fn delete_edge(&self, id: EdgeId) -> ArchiveResult<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM edges WHERE id = ?1;", [id.to_string()])
            .map_err(db_error("failed to delete edge"))?;
        Ok(())
    }

    fn save_thread(&self, thread: &Thread) -> ArchiveResult<()> {
        let thread_id = thread.id();
        let metadata = serde_json::to_string(&thread.metadata).map_err(|source| {
            ArchiveError::Json {
                context: "failed to encode thread metadata",
                source,
            }
        })?;

        let (previous_root_location, moving) = {
            let mut conn = self.lock()?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(db_error("failed to start thread transaction"))?;

            let previous_root_location = blob_location(&tx, thread_id)?;
            upsert_node_row(&tx, &thread.node)?;
            set_blob_location(&tx, thread_id, Some(thread_id))?;
            tx.execute(
                "INSERT INTO threads (node_id, metadata) VALUES (?1, ?2)
                 ON CONFLICT(node_id) DO UPDATE SET metadata = excluded.metadata;",
                params![thread_id.to_string(), metadata],
            )
            .map_err(db_error("failed to save thread"))?;
            tx.execute(
                "DELETE FROM thread_edges WHERE thread_node_id = ?1;",
                [thread_id.to_string()],
            )
            .map_err(db_error("failed to delete existing thread edges"))?;

            for (position, edge) in thread.edges.iter().enumerate() {
                upsert_edge_row(&tx, edge)?;
                tx.execute(
                    "INSERT OR IGNORE INTO thread_edges (thread_node_id, edge_id, position)
                     VALUES (?1, ?2, ?3);",
                    params![thread_id.to_string(), edge.id.to_string(), position as i64],
                )
                .map_err(db_error("failed to link edge to thread"))?;
            }

            // Only blobs still at the top level move; one already inside
            // another thread directory stays there.
            let mut moving = Vec::new();
            for node_id in thread.node_ids() {
                if node_id != thread_id && self.blobs.top_level_path(node_id).is_file() {
                    set_blob_location(&tx, node_id, Some(thread_id))?;
                    moving.push(node_id);
                }
            }

            tx.commit()
                .map_err(db_error("failed to commit thread transaction"))?;
            (previous_root_location, moving)
        };

        // Runs after the commit; a crash here leaves blobs at the top level.
        self.blobs.promote_thread_dir(thread_id)?;
        if let Some(previous) = previous_root_location.filter(|previous| *previous != thread_id) {
            self.blobs.remove(thread_id, Some(previous))?;
        }
        self.write_body(&thread.node, Some(thread_id))?;

        let mut relocated = 0usize;
        for node_id in moving {
            if self.blobs.relocate_into_thread(thread_id, node_id)? {
                relocated += 1;
            }
        }

        info!(
            "event=thread_save module=archive status=ok thread_id={} edges={} relocated_blobs={}",
            thread_id,
            thread.edges.len(),
            relocated
        );
        Ok(())
    }

    fn get_thread(&self, id: ThreadId) -> ArchiveResult<Thread> {
        let metadata_json: String = {
            let conn = self.lock()?;
            conn.query_row(
                "SELECT metadata FROM threads WHERE node_id = ?1;",
                [id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error("failed to query thread"))?
            .ok_or_else(|| ArchiveError::not_found(ResourceKind::Thread, id))?
        };
        let metadata: Vec<ThreadMetadata> =
            serde_json::from_str(&metadata_json).map_err(|source| ArchiveError::Json {
                context: "failed to decode thread metadata",
                source,
            })?;

        let node = self.get_node(id)?;

        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "{EDGE_SELECT_SQL}
                 JOIN thread_edges te ON te.edge_id = edges.id
                 WHERE te.thread_node_id = ?1
                 ORDER BY te.position ASC;"
            ))
            .map_err(db_error("failed to query thread edges"))?;
        let mut rows = stmt
            .query([id.to_string()])
            .map_err(db_error("failed to query thread edges"))?;
        let mut edges = Vec::new();
        while let Some(row) = rows.next().map_err(db_error("failed to read thread edge"))? {
            edges.push(parse_edge_row(row)?);
        }

        Ok(Thread {
            node,
            edges,
            metadata,
        })
    }

    fn delete_thread(&self, id: ThreadId) -> ArchiveResult<()> {
        {
            let mut conn = self.lock()?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(db_error("failed to start thread transaction"))?;
            tx.execute(
                "DELETE FROM thread_edges WHERE thread_node_id = ?1;",
                [id.to_string()],
            )
            .map_err(db_error("failed to delete thread edges"))?;
            tx.execute("DELETE FROM threads WHERE node_id = ?1;", [id.to_string()])
                .map_err(db_error("failed to delete thread"))?;
            tx.execute(
                "UPDATE nodes SET blob_thread_id = NULL WHERE blob_thread_id = ?1;",
                [id.to_string()],
            )
            .map_err(db_error("failed to clear relocated blob locations"))?;
            tx.commit()
                .map_err(db_error("failed to commit thread transaction"))?;
        }

        self.blobs.remove_thread_dir(id)?;
        self.delete_node(id)
    }

    fn save_annotation(&self, annotation: &Annotation) -> ArchiveResult<()> {
        let location = {
            let mut conn = self.lock()?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(db_error("failed to start annotation transaction"))?;
            upsert_node_row(&tx, &annotation.node)?;
            upsert_edge_row(&tx, &annotation.edge)?;
            tx.execute(
                "INSERT INTO annotations (node_id, edge_id, motivation) VALUES (?1, ?2, ?3)
                 ON CONFLICT(node_id) DO UPDATE SET
                    edge_id = excluded.edge_id,
                    motivation = excluded.motivation;",
                params![
                    annotation.node.id.to_string(),
                    annotation.edge.id.to_string(),
                    annotation.motivation.as_str(),
                ],
            )
            .map_err(db_error("failed to save annotation"))?;
            let location = blob_location(&tx, annotation.node.id)?;
            tx.commit()
                .map_err(db_error("failed to commit annotation transaction"))?;
            location
        };
        self.write_body(&annotation.node, location)
    }

    fn get_annotation(&self, id: NodeId) -> ArchiveResult<Annotation> {
        let (edge_id, motivation) = {
            let conn = self.lock()?;
            query_annotation_row(&conn, id)?
                .ok_or_else(|| ArchiveError::not_found(ResourceKind::Annotation, id))?
        };
        let node = self.get_node(id)?;
        let edge = self.get_edge(edge_id)?;
        Ok(Annotation {
            node,
            edge,
            motivation,
        })
    }

    fn delete_annotation(&self, id: NodeId) -> ArchiveResult<()> {
        {
            let mut conn = self.lock()?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(db_error("failed to start annotation transaction"))?;
            if let Some((edge_id, _)) = query_annotation_row(&tx, id)? {
                tx.execute("DELETE FROM edges WHERE id = ?1;", [edge_id.to_string()])
                    .map_err(db_error("failed to delete annotation edge"))?;
            }
            tx.execute("DELETE FROM annotations WHERE node_id = ?1;", [id.to_string()])
                .map_err(db_error("failed to delete annotation"))?;
            tx.commit()
                .map_err(db_error("failed to commit annotation transaction"))?;
        }
        self.delete_node(id)
    }

    fn edges_by_node(&self, id: NodeId) -> ArchiveResult<Vec<Edge>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "{EDGE_SELECT_SQL} WHERE source = ?1 OR target = ?1 ORDER BY id ASC;"
            ))
            .map_err(db_error("failed to query edges"))?;
        let mut rows = stmt
            .query([id.to_string()])
            .map_err(db_error("failed to query edges"))?;
        let mut edges = Vec::new();
        while let Some(row) = rows.next().map_err(db_error("failed to read edge"))? {
            edges.push(parse_edge_row(row)?);
        }
        Ok(edges)
    }

    fn delete_edges_by_node(&self, id: NodeId) -> ArchiveResult<usize> {
        let conn = self.lock()?;
        let deleted = conn
            .execute(
                "DELETE FROM edges WHERE source = ?1 OR target = ?1;",
                [id.to_string()],
            )
            .map_err(db_error("failed to delete edges by node"))?;
        debug!(
            "event=edges_delete_by_node module=archive status=ok node_id={} deleted={}",
            id, deleted
        );
        Ok(deleted)
    }
}

fn upsert_node_row(conn: &Connection, node: &Node) -> ArchiveResult<()> {
    let metadata = serde_json::to_string(&node.metadata).map_err(|source| ArchiveError::Json {
        context: "failed to encode node metadata",
        source,
    })?;
    conn.execute(
        "INSERT INTO nodes (id, kind, subject, content_type, metadata, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
            kind = excluded.kind,
            subject = excluded.subject,
            content_type = excluded.content_type,
            metadata = excluded.metadata,
            created_at = excluded.created_at;",
        params![
            node.id.to_string(),
            node.kind.as_str(),
            node.subject.as_str(),
            node.content_type.as_str(),
            metadata,
            format_time(&node.created_at),
        ],
    )
    .map_err(db_error("failed to save node metadata"))?;
    Ok(())
}

fn upsert_edge_row(conn: &Connection, edge: &Edge) -> ArchiveResult<()> {
    conn.execute(
        "INSERT INTO edges (id, type, source, target, label, weight, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
            type = excluded.type,
            source = excluded.source,
            target = excluded.target,
            label = excluded.label,
            weight = excluded.weight,
            created_at = excluded.created_at;",
        params![
            edge.id.to_string(),
            edge.edge_type.as_str(),
            edge.source.to_string(),
            edge.target.to_string(),
            edge.label.as_str(),
            edge.weight,
            format_time(&edge.created_at),
        ],
    )
    .map_err(db_error("failed to save edge"))?;
    Ok(())
}

fn query_node(conn: &Connection, id: NodeId) -> ArchiveResult<Option<Node>> {
    let mut stmt = conn
        .prepare(&format!("{NODE_SELECT_SQL} WHERE id = ?1;"))
        .map_err(db_error("failed to query node"))?;
    let mut rows = stmt
        .query([id.to_string()])
        .map_err(db_error("failed to query node"))?;
    if let Some(row) = rows.next().map_err(db_error("failed to read node"))? {
        return Ok(Some(parse_node_row(row)?));
    }

    Ok(None)
}

fn query_edge(conn: &Connection, id: EdgeId) -> ArchiveResult<Option<Edge>> {
    let mut stmt = conn
        .prepare(&format!("{EDGE_SELECT_SQL} WHERE id = ?1;"))
        .map_err(db_error("failed to query edge"))?;
    let mut rows = stmt
        .query([id.to_string()])
        .map_err(db_error("failed to query edge"))?;
    if let Some(row) = rows.next().map_err(db_error("failed to read edge"))? {
        return Ok(Some(parse_edge_row(row)?));
    }

    Ok(None)
}

fn query_annotation_row(conn: &Connection, id: NodeId) -> ArchiveResult<Option<(EdgeId, String)>> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT edge_id, motivation FROM annotations WHERE node_id = ?1;",
            [id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(db_error("failed to query annotation"))?;

    match row {
        Some((edge_id, motivation)) => {
            Ok(Some((parse_uuid(&edge_id, "annotations.edge_id")?, motivation)))
        }
        None => Ok(None),
    }
}

fn blob_location(conn: &Connection, id: NodeId) -> ArchiveResult<Option<ThreadId>> {
    let text: Option<Option<String>> = conn
        .query_row(
            "SELECT blob_thread_id FROM nodes WHERE id = ?1;",
            [id.to_string()],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_error("failed to query blob location"))?;
    text.flatten()
        .map(|text| parse_uuid(&text, "nodes.blob_thread_id"))
        .transpose()
}

fn set_blob_location(
    conn: &Connection,
    id: NodeId,
    location: Option<ThreadId>,
) -> ArchiveResult<()> {
    conn.execute(
        "UPDATE nodes SET blob_thread_id = ?2 WHERE id = ?1;",
        params![id.to_string(), location.map(|thread_id| thread_id.to_string())],
    )
    .map_err(db_error("failed to record blob location"))?;
    Ok(())
}

fn parse_node_row(row: &Row<'_>) -> ArchiveResult<Node> {
    let read = db_error("failed to read node row");
    let id_text: String = row.get("id").map_err(&read)?;
    let metadata_text: String = row.get("metadata").map_err(&read)?;
    let created_at_text: String = row.get("created_at").map_err(&read)?;

    let metadata: Value =
        serde_json::from_str(&metadata_text).map_err(|source| ArchiveError::Json {
            context: "failed to decode node metadata",
            source,
        })?;

    Ok(Node {
        id: parse_uuid(&id_text, "nodes.id")?,
        kind: row.get("kind").map_err(&read)?,
        subject: row.get("subject").map_err(&read)?,
        content_type: row.get("content_type").map_err(&read)?,
        metadata,
        body: Value::Null,
        created_at: parse_time(&created_at_text, "nodes.created_at")?,
    })
}

fn parse_edge_row(row: &Row<'_>) -> ArchiveResult<Edge> {
    let read = db_error("failed to read edge row");
    let id_text: String = row.get("id").map_err(&read)?;
    let source_text: String = row.get("source").map_err(&read)?;
    let target_text: String = row.get("target").map_err(&read)?;
    let created_at_text: String = row.get("created_at").map_err(&read)?;

    Ok(Edge {
        id: parse_uuid(&id_text, "edges.id")?,
        edge_type: row.get("type").map_err(&read)?,
        source: parse_uuid(&source_text, "edges.source")?,
        target: parse_uuid(&target_text, "edges.target")?,
        label: row.get("label").map_err(&read)?,
        weight: row.get("weight").map_err(&read)?,
        created_at: parse_time(&created_at_text, "edges.created_at")?,
    })
}

fn parse_uuid(value: &str, column: &str) -> ArchiveResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| ArchiveError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

fn format_time(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_time(value: &str, column: &str) -> ArchiveResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|_| ArchiveError::InvalidData(format!("invalid timestamp `{value}` in {column}")))
}

fn db_error(context: &'static str) -> impl Fn(rusqlite::Error) -> ArchiveError {
    move |err| ArchiveError::Db {
        context,
        source: DbError::Sqlite(err),
    }
}
