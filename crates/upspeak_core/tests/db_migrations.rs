use rusqlite::Connection;
use upspeak_core::db::migrations::latest_version;
use upspeak_core::db::{open_db, open_db_in_memory, DbError};

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    for table in ["nodes", "edges", "threads", "thread_edges", "annotations"] {
        assert_table_exists(&conn, table);
    }
}

#[test]
fn nodes_record_relocated_blob_location() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "INSERT INTO nodes (id, kind, content_type, created_at)
         VALUES ('n', 'Node', 'text/plain', '2024-01-01T00:00:00Z');",
    )
    .unwrap();

    let location: Option<String> = conn
        .query_row("SELECT blob_thread_id FROM nodes WHERE id = 'n';", [], |row| row.get(0))
        .unwrap();
    assert_eq!(location, None);
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metadata.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "nodes");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn deleting_edge_drops_thread_membership() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "INSERT INTO threads (node_id, metadata) VALUES ('t', '[]');
         INSERT INTO edges (id, type, source, target, label, weight, created_at)
         VALUES ('e', 'Reply', 'a', 'b', '', 0.5, '2024-01-01T00:00:00Z');
         INSERT INTO thread_edges (thread_node_id, edge_id, position) VALUES ('t', 'e', 0);
         DELETE FROM edges WHERE id = 'e';",
    )
    .unwrap();

    let remaining: i64 = conn
        .query_row("SELECT COUNT(*) FROM thread_edges;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(remaining, 0);
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
