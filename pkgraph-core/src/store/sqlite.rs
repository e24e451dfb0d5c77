use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, params};

use crate::error::WriteError;
use crate::types::{
    EdgeKind, EdgeTally, GraphStats, NodeKey, Properties, PropertyValue, SchemaStatement,
    UniqueConstraint,
};

use super::GraphStore;

/// Current schema version.
pub const SCHEMA_VERSION: &str = "1";

/// Property graph tables. Node identity is `(label, key)`; uniqueness
/// constraints are partial unique indexes over `key` per label.
pub const SCHEMA_SQL: &str = r"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS pkgraph_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS nodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    label TEXT NOT NULL,
    key TEXT NOT NULL,
    properties TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX IF NOT EXISTS idx_nodes_label_key ON nodes(label, key);

CREATE TABLE IF NOT EXISTS edges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    source_id INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    target_id INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    UNIQUE(kind, source_id, target_id)
);
CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id);
";

const CONSTRAINT_INDEX_PREFIX: &str = "uq_";

type JsonMap = serde_json::Map<String, serde_json::Value>;

/// SQLite-backed implementation of [`GraphStore`].
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    pub fn open(path: &Path) -> crate::error::Result<Self> {
        let conn = Connection::open(path).map_err(WriteError::Sqlite)?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(path.to_path_buf()),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> crate::error::Result<Self> {
        let conn = Connection::open_in_memory().map_err(WriteError::Sqlite)?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("pkgraph store mutex poisoned")
    }

    fn initialize(&self) -> crate::error::Result<()> {
        let conn = self.lock();

        conn.execute_batch(
            "PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(WriteError::Sqlite)?;

        // Silently ignored for in-memory databases
        let _ = conn.execute_batch("PRAGMA journal_mode = WAL;");

        conn.execute_batch(SCHEMA_SQL).map_err(WriteError::Sqlite)?;
        conn.execute(
            "INSERT OR IGNORE INTO pkgraph_meta (key, value) VALUES ('schema_version', ?1)",
            params![SCHEMA_VERSION],
        )
        .map_err(WriteError::Sqlite)?;

        Ok(())
    }

    fn find_node_id(conn: &Connection, node: &NodeKey) -> rusqlite::Result<Option<i64>> {
        conn.prepare_cached("SELECT id FROM nodes WHERE label = ?1 AND key = ?2")?
            .query_row(params![node.label.as_str(), node.key], |row| row.get(0))
            .optional()
    }

    fn load_properties(conn: &Connection, id: i64) -> Result<JsonMap, WriteError> {
        let raw: String = conn.query_row(
            "SELECT properties FROM nodes WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn store_properties(conn: &Connection, id: i64, map: &JsonMap) -> Result<(), WriteError> {
        let raw = serde_json::to_string(map)?;
        conn.execute(
            "UPDATE nodes SET properties = ?1 WHERE id = ?2",
            params![raw, id],
        )?;
        Ok(())
    }

    /// Merge semantics of Cypher's `SET n += $props`.
    fn apply(map: &mut JsonMap, properties: &Properties) {
        for (key, value) in properties {
            if *value == PropertyValue::Null {
                map.remove(key);
            } else {
                map.insert(key.clone(), value.to_json());
            }
        }
    }

    fn constraint_index(constraint: UniqueConstraint) -> String {
        format!("{CONSTRAINT_INDEX_PREFIX}{}", constraint.name())
    }

    fn count_by(conn: &Connection, sql: &str) -> rusqlite::Result<BTreeMap<String, u64>> {
        let mut stmt = conn.prepare(sql)?;
        let counts = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?)))?
            .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;
        Ok(counts)
    }
}

#[async_trait::async_trait]
impl GraphStore for SqliteStore {
    // ── Node operations ────────────────────────────────────────────

    async fn merge_node(
        &self,
        node: &NodeKey,
        properties: &Properties,
    ) -> crate::error::Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(WriteError::Sqlite)?;

        let id = if let Some(id) = Self::find_node_id(&tx, node).map_err(WriteError::Sqlite)? {
            id
        } else {
            let mut initial = JsonMap::new();
            initial.insert(
                node.label.key_property().to_string(),
                serde_json::json!(node.key),
            );
            tx.execute(
                "INSERT INTO nodes (label, key, properties) VALUES (?1, ?2, ?3)",
                params![
                    node.label.as_str(),
                    node.key,
                    serde_json::to_string(&initial).map_err(WriteError::Serialization)?
                ],
            )
            .map_err(WriteError::Sqlite)?;
            tx.last_insert_rowid()
        };

        let mut map = Self::load_properties(&tx, id)?;
        Self::apply(&mut map, properties);
        Self::store_properties(&tx, id, &map)?;

        tx.commit().map_err(WriteError::Sqlite)?;
        Ok(())
    }

    async fn update_node(
        &self,
        node: &NodeKey,
        properties: &Properties,
    ) -> crate::error::Result<bool> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(WriteError::Sqlite)?;

        let Some(id) = Self::find_node_id(&tx, node).map_err(WriteError::Sqlite)? else {
            return Ok(false);
        };
        let mut map = Self::load_properties(&tx, id)?;
        Self::apply(&mut map, properties);
        Self::store_properties(&tx, id, &map)?;

        tx.commit().map_err(WriteError::Sqlite)?;
        Ok(true)
    }

    async fn node_properties(
        &self,
        node: &NodeKey,
    ) -> crate::error::Result<Option<BTreeMap<String, serde_json::Value>>> {
        let conn = self.lock();
        let Some(id) = Self::find_node_id(&conn, node).map_err(WriteError::Sqlite)? else {
            return Ok(None);
        };
        let map = Self::load_properties(&conn, id)?;
        Ok(Some(map.into_iter().collect()))
    }

    // ── Edge operations ────────────────────────────────────────────

    async fn merge_edge(
        &self,
        kind: EdgeKind,
        from: &NodeKey,
        to: &NodeKey,
    ) -> crate::error::Result<bool> {
        let conn = self.lock();
        let source = Self::find_node_id(&conn, from).map_err(WriteError::Sqlite)?;
        let target = Self::find_node_id(&conn, to).map_err(WriteError::Sqlite)?;
        let (Some(source), Some(target)) = (source, target) else {
            return Ok(false);
        };

        conn.execute(
            "INSERT OR IGNORE INTO edges (kind, source_id, target_id) VALUES (?1, ?2, ?3)",
            params![kind.as_str(), source, target],
        )
        .map_err(WriteError::Sqlite)?;
        Ok(true)
    }

    async fn merge_edges(
        &self,
        from: &NodeKey,
        edges: &[(EdgeKind, NodeKey)],
    ) -> crate::error::Result<EdgeTally> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(WriteError::Sqlite)?;
        let mut tally = EdgeTally::default();

        let Some(source) = Self::find_node_id(&tx, from).map_err(WriteError::Sqlite)? else {
            tally.skipped = u64::try_from(edges.len()).unwrap_or(u64::MAX);
            return Ok(tally);
        };

        {
            let mut insert = tx
                .prepare_cached(
                    "INSERT OR IGNORE INTO edges (kind, source_id, target_id) VALUES (?1, ?2, ?3)",
                )
                .map_err(WriteError::Sqlite)?;
            for (kind, to) in edges {
                match Self::find_node_id(&tx, to).map_err(WriteError::Sqlite)? {
                    Some(target) => {
                        insert
                            .execute(params![kind.as_str(), source, target])
                            .map_err(WriteError::Sqlite)?;
                        tally.written += 1;
                    }
                    None => tally.skipped += 1,
                }
            }
        }

        tx.commit().map_err(WriteError::Sqlite)?;
        Ok(tally)
    }

    // ── Schema ─────────────────────────────────────────────────────

    async fn run_write(&self, statement: SchemaStatement) -> crate::error::Result<()> {
        let conn = self.lock();
        let sql = match statement {
            SchemaStatement::CreateUniqueConstraint(constraint) => format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {} ON nodes(key) WHERE label = '{}'",
                Self::constraint_index(constraint),
                constraint.label.as_str()
            ),
            SchemaStatement::DropUniqueConstraint(constraint) => format!(
                "DROP INDEX IF EXISTS {}",
                Self::constraint_index(constraint)
            ),
        };
        conn.execute_batch(&sql).map_err(WriteError::Sqlite)?;
        Ok(())
    }

    async fn constraints(&self) -> crate::error::Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT name FROM sqlite_master
                 WHERE type = 'index' AND name LIKE 'uq!_%' ESCAPE '!'
                 ORDER BY name",
            )
            .map_err(WriteError::Sqlite)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(WriteError::Sqlite)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(WriteError::Sqlite)?;

        Ok(names
            .into_iter()
            .filter_map(|n| n.strip_prefix(CONSTRAINT_INDEX_PREFIX).map(String::from))
            .collect())
    }

    async fn clear_all(&self) -> crate::error::Result<()> {
        let conn = self.lock();
        conn.execute_batch(
            "DELETE FROM edges;
             DELETE FROM nodes;",
        )
        .map_err(WriteError::Sqlite)?;
        Ok(())
    }

    // ── Metrics ────────────────────────────────────────────────────

    async fn stats(&self) -> crate::error::Result<GraphStats> {
        let conn = self.lock();

        let total_nodes: u64 = conn
            .query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))
            .map_err(WriteError::Sqlite)?;
        let total_edges: u64 = conn
            .query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))
            .map_err(WriteError::Sqlite)?;
        let nodes_by_label =
            Self::count_by(&conn, "SELECT label, COUNT(*) FROM nodes GROUP BY label")
                .map_err(WriteError::Sqlite)?;
        let edges_by_kind = Self::count_by(&conn, "SELECT kind, COUNT(*) FROM edges GROUP BY kind")
            .map_err(WriteError::Sqlite)?;

        Ok(GraphStats {
            total_nodes,
            total_edges,
            nodes_by_label,
            edges_by_kind,
        })
    }
}
