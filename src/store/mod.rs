use crate::config::Config;
use crate::model::{
    Edge, EdgeMetadata, EdgeType, FileContext, FileHash, GraphStats, Language, Node,
    NodeMetadata, NodeType, ResolutionStats,
};
use anyhow::{anyhow, Context, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

mod migrations;

const NODE_COLUMNS: &str = "id, type, name, file_path, line_start, line_end, language, metadata";
const EDGE_COLUMNS: &str = "id, source_id, target_id, type, metadata";

/// LIKE pattern for `ref:<kind>:<name>` placeholder targets.
const PLACEHOLDER_PATTERN: &str = "ref:%";

#[derive(Debug)]
struct ConnectionCustomizer;

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for ConnectionCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        conn.busy_timeout(Duration::from_secs(30))?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;
        Ok(())
    }

    fn on_release(&self, _conn: Connection) {}
}

/// Durable graph storage. All mutation goes through the single write
/// connection; reads come from the pool so projections stay responsive
/// while a sync is writing.
pub struct Store {
    db_path: PathBuf,
    write_conn: Arc<Mutex<Connection>>,
    read_pool: Pool<SqliteConnectionManager>,
}

impl Store {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create store directory {}", parent.display()))?;
        }

        let config = Config::get();

        let write_conn = Connection::open(db_path)
            .with_context(|| format!("open sqlite db at {}", db_path.display()))?;
        write_conn.busy_timeout(Duration::from_secs(30))?;
        write_conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;
        migrations::migrate(&write_conn)?;

        let write_conn = Arc::new(Mutex::new(write_conn));

        let manager = SqliteConnectionManager::file(db_path);
        let read_pool = Pool::builder()
            .max_size(config.pool_size)
            .min_idle(Some(config.pool_min_idle))
            .connection_timeout(Duration::from_secs(30))
            .connection_customizer(Box::new(ConnectionCustomizer))
            .build(manager)
            .with_context(|| "create read connection pool")?;

        Ok(Self {
            db_path: db_path.to_path_buf(),
            write_conn,
            read_pool,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn read_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.read_pool
            .get()
            .with_context(|| "get read connection from pool")
    }

    fn write_conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.write_conn.lock().unwrap()
    }

    // -- writes ---------------------------------------------------------

    pub fn upsert_nodes(&self, nodes: &[Node]) -> Result<()> {
        let mut guard = self.write_conn();
        let tx = guard.transaction()?;
        insert_nodes(&tx, nodes)?;
        tx.commit()?;
        Ok(())
    }

    pub fn upsert_edges(&self, edges: &[Edge]) -> Result<()> {
        let mut guard = self.write_conn();
        let tx = guard.transaction()?;
        insert_edges(&tx, edges)?;
        tx.commit()?;
        Ok(())
    }

    /// Atomic re-parse commit: all prior nodes/edges for the file go,
    /// the new extraction and the file hash land in the same
    /// transaction. Either everything for the file becomes visible or
    /// nothing does.
    pub fn replace_file(
        &self,
        path: &str,
        nodes: &[Node],
        edges: &[Edge],
        hash: &str,
        last_modified: i64,
    ) -> Result<()> {
        let mut guard = self.write_conn();
        let tx = guard.transaction()?;
        delete_file_rows(&tx, path)?;
        insert_nodes(&tx, nodes)?;
        insert_edges(&tx, edges)?;
        tx.execute(
            "INSERT INTO file_hashes (path, hash, last_modified) VALUES (?1, ?2, ?3)
             ON CONFLICT(path) DO UPDATE SET hash = excluded.hash,
                                             last_modified = excluded.last_modified",
            params![path, hash, last_modified],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Remove every node with this file path plus every edge incident to
    /// any of them, in both directions. No orphan edges survive.
    pub fn delete_by_file(&self, path: &str) -> Result<()> {
        let mut guard = self.write_conn();
        let tx = guard.transaction()?;
        delete_file_rows(&tx, path)?;
        tx.execute("DELETE FROM file_hashes WHERE path = ?1", params![path])?;
        tx.commit()?;
        Ok(())
    }

    pub fn update_edge_target(
        &self,
        edge_id: &str,
        new_target_id: &str,
        still_unresolved: bool,
    ) -> Result<()> {
        let edge = self
            .get_edge(edge_id)?
            .ok_or_else(|| anyhow!("edge not found: {edge_id}"))?;
        let mut metadata = edge.metadata;
        metadata.unresolved = still_unresolved;
        if !still_unresolved {
            metadata.resolved_from = Some(edge.target_id.clone());
            metadata.ambiguous_candidates = None;
        }
        let raw = serde_json::to_string(&metadata)?;
        let guard = self.write_conn();
        guard.execute(
            "UPDATE edges SET target_id = ?1, metadata = ?2 WHERE id = ?3",
            params![new_target_id, raw, edge_id],
        )?;
        Ok(())
    }

    pub fn update_edge_metadata(&self, edge_id: &str, metadata: &EdgeMetadata) -> Result<()> {
        let raw = serde_json::to_string(metadata)?;
        let guard = self.write_conn();
        guard.execute(
            "UPDATE edges SET metadata = ?1 WHERE id = ?2",
            params![raw, edge_id],
        )?;
        Ok(())
    }

    // -- node reads -----------------------------------------------------

    pub fn get_node(&self, id: &str) -> Result<Option<Node>> {
        let conn = self.read_conn()?;
        let raw = conn
            .query_row(
                &format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = ?1"),
                params![id],
                raw_node_from_row,
            )
            .optional()?;
        raw.map(RawNode::into_node).transpose()
    }

    pub fn get_by_file(&self, path: &str) -> Result<Vec<Node>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes WHERE file_path = ?1 ORDER BY line_start, id"
        ))?;
        let rows = stmt.query_map(params![path], raw_node_from_row)?;
        collect_nodes(rows)
    }

    pub fn get_by_type(&self, node_type: NodeType) -> Result<Vec<Node>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes WHERE type = ?1 ORDER BY file_path, line_start"
        ))?;
        let rows = stmt.query_map(params![node_type.as_str()], raw_node_from_row)?;
        collect_nodes(rows)
    }

    /// Case-sensitive substring match over node names, ordered by name.
    pub fn search_by_name(&self, query: &str, limit: usize) -> Result<Vec<Node>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes WHERE instr(name, ?1) > 0
             ORDER BY name LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![query, limit as i64], raw_node_from_row)?;
        collect_nodes(rows)
    }

    pub fn all_nodes(&self) -> Result<Vec<Node>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes ORDER BY file_path, line_start"
        ))?;
        let rows = stmt.query_map([], raw_node_from_row)?;
        collect_nodes(rows)
    }

    // -- edge reads -----------------------------------------------------

    pub fn get_edge(&self, id: &str) -> Result<Option<Edge>> {
        let conn = self.read_conn()?;
        let raw = conn
            .query_row(
                &format!("SELECT {EDGE_COLUMNS} FROM edges WHERE id = ?1"),
                params![id],
                raw_edge_from_row,
            )
            .optional()?;
        raw.map(RawEdge::into_edge).transpose()
    }

    pub fn all_edges(&self) -> Result<Vec<Edge>> {
        let conn = self.read_conn()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {EDGE_COLUMNS} FROM edges ORDER BY id"))?;
        let rows = stmt.query_map([], raw_edge_from_row)?;
        collect_edges(rows)
    }

    /// Work list for the resolver: placeholder targets first, plus any
    /// edge whose metadata still marks it unresolved.
    pub fn unresolved_edges(&self) -> Result<Vec<Edge>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EDGE_COLUMNS} FROM edges
             WHERE target_id LIKE ?1 OR metadata LIKE '%\"unresolved\":true%'
             ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![PLACEHOLDER_PATTERN], raw_edge_from_row)?;
        collect_edges(rows)
    }

    pub fn edges_from(&self, node_id: &str) -> Result<Vec<Edge>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EDGE_COLUMNS} FROM edges WHERE source_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![node_id], raw_edge_from_row)?;
        collect_edges(rows)
    }

    pub fn edges_to(&self, node_id: &str) -> Result<Vec<Edge>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EDGE_COLUMNS} FROM edges WHERE target_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![node_id], raw_edge_from_row)?;
        collect_edges(rows)
    }

    pub fn resolved_callers_of(&self, node_id: &str) -> Result<Vec<Node>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM edges e JOIN nodes n ON n.id = e.source_id
             WHERE e.type = 'calls' AND e.target_id = ?1
             ORDER BY n.file_path, n.line_start",
            prefixed_node_columns("n")
        ))?;
        let rows = stmt.query_map(params![node_id], raw_node_from_row)?;
        collect_nodes(rows)
    }

    pub fn resolved_callees_of(&self, node_id: &str) -> Result<Vec<Node>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM edges e JOIN nodes n ON n.id = e.target_id
             WHERE e.type = 'calls' AND e.source_id = ?1 AND e.target_id NOT LIKE ?2
             ORDER BY n.file_path, n.line_start",
            prefixed_node_columns("n")
        ))?;
        let rows = stmt.query_map(params![node_id, PLACEHOLDER_PATTERN], raw_node_from_row)?;
        collect_nodes(rows)
    }

    /// Cross-file view of a file: its nodes plus edges that cross the
    /// file boundary. Edges with both endpoints inside the file are
    /// excluded from incoming/outgoing.
    pub fn file_context(&self, path: &str) -> Result<FileContext> {
        let nodes = self.get_by_file(path)?;
        let conn = self.read_conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {EDGE_COLUMNS} FROM edges
             WHERE target_id IN (SELECT id FROM nodes WHERE file_path = ?1)
               AND source_id NOT IN (SELECT id FROM nodes WHERE file_path = ?1)
             ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![path], raw_edge_from_row)?;
        let incoming = collect_edges(rows)?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {EDGE_COLUMNS} FROM edges
             WHERE source_id IN (SELECT id FROM nodes WHERE file_path = ?1)
               AND target_id NOT IN (SELECT id FROM nodes WHERE file_path = ?1)
             ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![path], raw_edge_from_row)?;
        let outgoing = collect_edges(rows)?;

        Ok(FileContext {
            file_path: path.to_string(),
            nodes,
            incoming,
            outgoing,
        })
    }

    // -- file hashes ----------------------------------------------------

    pub fn get_file_hash(&self, path: &str) -> Result<Option<FileHash>> {
        let conn = self.read_conn()?;
        conn.query_row(
            "SELECT path, hash, last_modified FROM file_hashes WHERE path = ?1",
            params![path],
            |row| {
                Ok(FileHash {
                    path: row.get(0)?,
                    hash: row.get(1)?,
                    last_modified: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn all_file_hashes(&self) -> Result<Vec<FileHash>> {
        let conn = self.read_conn()?;
        let mut stmt =
            conn.prepare("SELECT path, hash, last_modified FROM file_hashes ORDER BY path")?;
        let rows = stmt.query_map([], |row| {
            Ok(FileHash {
                path: row.get(0)?,
                hash: row.get(1)?,
                last_modified: row.get(2)?,
            })
        })?;
        let mut hashes = Vec::new();
        for row in rows {
            hashes.push(row?);
        }
        Ok(hashes)
    }

    // -- config / meta --------------------------------------------------

    pub fn set_config_value(&self, key: &str, value: &str) -> Result<()> {
        let guard = self.write_conn();
        guard.execute(
            "INSERT INTO config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_config_value(&self, key: &str) -> Result<Option<String>> {
        let conn = self.read_conn()?;
        conn.query_row(
            "SELECT value FROM config WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn set_meta_i64(&self, key: &str, value: i64) -> Result<()> {
        let guard = self.write_conn();
        guard.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value.to_string()],
        )?;
        Ok(())
    }

    pub fn get_meta_i64(&self, key: &str) -> Result<Option<i64>> {
        let conn = self.read_conn()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(raw.and_then(|value| value.parse().ok()))
    }

    // -- stats ----------------------------------------------------------

    pub fn stats(&self) -> Result<GraphStats> {
        let conn = self.read_conn()?;
        let nodes: i64 = conn.query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?;
        let edges: i64 = conn.query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))?;
        let files: i64 =
            conn.query_row("SELECT COUNT(*) FROM file_hashes", [], |row| row.get(0))?;

        let mut by_type = BTreeMap::new();
        let mut stmt = conn.prepare("SELECT type, COUNT(*) FROM nodes GROUP BY type")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (key, count) = row?;
            by_type.insert(key, count);
        }

        let mut by_language = BTreeMap::new();
        let mut stmt = conn.prepare("SELECT language, COUNT(*) FROM nodes GROUP BY language")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (key, count) = row?;
            by_language.insert(key, count);
        }

        let resolution = resolution_stats_on(&conn)?;

        Ok(GraphStats {
            nodes,
            edges,
            files,
            by_type,
            by_language,
            resolution,
        })
    }

    /// `resolved = total - placeholders`, O(1) via the target index.
    pub fn resolution_stats(&self) -> Result<ResolutionStats> {
        let conn = self.read_conn()?;
        resolution_stats_on(&conn)
    }
}

fn resolution_stats_on(conn: &Connection) -> Result<ResolutionStats> {
    let total: i64 = conn.query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))?;
    let unresolved: i64 = conn.query_row(
        "SELECT COUNT(*) FROM edges WHERE target_id LIKE ?1",
        params![PLACEHOLDER_PATTERN],
        |row| row.get(0),
    )?;
    Ok(ResolutionStats {
        total,
        unresolved,
        resolved: total - unresolved,
    })
}

fn prefixed_node_columns(alias: &str) -> String {
    NODE_COLUMNS
        .split(", ")
        .map(|col| format!("{alias}.{col}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn delete_file_rows(tx: &rusqlite::Transaction<'_>, path: &str) -> Result<()> {
    tx.execute(
        "DELETE FROM edges
         WHERE source_id IN (SELECT id FROM nodes WHERE file_path = ?1)
            OR target_id IN (SELECT id FROM nodes WHERE file_path = ?1)",
        params![path],
    )?;
    tx.execute("DELETE FROM nodes WHERE file_path = ?1", params![path])?;
    Ok(())
}

fn insert_nodes(tx: &rusqlite::Transaction<'_>, nodes: &[Node]) -> Result<()> {
    let mut stmt = tx.prepare_cached(
        "INSERT OR REPLACE INTO nodes
         (id, type, name, file_path, line_start, line_end, language, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    for node in nodes {
        let metadata = serde_json::to_string(&node.metadata)?;
        stmt.execute(params![
            node.id,
            node.node_type.as_str(),
            node.name,
            node.file_path,
            node.line_start,
            node.line_end,
            node.language.as_str(),
            metadata,
        ])?;
    }
    Ok(())
}

fn insert_edges(tx: &rusqlite::Transaction<'_>, edges: &[Edge]) -> Result<()> {
    let mut stmt = tx.prepare_cached(
        "INSERT OR REPLACE INTO edges (id, source_id, target_id, type, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for edge in edges {
        let metadata = serde_json::to_string(&edge.metadata)?;
        stmt.execute(params![
            edge.id,
            edge.source_id,
            edge.target_id,
            edge.edge_type.as_str(),
            metadata,
        ])?;
    }
    Ok(())
}

struct RawNode {
    id: String,
    node_type: String,
    name: String,
    file_path: String,
    line_start: i64,
    line_end: i64,
    language: String,
    metadata: String,
}

fn raw_node_from_row(row: &Row<'_>) -> rusqlite::Result<RawNode> {
    Ok(RawNode {
        id: row.get(0)?,
        node_type: row.get(1)?,
        name: row.get(2)?,
        file_path: row.get(3)?,
        line_start: row.get(4)?,
        line_end: row.get(5)?,
        language: row.get(6)?,
        metadata: row.get(7)?,
    })
}

impl RawNode {
    fn into_node(self) -> Result<Node> {
        let node_type = NodeType::parse(&self.node_type)
            .ok_or_else(|| anyhow!("unknown node type in store: {}", self.node_type))?;
        let language = Language::parse(&self.language)
            .ok_or_else(|| anyhow!("unknown language in store: {}", self.language))?;
        let metadata: NodeMetadata = serde_json::from_str(&self.metadata)
            .with_context(|| format!("parse node metadata for {}", self.id))?;
        Ok(Node {
            id: self.id,
            node_type,
            name: self.name,
            file_path: self.file_path,
            line_start: self.line_start,
            line_end: self.line_end,
            language,
            metadata,
        })
    }
}

struct RawEdge {
    id: String,
    source_id: String,
    target_id: String,
    edge_type: String,
    metadata: String,
}

fn raw_edge_from_row(row: &Row<'_>) -> rusqlite::Result<RawEdge> {
    Ok(RawEdge {
        id: row.get(0)?,
        source_id: row.get(1)?,
        target_id: row.get(2)?,
        edge_type: row.get(3)?,
        metadata: row.get(4)?,
    })
}

impl RawEdge {
    fn into_edge(self) -> Result<Edge> {
        let edge_type = EdgeType::parse(&self.edge_type)
            .ok_or_else(|| anyhow!("unknown edge type in store: {}", self.edge_type))?;
        let metadata: EdgeMetadata = serde_json::from_str(&self.metadata)
            .with_context(|| format!("parse edge metadata for {}", self.id))?;
        Ok(Edge {
            id: self.id,
            source_id: self.source_id,
            target_id: self.target_id,
            edge_type,
            metadata,
        })
    }
}

fn collect_nodes(
    rows: impl Iterator<Item = rusqlite::Result<RawNode>>,
) -> Result<Vec<Node>> {
    let mut nodes = Vec::new();
    for row in rows {
        nodes.push(row?.into_node()?);
    }
    Ok(nodes)
}

fn collect_edges(
    rows: impl Iterator<Item = rusqlite::Result<RawEdge>>,
) -> Result<Vec<Edge>> {
    let mut edges = Vec::new();
    for row in rows {
        edges.push(row?.into_edge()?);
    }
    Ok(edges)
}
