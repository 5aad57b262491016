use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::derived::{DerivedActivationsGraph, GraphSnapshot};

/// Snapshot format version. Bump to invalidate stored checkpoints.
pub const CHECKPOINT_VERSION: u32 = 2;

/// Where derived graphs are kept between runs, keyed by the content hash of
/// the order-0 graph they were derived from and by derivation order.
pub trait CheckpointStore: Send + Sync {
    fn load(&self, graph_hash: &str, order: usize) -> Result<Option<DerivedActivationsGraph>>;
    fn save(&self, graph_hash: &str, order: usize, graph: &DerivedActivationsGraph) -> Result<()>;
}

/// SQLite-backed checkpoints for one named run.
///
/// Rows are keyed by `(run, graph_hash, version, derivation_order)`. An
/// edited input hashes differently and a version bump turns old rows into
/// misses.
pub struct SqliteCheckpointStore {
    connection: Mutex<Connection>,
    run: String,
}

impl SqliteCheckpointStore {
    pub fn open(db_path: &Path, run: impl Into<String>) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("creating checkpoint directory: {}", parent.display())
                })?;
            }
        }

        let connection = Connection::open(db_path)
            .with_context(|| format!("opening checkpoint db: {}", db_path.display()))?;

        connection
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS derived_graphs (
                    run              TEXT NOT NULL,
                    graph_hash       TEXT NOT NULL,
                    version          INTEGER NOT NULL,
                    derivation_order INTEGER NOT NULL,
                    created_at       TEXT NOT NULL,
                    node_count       INTEGER NOT NULL,
                    snapshot_json    TEXT NOT NULL,
                    PRIMARY KEY (run, graph_hash, version, derivation_order)
                );",
            )
            .context("creating checkpoint table")?;

        Ok(Self {
            connection: Mutex::new(connection),
            run: run.into(),
        })
    }

    pub fn run(&self) -> &str {
        &self.run
    }

    /// Orders stored for this run and graph at the current version, ascending.
    pub fn stored_orders(&self, graph_hash: &str) -> Result<Vec<usize>> {
        let conn = self
            .connection
            .lock()
            .map_err(|_| anyhow::anyhow!("checkpoint mutex poisoned"))?;

        let mut stmt = conn.prepare_cached(
            "SELECT derivation_order FROM derived_graphs
             WHERE run = ?1 AND graph_hash = ?2 AND version = ?3
             ORDER BY derivation_order",
        )?;
        let orders = stmt
            .query_map(
                rusqlite::params![self.run, graph_hash, CHECKPOINT_VERSION],
                |row| row.get::<_, i64>(0),
            )?
            .map(|order| Ok(order? as usize))
            .collect::<Result<Vec<_>>>()?;
        Ok(orders)
    }
}

impl CheckpointStore for SqliteCheckpointStore {
    fn load(&self, graph_hash: &str, order: usize) -> Result<Option<DerivedActivationsGraph>> {
        let conn = self
            .connection
            .lock()
            .map_err(|_| anyhow::anyhow!("checkpoint mutex poisoned"))?;

        let mut stmt = conn.prepare_cached(
            "SELECT snapshot_json FROM derived_graphs
             WHERE run = ?1 AND graph_hash = ?2 AND version = ?3 AND derivation_order = ?4",
        )?;

        let result = stmt.query_row(
            rusqlite::params![self.run, graph_hash, CHECKPOINT_VERSION, order as i64],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(json) => {
                let snapshot: GraphSnapshot =
                    serde_json::from_str(&json).context("deserializing graph snapshot")?;
                let graph = DerivedActivationsGraph::from_snapshot(snapshot)
                    .context("rebuilding checkpointed graph")?;
                Ok(Some(graph))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e).context("querying checkpoints"),
        }
    }

    fn save(&self, graph_hash: &str, order: usize, graph: &DerivedActivationsGraph) -> Result<()> {
        let json =
            serde_json::to_string(&graph.snapshot()).context("serializing graph snapshot")?;
        let now = chrono::Utc::now().to_rfc3339();

        let conn = self
            .connection
            .lock()
            .map_err(|_| anyhow::anyhow!("checkpoint mutex poisoned"))?;

        conn.execute(
            "INSERT OR REPLACE INTO derived_graphs
                (run, graph_hash, version, derivation_order, created_at, node_count, snapshot_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                self.run,
                graph_hash,
                CHECKPOINT_VERSION,
                order as i64,
                now,
                graph.node_count() as i64,
                json
            ],
        )?;

        Ok(())
    }
}

/// In-process checkpoints.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    graphs: Mutex<BTreeMap<(String, usize), DerivedActivationsGraph>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored_orders(&self, graph_hash: &str) -> Vec<usize> {
        self.graphs
            .lock()
            .map(|graphs| {
                graphs
                    .keys()
                    .filter(|(hash, _)| hash == graph_hash)
                    .map(|&(_, order)| order)
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self, graph_hash: &str, order: usize) -> Result<Option<DerivedActivationsGraph>> {
        let graphs = self
            .graphs
            .lock()
            .map_err(|_| anyhow::anyhow!("checkpoint mutex poisoned"))?;
        Ok(graphs.get(&(graph_hash.to_string(), order)).cloned())
    }

    fn save(&self, graph_hash: &str, order: usize, graph: &DerivedActivationsGraph) -> Result<()> {
        let mut graphs = self
            .graphs
            .lock()
            .map_err(|_| anyhow::anyhow!("checkpoint mutex poisoned"))?;
        graphs.insert((graph_hash.to_string(), order), graph.clone());
        Ok(())
    }
}
