use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

use botflow_core::error::{FlowError, Result};
use botflow_core::traits::ContextStore;
use botflow_core::types::{Context, ContextId, FlowId};
use botflow_graph::{FlowGraph, GraphSource};

const ACTIVE_STATUSES: &str = "('initializing', 'running', 'waiting_input', 'waiting_flow')";

/// SQLite-backed store for execution contexts and flow definitions.
///
/// Contexts are serialized whole into a JSON column; status and expiry are
/// duplicated as columns for querying. Access is per-context with no
/// cross-context locking.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS contexts (
        id TEXT PRIMARY KEY,
        flow_id TEXT NOT NULL,
        status TEXT NOT NULL,
        expires_at TEXT,
        data TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_contexts_expiry
        ON contexts(status, expires_at);

    CREATE TABLE IF NOT EXISTS flows (
        id TEXT PRIMARY KEY,
        name TEXT,
        definition TEXT NOT NULL
    );";

impl SqliteStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                FlowError::Database(format!("Failed to create db directory: {}", e))
            })?;
        }

        let conn = Connection::open(path).map_err(|e| FlowError::Database(e.to_string()))?;

        // Enable WAL mode for better concurrent performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| FlowError::Database(e.to_string()))?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| FlowError::Database(e.to_string()))?;

        debug!(path = %path.display(), "SQLite store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing and one-off CLI runs).
    pub fn in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| FlowError::Database(e.to_string()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| FlowError::Database(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Register or replace a flow definition.
    pub fn insert_flow(&self, graph: &FlowGraph) -> Result<()> {
        let definition =
            serde_json::to_string(graph).map_err(|e| FlowError::Database(e.to_string()))?;
        let conn = self
            .conn
            .lock()
            .map_err(|e| FlowError::Database(e.to_string()))?;
        conn.execute(
            "INSERT OR REPLACE INTO flows (id, name, definition) VALUES (?1, ?2, ?3)",
            params![graph.id, graph.name, definition],
        )
        .map_err(|e| FlowError::Database(e.to_string()))?;
        Ok(())
    }
}

impl ContextStore for SqliteStore {
    fn load(&self, id: &ContextId) -> BoxFuture<'_, Result<Option<Context>>> {
        let id = id.0.clone();

        Box::pin(async move {
            let conn = self
                .conn
                .lock()
                .map_err(|e| FlowError::Database(e.to_string()))?;

            let mut stmt = conn
                .prepare("SELECT data FROM contexts WHERE id = ?1")
                .map_err(|e| FlowError::Database(e.to_string()))?;

            let mut rows = stmt
                .query(params![id])
                .map_err(|e| FlowError::Database(e.to_string()))?;

            match rows.next().map_err(|e| FlowError::Database(e.to_string()))? {
                Some(row) => {
                    let data: String =
                        row.get(0).map_err(|e| FlowError::Database(e.to_string()))?;
                    let ctx: Context = serde_json::from_str(&data)?;
                    Ok(Some(ctx))
                }
                None => Ok(None),
            }
        })
    }

    fn save(&self, ctx: &Context) -> BoxFuture<'_, Result<()>> {
        let id = ctx.id.0.clone();
        let flow_id = ctx.flow_id.0.clone();
        let status = ctx.status.to_string();
        let expires_at = ctx.expires_at.map(|t| t.to_rfc3339());
        let updated_at = ctx.updated_at.to_rfc3339();
        let data = serde_json::to_string(ctx);

        Box::pin(async move {
            let data = data?;
            let conn = self
                .conn
                .lock()
                .map_err(|e| FlowError::Database(e.to_string()))?;

            conn.execute(
                "INSERT OR REPLACE INTO contexts (id, flow_id, status, expires_at, data, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, flow_id, status, expires_at, data, updated_at],
            )
            .map_err(|e| FlowError::Database(e.to_string()))?;

            Ok(())
        })
    }

    fn expired_before(&self, cutoff: DateTime<Utc>) -> BoxFuture<'_, Result<Vec<ContextId>>> {
        let cutoff = cutoff.to_rfc3339();

        Box::pin(async move {
            let conn = self
                .conn
                .lock()
                .map_err(|e| FlowError::Database(e.to_string()))?;

            let sql = format!(
                "SELECT id FROM contexts
                 WHERE status IN {} AND expires_at IS NOT NULL AND expires_at < ?1",
                ACTIVE_STATUSES
            );
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| FlowError::Database(e.to_string()))?;

            let rows = stmt
                .query_map(params![cutoff], |row| {
                    let id: String = row.get(0)?;
                    Ok(id)
                })
                .map_err(|e| FlowError::Database(e.to_string()))?;

            let mut ids = Vec::new();
            for row in rows {
                let id = row.map_err(|e| FlowError::Database(e.to_string()))?;
                ids.push(ContextId::from_string(&id));
            }

            Ok(ids)
        })
    }
}

impl GraphSource for SqliteStore {
    fn flow(&self, id: &FlowId) -> BoxFuture<'_, Result<Option<FlowGraph>>> {
        let id = id.0.clone();

        Box::pin(async move {
            let conn = self
                .conn
                .lock()
                .map_err(|e| FlowError::Database(e.to_string()))?;

            let mut stmt = conn
                .prepare("SELECT definition FROM flows WHERE id = ?1")
                .map_err(|e| FlowError::Database(e.to_string()))?;

            let mut rows = stmt
                .query(params![id])
                .map_err(|e| FlowError::Database(e.to_string()))?;

            match rows.next().map_err(|e| FlowError::Database(e.to_string()))? {
                Some(row) => {
                    let definition: String =
                        row.get(0).map_err(|e| FlowError::Database(e.to_string()))?;
                    let graph = FlowGraph::parse(&definition)?;
                    Ok(Some(graph))
                }
                None => Ok(None),
            }
        })
    }
}
