//! SQLite storage layer -- schema, queries, migrations.

pub mod rows;
pub mod schema;

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::probes::TestResult;
pub use rows::{flatten, MetricRow};

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Open (or create) the SQLite database and return a connection pool.
/// Missing parent directories are created.
pub fn open_pool(path: &Path) -> Result<Pool> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create database directory: {}", parent.display()))?;
    }

    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)
        .with_context(|| format!("failed to open database: {}", path.display()))?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;

    debug!(path = %path.display(), "Database ready");
    Ok(pool)
}

/// One invocation of the tool and how many results it produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    pub id: Uuid,
    pub command: String,
    pub started_at: DateTime<Utc>,
    pub result_count: usize,
}

/// Insert one result and its flattened metric rows.
pub fn save_result(conn: &Connection, run_id: Uuid, result: &TestResult) -> Result<i64> {
    let json = serde_json::to_string(result)?;
    conn.execute(
        "INSERT INTO results (run_id, test_name, target, status, duration, result_json, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            run_id.to_string(),
            result.test_name,
            result.target,
            result.status.as_str(),
            result.duration,
            json,
            result.timestamp.to_rfc3339(),
        ],
    )?;
    let result_id = conn.last_insert_rowid();

    let mut stmt = conn.prepare_cached(
        "INSERT INTO result_metrics (result_id, timestamp, test_name, target, metric, value, status, details)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    for row in flatten(result) {
        stmt.execute(params![
            result_id,
            row.timestamp.to_rfc3339(),
            row.test_name,
            row.target,
            row.metric,
            row.value,
            row.status,
            row.details,
        ])?;
    }
    Ok(result_id)
}

/// Persist a whole run in one transaction and return its id.
pub fn save_run(pool: &Pool, command: &str, results: &[TestResult]) -> Result<Uuid> {
    let mut conn = pool.get()?;
    let tx = conn.transaction()?;
    let run_id = Uuid::new_v4();

    tx.execute(
        "INSERT INTO runs (id, command, started_at, result_count) VALUES (?1, ?2, ?3, ?4)",
        params![run_id.to_string(), command, Utc::now().to_rfc3339(), results.len() as i64],
    )?;
    for result in results {
        save_result(&tx, run_id, result)?;
    }
    tx.commit()?;

    info!(%run_id, command, results = results.len(), "Saved run");
    Ok(run_id)
}

/// Most recent results first.
pub fn recent_results(pool: &Pool, limit: usize) -> Result<Vec<TestResult>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare("SELECT result_json FROM results ORDER BY id DESC LIMIT ?1")?;
    let rows = stmt.query_map(params![limit as i64], |row| row.get::<_, String>(0))?;

    let mut out = Vec::new();
    for json in rows {
        let json = json?;
        out.push(serde_json::from_str(&json).context("corrupt result row")?);
    }
    Ok(out)
}

/// Most recent runs first.
pub fn recent_runs(pool: &Pool, limit: usize) -> Result<Vec<RunRecord>> {
    let conn = pool.get()?;
    let mut stmt =
        conn.prepare("SELECT id, command, started_at, result_count FROM runs ORDER BY started_at DESC LIMIT ?1")?;
    let rows = stmt.query_map(params![limit as i64], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i64>(3)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (id, command, started_at, count) = row?;
        out.push(RunRecord {
            id: Uuid::parse_str(&id).context("corrupt run id")?,
            command,
            started_at: DateTime::parse_from_rfc3339(&started_at)
                .context("corrupt run timestamp")?
                .with_timezone(&Utc),
            result_count: usize::try_from(count).unwrap_or(0),
        });
    }
    Ok(out)
}
