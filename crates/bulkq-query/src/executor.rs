//! Per-target execution
//!
//! [`execute_target`] owns exactly one connection for the duration of the
//! call and converts every error into a [`TargetOutcome::Failure`].

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bulkq_core::{BulkqError, ColumnMeta, Connection, QueryResult, Result, Row, Target, Value, column_names};
use bulkq_drivers::DriverRegistry;

use crate::error::{TargetError, TargetFailure};
use crate::splitter::Batches;

/// Provenance column holding the server display name (ordinal 0)
pub const SERVER_COLUMN: &str = "Server";
/// Provenance column holding the database display name (ordinal 1)
pub const DATABASE_COLUMN: &str = "Database";

const PROVENANCE_TYPE: &str = "nvarchar";

/// Rows of one target, provenance columns included
#[derive(Debug, Clone)]
pub struct ResultSet {
    pub schema: Vec<ColumnMeta>,
    pub rows: Vec<Row>,
}

impl ResultSet {
    /// Prepend the `Server` and `Database` columns to `result`, stamping every
    /// row with the target's display names
    pub fn with_provenance(target: &Target, result: QueryResult) -> Self {
        let mut schema = Vec::with_capacity(result.columns.len() + 2);
        schema.push(ColumnMeta::new(SERVER_COLUMN, PROVENANCE_TYPE, false).at(0));
        schema.push(ColumnMeta::new(DATABASE_COLUMN, PROVENANCE_TYPE, false).at(1));
        schema.extend(
            result
                .columns
                .into_iter()
                .enumerate()
                .map(|(idx, col)| col.at(idx + 2)),
        );

        let names = column_names(&schema);
        let server = Value::String(target.server().to_string());
        let database = Value::String(target.database().to_string());
        let rows = result
            .rows
            .into_iter()
            .map(|row| {
                let mut values = Vec::with_capacity(row.values.len() + 2);
                values.push(server.clone());
                values.push(database.clone());
                values.extend(row.values);
                Row::new(names.clone(), values)
            })
            .collect();

        Self { schema, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Result of running the script against one target
#[derive(Debug)]
pub enum TargetOutcome {
    Success(ResultSet),
    Failure(TargetFailure),
}

/// Per-statement time limit; `0` seconds disables it
pub fn statement_timeout(timeout_secs: u64) -> Option<Duration> {
    (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs))
}

async fn with_timeout<T>(
    limit: Option<Duration>,
    what: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match limit {
        None => fut.await,
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
            BulkqError::Timeout(format!("{what} timed out after {}s", limit.as_secs()))
        })?,
    }
}

/// Closes the connection when dropped, so a cancelled execution still
/// releases it
struct ConnectionGuard {
    conn: Option<Arc<dyn Connection>>,
}

impl ConnectionGuard {
    fn new(conn: Arc<dyn Connection>) -> Self {
        Self { conn: Some(conn) }
    }

    fn connection(&self) -> Result<&Arc<dyn Connection>> {
        self.conn
            .as_ref()
            .ok_or_else(|| BulkqError::Connection("connection already released".into()))
    }

    async fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                tracing::warn!(error = %e, "failed to close connection");
            }
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = conn.close().await {
                        tracing::warn!(error = %e, "failed to close abandoned connection");
                    }
                });
            }
            Err(_) => tracing::warn!("no runtime to close abandoned connection"),
        }
    }
}

/// Run `batches` against `target`.
///
/// Side-effect batches run in order through [`Connection::execute`]; the
/// first failure stops the target and nothing already applied is undone. The
/// producing batch runs through [`Connection::query`] and its rows are tagged
/// with provenance. `timeout` bounds the connect and each batch separately.
/// A script of blank batches only connects, then succeeds with no rows.
#[tracing::instrument(skip_all, fields(server = %target.server(), database = %target.database()))]
pub async fn execute_target(
    registry: &DriverRegistry,
    target: &Target,
    batches: &Batches,
    timeout: Option<Duration>,
) -> TargetOutcome {
    let start = Instant::now();
    match run_batches(registry, target, batches, timeout).await {
        Ok(result_set) => {
            tracing::debug!(
                row_count = result_set.row_count(),
                duration_ms = start.elapsed().as_millis() as u64,
                "target completed"
            );
            TargetOutcome::Success(result_set)
        }
        Err(error) => {
            let failure = TargetFailure::new(target, error);
            tracing::warn!(
                error = %failure,
                timeout = failure.error().is_timeout(),
                duration_ms = start.elapsed().as_millis() as u64,
                "target failed"
            );
            TargetOutcome::Failure(failure)
        }
    }
}

async fn run_batches(
    registry: &DriverRegistry,
    target: &Target,
    batches: &Batches,
    timeout: Option<Duration>,
) -> std::result::Result<ResultSet, TargetError> {
    let config = target.connection();
    let driver = registry
        .get(&config.driver)
        .ok_or_else(|| TargetError::UnknownDriver(config.driver.clone()))?;

    tracing::debug!(driver = driver.name(), "connecting");
    let conn = with_timeout(timeout, "connect", driver.connect(config))
        .await
        .map_err(TargetError::Connection)?;
    let guard = ConnectionGuard::new(conn);

    let result = run_on_connection(&guard, target, batches, timeout).await;
    guard.release().await;
    result
}

async fn run_on_connection(
    guard: &ConnectionGuard,
    target: &Target,
    batches: &Batches,
    timeout: Option<Duration>,
) -> std::result::Result<ResultSet, TargetError> {
    let conn = guard.connection().map_err(TargetError::Connection)?;

    let Some(producing) = batches.producing() else {
        tracing::debug!("script has only blank batches, nothing sent");
        return Ok(ResultSet::with_provenance(target, QueryResult::empty()));
    };

    for batch in batches.side_effects() {
        let start = Instant::now();
        let result = with_timeout(timeout, "batch", conn.execute(batch.sql()))
            .await
            .map_err(|source| TargetError::Execution {
                batch: batch.index(),
                source,
            })?;
        tracing::debug!(
            batch = batch.index(),
            affected_rows = result.affected_rows,
            duration_ms = start.elapsed().as_millis() as u64,
            "side-effect batch executed"
        );
    }

    let start = Instant::now();
    let result = with_timeout(timeout, "batch", conn.query(producing.sql()))
        .await
        .map_err(|source| TargetError::Execution {
            batch: producing.index(),
            source,
        })?;
    tracing::debug!(
        batch = producing.index(),
        row_count = result.row_count(),
        duration_ms = start.elapsed().as_millis() as u64,
        "producing batch executed"
    );

    Ok(ResultSet::with_provenance(target, result))
}
