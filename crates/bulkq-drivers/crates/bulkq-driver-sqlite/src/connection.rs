//! SQLite connection implementation

use async_trait::async_trait;
use bulkq_core::{
    BulkqError, ColumnMeta, Connection, QueryResult, Result, Row, StatementResult, Value,
    column_names,
};
use parking_lot::Mutex;
use rusqlite::{Connection as RusqliteConnection, InterruptHandle, OpenFlags};
use std::sync::Arc;

/// SQLite connection wrapper
///
/// Statements run on the blocking thread pool. The inner handle is taken out
/// on `close`, which releases the file.
pub struct SqliteConnection {
    conn: Arc<Mutex<Option<RusqliteConnection>>>,
    interrupt_handle: Arc<InterruptHandle>,
    path: String,
}

/// Interrupts the running statement unless disarmed.
///
/// Held across the await on a blocking statement, so a caller that stops
/// waiting (timeout, cancellation) also stops the statement.
struct InterruptOnDrop {
    handle: Option<Arc<InterruptHandle>>,
}

impl InterruptOnDrop {
    fn arm(handle: Arc<InterruptHandle>) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    fn disarm(mut self) {
        self.handle = None;
    }
}

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            tracing::debug!("interrupting SQLite statement");
            handle.interrupt();
        }
    }
}

impl SqliteConnection {
    /// Open a SQLite database
    pub fn open(path: &str) -> Result<Self> {
        tracing::debug!(path = %path, "opening SQLite database");
        let expanded_path = Self::expand_path(path)?;

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = if path == ":memory:" {
            RusqliteConnection::open_in_memory().map_err(|e| {
                BulkqError::Connection(format!("Failed to open in-memory database: {}", e))
            })?
        } else {
            // Validate that parent directory exists for non-URI paths
            if !expanded_path.starts_with("file:") {
                let file_path = std::path::Path::new(&expanded_path);
                if let Some(parent) = file_path.parent()
                    && !parent.exists()
                {
                    return Err(BulkqError::Connection(format!(
                        "Parent directory does not exist: {}",
                        parent.display()
                    )));
                }
            }

            RusqliteConnection::open_with_flags(&expanded_path, flags).map_err(|e| {
                BulkqError::Connection(format!(
                    "Failed to open SQLite database at '{}': {}",
                    expanded_path, e
                ))
            })?
        };

        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| BulkqError::Connection(format!("Failed to enable foreign keys: {}", e)))?;

        // Taken before the handle moves behind the mutex
        let interrupt_handle = Arc::new(conn.get_interrupt_handle());

        tracing::debug!(path = %expanded_path, "SQLite database connection established");
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            interrupt_handle,
            path: expanded_path,
        })
    }

    /// Expand path to handle ~ (home directory) and relative paths
    fn expand_path(path: &str) -> Result<String> {
        if path == ":memory:" || path.starts_with("file:") {
            return Ok(path.to_string());
        }

        let expanded = if let Some(rest) = path.strip_prefix("~/") {
            match std::env::var_os("HOME") {
                Some(home) => std::path::PathBuf::from(home)
                    .join(rest)
                    .to_string_lossy()
                    .to_string(),
                None => {
                    return Err(BulkqError::Configuration(
                        "Unable to determine HOME directory".into(),
                    ));
                }
            }
        } else if path.starts_with('~') {
            return Err(BulkqError::Configuration(
                "User-specific home directories (~user) are not supported".into(),
            ));
        } else {
            path.to_string()
        };

        let path_buf = std::path::PathBuf::from(&expanded);
        if path_buf.is_relative() {
            Ok(std::env::current_dir()?
                .join(path_buf)
                .to_string_lossy()
                .to_string())
        } else {
            Ok(expanded)
        }
    }

    /// Run `f` against the open handle on the blocking pool.
    ///
    /// Dropping the returned future interrupts the statement in flight.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&RusqliteConnection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let span = tracing::Span::current();
        let interrupt = InterruptOnDrop::arm(Arc::clone(&self.interrupt_handle));

        let result = tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            let guard = conn.lock();
            match guard.as_ref() {
                Some(conn) => f(conn),
                None => Err(BulkqError::Connection("Connection is closed".into())),
            }
        })
        .await;
        interrupt.disarm();

        result.map_err(|e| BulkqError::Other(format!("SQLite task failed: {}", e)))?
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    fn driver_name(&self) -> &str {
        "sqlite"
    }

    #[tracing::instrument(skip(self, sql), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str) -> Result<StatementResult> {
        let sql = sql.to_owned();
        self.with_conn(move |conn| {
            let before = total_changes(conn)?;
            conn.execute_batch(&sql)
                .map_err(|e| BulkqError::Query(format!("Failed to execute batch: {}", e)))?;
            let affected_rows = total_changes(conn)?.saturating_sub(before);

            tracing::debug!(affected_rows, "batch executed");
            Ok(StatementResult { affected_rows })
        })
        .await
    }

    #[tracing::instrument(skip(self, sql), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str) -> Result<QueryResult> {
        let start_time = std::time::Instant::now();
        let sql = sql.to_owned();

        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| BulkqError::Query(format!("Failed to prepare query: {}", e)))?;

            // Declared types come from sqlite3_column_decltype; expressions have none
            let columns: Vec<ColumnMeta> = stmt
                .columns()
                .iter()
                .enumerate()
                .map(|(idx, col)| ColumnMeta {
                    name: col.name().to_string(),
                    data_type: col.decl_type().unwrap_or("DYNAMIC").to_string(),
                    nullable: true,
                    ordinal: idx,
                })
                .collect();
            let names = column_names(&columns);

            let mut rows = Vec::new();
            let mut query_rows = stmt
                .query([])
                .map_err(|e| BulkqError::Query(format!("Failed to execute query: {}", e)))?;

            while let Some(row) = query_rows
                .next()
                .map_err(|e| BulkqError::Query(format!("Failed to fetch row: {}", e)))?
            {
                let values = (0..columns.len())
                    .map(|i| rusqlite_to_value(row, i))
                    .collect::<Result<Vec<_>>>()?;
                rows.push(Row::new(names.clone(), values));
            }

            let execution_time_ms = start_time.elapsed().as_millis() as u64;
            tracing::debug!(
                row_count = rows.len(),
                execution_time_ms,
                "query executed successfully"
            );

            Ok(QueryResult {
                columns,
                rows,
                affected_rows: 0,
                execution_time_ms,
            })
        })
        .await
    }

    async fn list_databases(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("PRAGMA database_list")
                .map_err(|e| BulkqError::Query(e.to_string()))?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(1))
                .map_err(|e| BulkqError::Query(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| BulkqError::Query(e.to_string()))?;
            Ok(names)
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        let path = self.path.clone();
        // Waits for a statement still unwinding from an interrupt
        tokio::task::spawn_blocking(move || {
            let Some(conn) = conn.lock().take() else {
                return Ok(());
            };
            tracing::debug!(path = %path, "closing SQLite connection");
            conn.close().map_err(|(_, e)| {
                BulkqError::Connection(format!("Failed to close database: {}", e))
            })
        })
        .await
        .map_err(|e| BulkqError::Other(format!("SQLite task failed: {}", e)))?
    }

    fn is_closed(&self) -> bool {
        match self.conn.try_lock() {
            Some(guard) => guard.is_none(),
            // a statement holds the handle, so it is still open
            None => false,
        }
    }
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Rows changed since the connection was opened, across all statements
fn total_changes(conn: &RusqliteConnection) -> Result<u64> {
    conn.query_row("SELECT total_changes()", [], |row| row.get::<_, i64>(0))
        .map(|n| n.max(0) as u64)
        .map_err(|e| BulkqError::Query(e.to_string()))
}

/// Convert rusqlite row value to our Value type
pub(crate) fn rusqlite_to_value(row: &rusqlite::Row, idx: usize) -> Result<Value> {
    use rusqlite::types::ValueRef;

    let value_ref = row
        .get_ref(idx)
        .map_err(|e| BulkqError::Query(e.to_string()))?;

    let value = match value_ref {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int64(i),
        ValueRef::Real(f) => Value::Float64(f),
        ValueRef::Text(s) => Value::String(String::from_utf8_lossy(s).to_string()),
        // BLOBs written through untyped columns frequently hold text
        ValueRef::Blob(b) => match std::str::from_utf8(b) {
            Ok(s) => Value::String(s.to_string()),
            Err(_) => Value::Bytes(b.to_vec()),
        },
    };

    Ok(value)
}
