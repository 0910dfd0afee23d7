//! Common test utilities and mocks

#![allow(dead_code)]

use async_trait::async_trait;
use bulkq_core::{
    BulkqError, ColumnMeta, Connection, ConnectionConfig, DatabaseDriver, QueryResult, Result,
    StatementResult, Target, Value,
};
use bulkq_drivers::DriverRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub const MOCK_DRIVER: &str = "mock";

/// Scripted behaviour of one mock database
#[derive(Debug, Clone, Default)]
pub struct MockDatabase {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Vec<Value>>,
    pub fail_connect: bool,
    /// Any batch containing this text fails
    pub fail_on: Option<String>,
    /// Delay applied to every batch
    pub delay: Duration,
}

impl MockDatabase {
    /// A database whose producing batch returns `columns` (name, type) and `rows`
    pub fn returning(columns: &[(&str, &str)], rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: columns
                .iter()
                .enumerate()
                .map(|(idx, (name, ty))| ColumnMeta::new(*name, *ty, true).at(idx))
                .collect(),
            rows,
            ..Self::default()
        }
    }

    pub fn unreachable() -> Self {
        Self {
            fail_connect: true,
            ..Self::default()
        }
    }

    pub fn failing_on(mut self, pattern: impl Into<String>) -> Self {
        self.fail_on = Some(pattern.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Counts connection lifecycle events and records executed SQL
#[derive(Debug, Default)]
pub struct MockCounters {
    opens: AtomicUsize,
    closes: AtomicUsize,
    log: parking_lot::Mutex<Vec<(String, String)>>,
}

impl MockCounters {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Connections opened but not yet closed
    pub fn open_connections(&self) -> usize {
        self.opens() - self.closes()
    }

    /// SQL sent to `database`, in order
    pub fn executed(&self, database: &str) -> Vec<String> {
        self.log
            .lock()
            .iter()
            .filter(|(db, _)| db == database)
            .map(|(_, sql)| sql.clone())
            .collect()
    }
}

/// Mock driver serving scripted databases by catalog name
pub struct MockDriver {
    databases: HashMap<String, MockDatabase>,
    counters: Arc<MockCounters>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            databases: HashMap::new(),
            counters: Arc::new(MockCounters::default()),
        }
    }

    pub fn with_database(mut self, name: impl Into<String>, database: MockDatabase) -> Self {
        self.databases.insert(name.into(), database);
        self
    }

    pub fn counters(&self) -> Arc<MockCounters> {
        self.counters.clone()
    }

    /// Registry holding only this driver
    pub fn into_registry(self) -> Arc<DriverRegistry> {
        let mut registry = DriverRegistry::new();
        registry.register(Arc::new(self));
        Arc::new(registry)
    }
}

#[async_trait]
impl DatabaseDriver for MockDriver {
    fn name(&self) -> &'static str {
        MOCK_DRIVER
    }

    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        let name = config.database.clone().unwrap_or_default();
        let database = self
            .databases
            .get(&name)
            .cloned()
            .ok_or_else(|| BulkqError::NotFound(format!("database '{name}'")))?;

        if database.fail_connect {
            return Err(BulkqError::Connection(format!(
                "cannot open database '{name}'"
            )));
        }

        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockConnection {
            name,
            database,
            counters: self.counters.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    fn build_connection_string(&self, config: &ConnectionConfig) -> String {
        format!("mock://{}", config.database.clone().unwrap_or_default())
    }
}

/// Connection to one scripted mock database
pub struct MockConnection {
    name: String,
    database: MockDatabase,
    counters: Arc<MockCounters>,
    closed: AtomicBool,
}

impl MockConnection {
    async fn run(&self, sql: &str) -> Result<()> {
        self.counters
            .log
            .lock()
            .push((self.name.clone(), sql.to_string()));

        if !self.database.delay.is_zero() {
            tokio::time::sleep(self.database.delay).await;
        }

        match &self.database.fail_on {
            Some(pattern) if sql.contains(pattern.as_str()) => {
                Err(BulkqError::Query(format!("failed on '{pattern}'")))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        MOCK_DRIVER
    }

    async fn execute(&self, sql: &str) -> Result<StatementResult> {
        self.run(sql).await?;
        Ok(StatementResult { affected_rows: 1 })
    }

    async fn query(&self, sql: &str) -> Result<QueryResult> {
        self.run(sql).await?;
        Ok(QueryResult::from_values(
            self.database.columns.clone(),
            self.database.rows.clone(),
        ))
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Target on the mock driver; the catalog name selects the scripted database
pub fn mock_target(server: &str, database: &str) -> Target {
    Target::new(&ConnectionConfig::new(MOCK_DRIVER), server, database)
}

/// Row values as display strings, for compact assertions
pub fn rendered_rows(rows: &[bulkq_core::Row]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| row.values.iter().map(ToString::to_string).collect())
        .collect()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("bulkq_query=debug")
        .try_init();
}
