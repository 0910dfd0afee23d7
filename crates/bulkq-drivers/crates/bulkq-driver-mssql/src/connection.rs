//! MS SQL Server connection implementation using tiberius

use async_trait::async_trait;
use bulkq_core::{
    BulkqError, ColumnMeta, Connection, ConnectionConfig, QueryResult, Result, Row,
    StatementResult, Value, column_names,
};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, Row as TiberiusRow};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

const LIST_DATABASES_SQL: &str = "SELECT name FROM master.dbo.sysdatabases";

/// MS SQL Server connection errors
#[derive(Debug, thiserror::Error)]
pub enum MssqlConnectionError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Type conversion error: {0}")]
    TypeConversion(String),

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("Tiberius error: {0}")]
    Tiberius(#[from] tiberius::error::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MssqlConnectionError> for BulkqError {
    fn from(err: MssqlConnectionError) -> Self {
        match err {
            MssqlConnectionError::ConnectionFailed(_)
            | MssqlConnectionError::AuthenticationFailed(_)
            | MssqlConnectionError::ConnectionClosed
            | MssqlConnectionError::Io(_) => BulkqError::Connection(err.to_string()),
            MssqlConnectionError::TypeConversion(_) | MssqlConnectionError::Tiberius(_) => {
                BulkqError::Driver(err.to_string())
            }
        }
    }
}

type MssqlClient = Client<Compat<TcpStream>>;

/// MS SQL Server connection using tiberius
pub struct MssqlConnection {
    client: Mutex<Option<MssqlClient>>,
    database: Option<String>,
}

impl MssqlConnection {
    /// Create a new MS SQL Server connection
    ///
    /// # Arguments
    /// * `host` - Server hostname
    /// * `port` - Server port (default 1433)
    /// * `database` - Initial catalog (optional)
    /// * `username` - Username (None for Windows auth)
    /// * `password` - Password
    /// * `trust_cert` - Whether to trust server certificate (for dev/testing)
    #[tracing::instrument(skip(password))]
    pub async fn connect(
        host: &str,
        port: u16,
        database: Option<&str>,
        username: Option<&str>,
        password: Option<&str>,
        trust_cert: bool,
    ) -> std::result::Result<Self, MssqlConnectionError> {
        tracing::debug!("connecting to MS SQL Server at {}:{}", host, port);

        let mut config = Config::new();
        config.host(host);
        config.port(port);

        if let Some(db) = database {
            config.database(db);
        }

        if trust_cert {
            config.trust_cert();
        }

        config.encryption(EncryptionLevel::Required);

        match (username, password) {
            (Some(user), Some(pass)) => {
                config.authentication(AuthMethod::sql_server(user, pass));
            }
            (Some(user), None) => {
                config.authentication(AuthMethod::sql_server(user, ""));
            }
            (None, _) => {
                #[cfg(windows)]
                {
                    config.authentication(AuthMethod::Integrated);
                }
                #[cfg(not(windows))]
                {
                    return Err(MssqlConnectionError::AuthenticationFailed(
                        "Windows authentication is only supported on Windows".to_string(),
                    ));
                }
            }
        }

        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| MssqlConnectionError::ConnectionFailed(e.to_string()))?;

        tcp.set_nodelay(true)?;
        let compat_stream = tcp.compat_write();

        let client = Client::connect(config, compat_stream)
            .await
            .map_err(|e| MssqlConnectionError::ConnectionFailed(e.to_string()))?;

        tracing::debug!("successfully connected to MS SQL Server");

        Ok(Self {
            client: Mutex::new(Some(client)),
            database: database.map(String::from),
        })
    }

    /// Create connection from config with standard keys
    pub async fn from_config(
        config: &ConnectionConfig,
    ) -> std::result::Result<Self, MssqlConnectionError> {
        let host = config
            .get_string("host")
            .unwrap_or_else(|| "localhost".to_string());
        let port = if config.port > 0 { config.port } else { 1433 };
        let database = config.get_string("database");
        let username = config.get_string("user");
        let password = config.get_string("password");
        let trust_cert = config.get_bool("trust_cert");

        Self::connect(
            &host,
            port,
            database.as_deref(),
            username.as_deref(),
            password.as_deref(),
            trust_cert,
        )
        .await
    }
}

#[async_trait]
impl Connection for MssqlConnection {
    fn driver_name(&self) -> &str {
        "mssql"
    }

    async fn execute(&self, sql: &str) -> Result<StatementResult> {
        let start = std::time::Instant::now();

        let mut guard = self.client.lock().await;
        let client = guard.as_mut().ok_or(MssqlConnectionError::ConnectionClosed)?;

        match client.execute(sql, &[]).await {
            Ok(exec_result) => {
                let affected_rows = exec_result.rows_affected().iter().sum::<u64>();
                tracing::debug!(
                    affected_rows = affected_rows,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "execute completed"
                );

                Ok(StatementResult { affected_rows })
            }
            Err(e) => {
                tracing::error!(error = %e, "execute failed");
                Err(BulkqError::Query(e.to_string()))
            }
        }
    }

    async fn query(&self, sql: &str) -> Result<QueryResult> {
        let start = std::time::Instant::now();

        let mut guard = self.client.lock().await;
        let client = guard.as_mut().ok_or(MssqlConnectionError::ConnectionClosed)?;

        let mut stream = client.query(sql, &[]).await.map_err(|e| {
            tracing::error!(error = %e, "query failed");
            BulkqError::Query(e.to_string())
        })?;

        // Metadata arrives before the first row, so empty results still carry a schema
        let columns: Vec<ColumnMeta> = stream
            .columns()
            .await
            .map_err(|e| BulkqError::Query(e.to_string()))?
            .map(|cols| {
                cols.iter()
                    .enumerate()
                    .map(|(idx, col)| tiberius_column_to_meta(col, idx))
                    .collect()
            })
            .unwrap_or_default();

        let tib_rows = stream
            .into_first_result()
            .await
            .map_err(|e| BulkqError::Query(e.to_string()))?;

        let names = column_names(&columns);
        let rows = tib_rows
            .into_iter()
            .map(|tib_row| Ok(Row::new(names.clone(), tiberius_row_to_values(tib_row)?)))
            .collect::<Result<Vec<_>>>()?;

        let execution_time_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(
            row_count = rows.len(),
            duration_ms = execution_time_ms,
            "query completed"
        );

        Ok(QueryResult {
            columns,
            rows,
            affected_rows: 0,
            execution_time_ms,
        })
    }

    async fn list_databases(&self) -> Result<Vec<String>> {
        let result = self.query(LIST_DATABASES_SQL).await?;
        Ok(result
            .rows
            .iter()
            .filter_map(|row| row.get(0).and_then(Value::as_str).map(String::from))
            .collect())
    }

    async fn close(&self) -> Result<()> {
        let Some(client) = self.client.lock().await.take() else {
            return Ok(());
        };
        client
            .close()
            .await
            .map_err(|e| BulkqError::Connection(e.to_string()))?;
        tracing::debug!("MS SQL Server connection closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        match self.client.try_lock() {
            Ok(guard) => guard.is_none(),
            // a query holds the client, so it is still open
            Err(_) => false,
        }
    }
}

/// Convert a tiberius column to ColumnMeta
fn tiberius_column_to_meta(col: &tiberius::Column, ordinal: usize) -> ColumnMeta {
    ColumnMeta {
        name: col.name().to_string(),
        data_type: format!("{:?}", col.column_type()),
        // TDS column metadata is not surfaced by tiberius beyond name and type
        nullable: true,
        ordinal,
    }
}

/// Convert a tiberius row to a vector of Values by consuming the row
fn tiberius_row_to_values(row: TiberiusRow) -> Result<Vec<Value>> {
    row.into_iter().map(column_data_to_value).collect()
}

fn epoch(year: i32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, 1, 1)
        .ok_or_else(|| MssqlConnectionError::TypeConversion(format!("bad epoch year {year}")).into())
}

/// Time of day from `increments` units of 10^-scale seconds
fn time_from_increments(increments: u64, scale: u8) -> NaiveTime {
    let per_second = 10u64.pow(scale as u32);
    let seconds = (increments / per_second) as u32;
    let nanos = ((increments % per_second) * 10u64.pow(9 - scale.min(9) as u32)) as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(seconds, nanos).unwrap_or_default()
}

fn datetime2_to_naive(v: tiberius::time::DateTime2) -> Result<NaiveDateTime> {
    let date = epoch(1)? + Duration::days(v.date().days() as i64);
    Ok(NaiveDateTime::new(
        date,
        time_from_increments(v.time().increments(), v.time().scale()),
    ))
}

/// Convert tiberius ColumnData to a bulkq Value
pub(crate) fn column_data_to_value(col_data: ColumnData<'static>) -> Result<Value> {
    let value = match col_data {
        ColumnData::Bit(v) => v.map(Value::Bool),
        ColumnData::U8(v) => v.map(|v| Value::Int16(v as i16)),
        ColumnData::I16(v) => v.map(Value::Int16),
        ColumnData::I32(v) => v.map(Value::Int32),
        ColumnData::I64(v) => v.map(Value::Int64),
        ColumnData::F32(v) => v.map(Value::Float32),
        ColumnData::F64(v) => v.map(Value::Float64),
        ColumnData::String(v) => v.map(|v| Value::String(v.into_owned())),
        ColumnData::Guid(v) => v.map(Value::Uuid),
        ColumnData::Binary(v) => v.map(|v| Value::Bytes(v.into_owned())),
        ColumnData::Numeric(v) => v.map(|v| Value::Decimal(v.to_string())),
        ColumnData::Xml(v) => v.map(|v| Value::String(v.into_owned().into_string())),
        ColumnData::DateTime(Some(v)) => {
            // 1/300th of a second ticks since midnight
            let millis = (v.seconds_fragments() as u64 * 10) / 3;
            let time = NaiveTime::from_num_seconds_from_midnight_opt(
                (millis / 1000) as u32,
                ((millis % 1000) * 1_000_000) as u32,
            )
            .unwrap_or_default();
            let date = epoch(1900)? + Duration::days(v.days() as i64);
            Some(Value::DateTime(NaiveDateTime::new(date, time)))
        }
        ColumnData::SmallDateTime(Some(v)) => {
            let time = NaiveTime::from_num_seconds_from_midnight_opt(
                v.seconds_fragments() as u32 * 60,
                0,
            )
            .unwrap_or_default();
            let date = epoch(1900)? + Duration::days(v.days() as i64);
            Some(Value::DateTime(NaiveDateTime::new(date, time)))
        }
        ColumnData::DateTime2(Some(v)) => Some(Value::DateTime(datetime2_to_naive(v)?)),
        ColumnData::DateTimeOffset(Some(v)) => {
            // stored as UTC with the offset alongside
            let naive = datetime2_to_naive(v.datetime2())?;
            Some(Value::DateTimeUtc(naive.and_utc()))
        }
        ColumnData::Date(Some(v)) => Some(Value::Date(epoch(1)? + Duration::days(v.days() as i64))),
        ColumnData::Time(Some(v)) => Some(Value::Time(time_from_increments(
            v.increments(),
            v.scale(),
        ))),
        ColumnData::DateTime(None)
        | ColumnData::SmallDateTime(None)
        | ColumnData::DateTime2(None)
        | ColumnData::DateTimeOffset(None)
        | ColumnData::Date(None)
        | ColumnData::Time(None) => None,
    };

    Ok(value.unwrap_or(Value::Null))
}

impl std::fmt::Debug for MssqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlConnection")
            .field("database", &self.database)
            .field("closed", &self.is_closed())
            .finish()
    }
}
