//! Query targets

use crate::ConnectionConfig;

/// One database to be queried.
///
/// A target pairs a connection descriptor, already scoped to the target's
/// catalog, with the display names used to tag every row it produces.
/// Targets are immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    connection: ConnectionConfig,
    database: String,
    server: String,
}

impl Target {
    /// Build a target for `database` on the server described by `server_config`
    pub fn new(
        server_config: &ConnectionConfig,
        server_name: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        let database = database.into();
        Self {
            connection: server_config.with_database(&database),
            database,
            server: server_name.into(),
        }
    }

    /// Connection descriptor scoped to this target's catalog
    pub fn connection(&self) -> &ConnectionConfig {
        &self.connection
    }

    /// Database display name
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Owning server display name
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Label used in messages, e.g. `Sales - prod-east`
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.database, self.server)
    }
}
