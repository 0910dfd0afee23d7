//! SQLite database driver implementation
//!
//! A SQLite target's catalog is a database file path, so one "server" entry
//! can group any number of database files.

mod connection;
mod driver;

#[cfg(test)]
mod connection_tests;

pub use connection::SqliteConnection;
pub use driver::SqliteDriver;
