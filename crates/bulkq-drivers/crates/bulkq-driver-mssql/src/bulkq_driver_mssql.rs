//! MS SQL Server driver for bulkq
//!
//! Speaks TDS through `tiberius`. Batches arrive already split on `GO`
//! lines, so each call here sends exactly one batch to the server.

mod connection;
mod driver;

#[cfg(test)]
mod connection_tests;
#[cfg(test)]
mod driver_tests;

pub use connection::{MssqlConnection, MssqlConnectionError};
pub use driver::MssqlDriver;
