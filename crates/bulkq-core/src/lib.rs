//! bulkq Core - Shared abstractions for running one script against many databases
//!
//! This crate provides the traits and types that every other bulkq crate
//! depends on. It defines:
//!
//! - `DatabaseDriver` - Trait for database driver implementations
//! - `Connection` - Trait for database connections
//! - `Target` - One database to be queried, with its provenance names
//! - Common types like `Value`, `Row`, `ColumnMeta`, `QueryResult`

mod connection;
mod driver;
mod error;
mod target;
mod types;

pub use connection::*;
pub use driver::*;
pub use error::*;
pub use target::*;
pub use types::*;
