//! Bulk query execution
//!
//! Runs one SQL script against many database targets at once and folds the
//! per-target results into a single table:
//!
//! - [`split`] cuts the script into batches on `GO` lines
//! - [`execute_target`] runs the batches against one target and never fails
//!   past its boundary; errors become [`TargetOutcome::Failure`]
//! - [`reconcile`] compares a result schema with the canonical one
//! - [`BulkQueryEngine`] dispatches every target concurrently, joins them,
//!   and folds the outcomes in target input order

mod aggregate;
mod discovery;
mod engine;
mod error;
mod executor;
mod reconcile;
mod splitter;

pub use aggregate::{AggregateResult, fold_outcomes, mismatch_message};
pub use discovery::{DISCOVERY_CONNECT_TIMEOUT, list_databases};
pub use engine::BulkQueryEngine;
pub use error::{TargetError, TargetFailure};
pub use executor::{
    DATABASE_COLUMN, ResultSet, SERVER_COLUMN, TargetOutcome, execute_target, statement_timeout,
};
pub use reconcile::{MismatchReason, SchemaVerdict, reconcile};
pub use splitter::{BATCH_SEPARATOR, Batch, Batches, split};
