//! Folding per-target outcomes into one result

use bulkq_core::{ColumnMeta, Row, Target};

use crate::executor::TargetOutcome;
use crate::reconcile::{SchemaVerdict, reconcile};

/// The reconciled result of one bulk query
#[derive(Debug, Clone, Default)]
pub struct AggregateResult {
    /// Canonical schema, `None` when no target succeeded
    pub schema: Option<Vec<ColumnMeta>>,
    /// Rows of every target whose schema matched, in target order
    pub rows: Vec<Row>,
    /// One message per failed or mismatched target, in target order
    pub messages: Vec<String>,
}

impl AggregateResult {
    /// True when there is a schema to render, even with zero rows
    pub fn has_schema(&self) -> bool {
        self.schema.is_some()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// True when every target succeeded with a matching schema
    pub fn is_clean(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Message recorded when `target` returned columns that differ from those of
/// the target that established the canonical schema
pub fn mismatch_message(target: &Target, canonical: &Target) -> String {
    format!(
        "Columns returned by {} do not match those of {}.",
        target.label(),
        canonical.label()
    )
}

/// Fold `outcomes` in target input order.
///
/// The first success seeds the canonical schema. Later successes are merged
/// only on an exact schema match; otherwise all their rows are dropped and a
/// message names both targets. Each failure contributes its message.
pub fn fold_outcomes(targets: &[Target], outcomes: Vec<TargetOutcome>) -> AggregateResult {
    let mut aggregate = AggregateResult::default();
    let mut canonical_target: Option<&Target> = None;

    for (target, outcome) in targets.iter().zip(outcomes) {
        let result_set = match outcome {
            TargetOutcome::Success(result_set) => result_set,
            TargetOutcome::Failure(failure) => {
                aggregate.messages.push(failure.to_string());
                continue;
            }
        };

        let (Some(schema), Some(canonical)) = (&aggregate.schema, canonical_target) else {
            aggregate.schema = Some(result_set.schema);
            aggregate.rows = result_set.rows;
            canonical_target = Some(target);
            continue;
        };

        match reconcile(schema, &result_set.schema) {
            SchemaVerdict::Match => aggregate.rows.extend(result_set.rows),
            SchemaVerdict::Mismatch(reason) => {
                tracing::warn!(
                    label = %target,
                    canonical = %canonical,
                    ?reason,
                    dropped_rows = result_set.rows.len(),
                    "schema mismatch"
                );
                aggregate.messages.push(mismatch_message(target, canonical));
            }
        }
    }

    aggregate
}
