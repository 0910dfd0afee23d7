//! Schema reconciliation
//!
//! Two schemas agree only when they have the same length and every position
//! matches on name, declared type and nullability. Reordered columns are a
//! mismatch.

use bulkq_core::ColumnMeta;

/// Where two schemas first disagree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchReason {
    ColumnCount { expected: usize, found: usize },
    Column { ordinal: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVerdict {
    Match,
    Mismatch(MismatchReason),
}

impl SchemaVerdict {
    pub fn is_match(&self) -> bool {
        matches!(self, SchemaVerdict::Match)
    }
}

/// Compare `candidate` against the established `canonical` schema
pub fn reconcile(canonical: &[ColumnMeta], candidate: &[ColumnMeta]) -> SchemaVerdict {
    if canonical.len() != candidate.len() {
        return SchemaVerdict::Mismatch(MismatchReason::ColumnCount {
            expected: canonical.len(),
            found: candidate.len(),
        });
    }

    canonical
        .iter()
        .zip(candidate)
        .position(|(expected, found)| {
            expected.name != found.name
                || expected.data_type != found.data_type
                || expected.nullable != found.nullable
        })
        .map_or(SchemaVerdict::Match, |ordinal| {
            SchemaVerdict::Mismatch(MismatchReason::Column { ordinal })
        })
}
