//! Script splitting on batch separator lines
//!
//! A line whose trimmed content is `GO` (any case) ends the current batch.
//! Everything else, line terminators included, is copied into the batch
//! verbatim, so a script without separators comes back unchanged as a
//! single batch.

/// Separator token recognised on a line of its own
pub const BATCH_SEPARATOR: &str = "GO";

/// One statement group cut from a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    index: usize,
    sql: String,
}

impl Batch {
    fn new(index: usize, sql: String) -> Self {
        Self { index, sql }
    }

    /// Position of this batch in the script (0-based)
    pub fn index(&self) -> usize {
        self.index
    }

    /// Batch text, excluding the separator line
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// True when the batch has no non-whitespace content. Blank batches are
    /// no-ops and are never sent to a server.
    pub fn is_blank(&self) -> bool {
        self.sql.trim().is_empty()
    }
}

/// The ordered batches of one script.
///
/// The last non-blank batch is the producing batch whose rows are returned.
/// Every non-blank batch before it is a side-effect batch.
// Trailing blank batches are skipped when picking the producing batch, so a
// script ending in `GO` still returns the rows of its last statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batches {
    batches: Vec<Batch>,
    producing: Option<usize>,
}

impl Batches {
    /// All batches in script order, blank ones included
    pub fn as_slice(&self) -> &[Batch] {
        &self.batches
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// True when every batch is blank, so running the script sends nothing
    pub fn is_noop(&self) -> bool {
        self.producing.is_none()
    }

    /// The batch whose result set is materialized, `None` for a no-op script
    pub fn producing(&self) -> Option<&Batch> {
        self.producing.map(|idx| &self.batches[idx])
    }

    /// Non-blank batches executed for their side effects, in order
    pub fn side_effects(&self) -> impl Iterator<Item = &Batch> {
        let end = self.producing.unwrap_or(self.batches.len());
        self.batches[..end].iter().filter(|batch| !batch.is_blank())
    }
}

fn is_separator(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case(BATCH_SEPARATOR)
}

/// Split `script` into batches on separator lines.
///
/// Always yields at least one batch. A script without separator lines comes
/// back as a single batch equal to the input.
pub fn split(script: &str) -> Batches {
    let mut batches = Vec::new();
    let mut current = String::new();

    for line in script.split_inclusive('\n') {
        if is_separator(line) {
            batches.push(Batch::new(batches.len(), std::mem::take(&mut current)));
        } else {
            current.push_str(line);
        }
    }
    // implicit trailing separator
    batches.push(Batch::new(batches.len(), current));

    let producing = batches.iter().rposition(|batch| !batch.is_blank());

    Batches {
        batches,
        producing,
    }
}
