// Error taxonomy for sync and alert runs
//
// Failures are local to a single scheduled run: nothing here retries, and
// windows committed before a failure stay committed. The next run converges
// the remainder.

use thiserror::Error;

/// Errors raised by a tabular source implementation.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The range expression could not be parsed (bad sheet/rectangle syntax).
    #[error("invalid range expression '{expr}': {reason}")]
    BadRange { expr: String, reason: String },

    /// The named sheet does not exist in the workbook.
    #[error("no such sheet '{sheet}'")]
    NoSuchSheet { sheet: String },

    /// Transport or file-level failure while reading the source.
    #[error("failed to read sheet '{sheet}': {cause}")]
    Read { sheet: String, cause: anyhow::Error },
}

/// Persistence failure from an entity store. Fatal to the current run.
#[derive(Debug, Error)]
#[error("store operation failed: {0}")]
pub struct StoreError(#[from] pub rusqlite::Error);

/// Run-level failure for one entity kind's reconciliation.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Reading the tabular source failed; no partial retry.
    #[error("source read failed for range '{range}'")]
    Source {
        range: String,
        #[source]
        source: SourceError,
    },

    /// A source row could not be parsed into a typed record. Aborts the
    /// remaining windows of this entity kind; committed windows stand.
    #[error("unparseable row {row} in sheet '{sheet}': {reason}")]
    Parse {
        sheet: String,
        row: usize,
        reason: String,
    },

    /// A bulk read or write against the store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Attach the failing range to a source error.
    pub fn source_read(range: impl Into<String>, source: SourceError) -> Self {
        SyncError::Source {
            range: range.into(),
            source,
        }
    }

    pub fn parse(sheet: impl Into<String>, row: usize, reason: impl Into<String>) -> Self {
        SyncError::Parse {
            sheet: sheet.into(),
            row,
            reason: reason.into(),
        }
    }
}
