//! Outcome and error types of export and import passes.

use crate::workbook::WorkbookError;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// How a pass ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    /// Every row was processed.
    Completed,
    /// The cancellation check fired after `after_rows` rows.
    Cancelled { after_rows: u64 },
    /// The import sink refused a record.
    Stopped { reason: String },
    /// The pass aborted with an error; the summary holds what it got done.
    Failed { reason: String },
}

impl TransferStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, TransferStatus::Completed)
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStatus::Completed => f.write_str("completed"),
            TransferStatus::Cancelled { after_rows } => {
                write!(f, "cancelled after {} rows", after_rows)
            }
            TransferStatus::Stopped { reason } => write!(f, "stopped: {}", reason),
            TransferStatus::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

/// Result of an export pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub status: TransferStatus,
    /// `false` when a cancelled export was discarded.
    pub document_written: bool,
    pub rows_written: u64,
    /// Rows with at least one field cut to fit a cell.
    pub rows_truncated: u64,
    /// Records left out by the export filter.
    pub rows_filtered: u64,
    /// Sheet names in workbook order.
    pub sheets: Vec<String>,
    /// The first `maxWarnings` row warnings.
    pub warnings: Vec<String>,
    /// Warnings beyond `maxWarnings`.
    pub warnings_dropped: u64,
    pub elapsed: Duration,
}

/// Result of an import pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportSummary {
    pub path: PathBuf,
    pub status: TransferStatus,
    pub schema_version: u32,
    pub rows_imported: u64,
    /// Rows that could not be read or decoded.
    pub rows_skipped: u64,
    pub warnings: Vec<String>,
    pub warnings_dropped: u64,
    pub elapsed: Duration,
}

/// Errors that abort a pass.
///
/// Row-level defects never show up here; they are counted in the summary.
/// Errors raised after the pass started carry a `partial` summary with the
/// counts and warnings gathered up to the failure.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("cannot open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        source: WorkbookError,
    },

    #[error("failed writing {} at sheet '{sheet}' row {row}: {source}", .path.display())]
    Write {
        path: PathBuf,
        sheet: String,
        /// One-based index of the row across the whole export.
        row: u64,
        partial: Box<ExportSummary>,
        source: WorkbookError,
    },

    #[error("failed to finalize {}: {source}", .path.display())]
    Finalize {
        path: PathBuf,
        partial: Box<ExportSummary>,
        source: WorkbookError,
    },

    #[error("failed reading {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        partial: Box<ImportSummary>,
        source: WorkbookError,
    },
}

impl TransferError {
    pub fn path(&self) -> &PathBuf {
        match self {
            TransferError::Open { path, .. }
            | TransferError::Write { path, .. }
            | TransferError::Finalize { path, .. }
            | TransferError::Read { path, .. } => path,
        }
    }

    /// Progress of the failed export, if it got past opening the document.
    pub fn partial_export(&self) -> Option<&ExportSummary> {
        match self {
            TransferError::Write { partial, .. } | TransferError::Finalize { partial, .. } => {
                Some(partial.as_ref())
            }
            _ => None,
        }
    }

    /// Progress of the failed import, if it got past opening the document.
    pub fn partial_import(&self) -> Option<&ImportSummary> {
        match self {
            TransferError::Read { partial, .. } => Some(partial.as_ref()),
            _ => None,
        }
    }
}

/// Keeps the first `limit` warnings and counts the rest.
#[derive(Debug, Clone, Default)]
pub(crate) struct WarningLog {
    limit: usize,
    messages: Vec<String>,
    dropped: u64,
}

impl WarningLog {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            messages: Vec::new(),
            dropped: 0,
        }
    }

    pub fn push(&mut self, message: String) {
        log::debug!("{}", message);
        if self.messages.len() < self.limit {
            self.messages.push(message);
        } else {
            self.dropped += 1;
        }
    }

    pub fn into_parts(self) -> (Vec<String>, u64) {
        (self.messages, self.dropped)
    }
}
