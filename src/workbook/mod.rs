//! Streaming access to `.xlsx` workbook documents.
//!
//! - **writer**: [`WorkbookWriter`] streams rows into a new document, one
//!   worksheet at a time, opening overflow sheets as needed
//! - **reader**: [`WorkbookReader`] validates a document's schema marker and
//!   yields its rows lazily, reporting row-level defects inline
//! - **xml**: part templates and cell helpers shared by both
//!
//! Documents are Office Open XML SpreadsheetML packages (`zip` container,
//! XML parts). Text cells are written as inline strings; shared strings are
//! understood on read so documents re-saved by spreadsheet tools still load.

pub mod reader;
pub mod writer;
pub mod xml;

pub use reader::{SheetRows, WorkbookReader};
pub use writer::{WorkbookStats, WorkbookWriter, WriterOptions};

use crate::codec::Row;
use std::fmt;
use zip::result::ZipError;

/// Document-level workbook errors.
#[derive(Debug, thiserror::Error)]
pub enum WorkbookError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP container error: {0}")]
    Zip(ZipError),

    #[error("malformed XML in {part}: {message}")]
    Xml { part: String, message: String },

    /// The writer was finalized or discarded.
    #[error("workbook writer is closed")]
    ClosedWriter,

    /// Not a workbook, or required parts are missing.
    #[error("not a readable workbook: {0}")]
    CorruptDocument(String),

    /// The header row does not describe a known column layout.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// The document was written by a newer version of this crate.
    #[error("unsupported schema version {found} (this build reads up to version {supported})")]
    UnsupportedSchema { found: u32, supported: u32 },
}

impl From<ZipError> for WorkbookError {
    fn from(err: ZipError) -> Self {
        match err {
            ZipError::Io(e) => WorkbookError::Io(e),
            other => WorkbookError::Zip(other),
        }
    }
}

impl WorkbookError {
    /// `true` for errors caused by the document's content rather than the
    /// file system.
    pub fn is_document_defect(&self) -> bool {
        matches!(
            self,
            WorkbookError::Xml { .. }
                | WorkbookError::CorruptDocument(_)
                | WorkbookError::SchemaMismatch(_)
                | WorkbookError::UnsupportedSchema { .. }
        )
    }
}

/// A row read from a document, with its position.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    pub sheet: String,
    /// One-based position of the sheet in the workbook.
    pub sheet_index: usize,
    /// One-based row number within the sheet.
    pub row_number: u32,
    pub row: Row,
}

/// A row-level defect. The row is skipped and reading continues.
#[derive(Debug, Clone, PartialEq)]
pub struct RowFault {
    pub sheet: String,
    pub sheet_index: usize,
    /// `None` when the defect affects the rest of the sheet.
    pub row_number: Option<u32>,
    pub reason: String,
}

impl fmt::Display for RowFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.row_number {
            Some(row) => write!(f, "sheet '{}' row {}: {}", self.sheet, row, self.reason),
            None => write!(f, "sheet '{}': {}", self.sheet, self.reason),
        }
    }
}

impl std::error::Error for RowFault {}

/// Item error of [`SheetRows`].
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// Recoverable; iteration continues.
    #[error("{0}")]
    Row(RowFault),

    /// Fatal; iteration ends.
    #[error(transparent)]
    Document(#[from] WorkbookError),
}
