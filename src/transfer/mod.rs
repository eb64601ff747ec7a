//! Export and import orchestration.
//!
//! - **export**: snapshot → workbook, with filtering and truncation reports
//! - **import**: workbook → [`ImportSink`], skipping and reporting bad rows
//! - **cancellation**: cooperative cancellation and the operation registry
//! - **filter**: keyword and pattern row selection for exports
//! - **summary**: per-pass outcome and error types

pub mod cancellation;
pub mod export;
pub mod filter;
pub mod import;
pub mod summary;

pub use cancellation::{
    CancelCheck, CancelError, CancellationToken, NeverCancel, OperationGuard, OperationKind,
    SharedOperationTracker,
};
pub use export::export_snapshot;
pub use filter::{ExportFilter, FilterColumn};
pub use import::{import_workbook, ImportSink, SinkError};
pub use summary::{ExportSummary, ImportSummary, TransferError, TransferStatus};

use crate::codec::RowCodec;
use crate::config::WorkbookConfig;
use crate::workbook::WriterOptions;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

/// Extension given to exported documents.
pub const XLSX_EXTENSION: &str = "xlsx";

/// Settings of one export or import pass.
#[derive(Debug, Clone)]
pub struct TransferOptions {
    pub max_cell_chars: usize,
    pub redact_sensitive_headers: bool,
    pub sheet_name: String,
    pub max_rows_per_sheet: u32,
    /// Row warnings kept in a summary; the rest are only counted.
    pub max_warnings: usize,
    /// Finalize the rows written so far when an export is cancelled.
    pub keep_partial_on_cancel: bool,
    /// Export only the records this filter matches. Ignored on import.
    pub filter: Option<ExportFilter>,
}

impl TransferOptions {
    pub fn from_config(config: &WorkbookConfig) -> Self {
        Self {
            max_cell_chars: config.max_cell_chars,
            redact_sensitive_headers: config.redact_sensitive_headers,
            sheet_name: config.sheet_name.clone(),
            max_rows_per_sheet: config.max_rows_per_sheet,
            max_warnings: config.max_warnings,
            keep_partial_on_cancel: config.keep_partial_on_cancel,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: ExportFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn codec(&self) -> RowCodec {
        RowCodec::new(self.max_cell_chars).with_redaction(self.redact_sensitive_headers)
    }

    pub fn writer_options(&self) -> WriterOptions {
        WriterOptions {
            sheet_name: self.sheet_name.clone(),
            max_rows_per_sheet: self.max_rows_per_sheet,
        }
    }
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self::from_config(&WorkbookConfig::default())
    }
}

/// Suggested export file name, `<prefix>_YYYYMMDD.xlsx`.
pub fn default_export_file_name(prefix: &str, date: NaiveDate) -> String {
    format!("{}_{}.{}", prefix, date.format("%Y%m%d"), XLSX_EXTENSION)
}

/// Appends `.xlsx` unless `path` already ends with it (any case).
pub fn ensure_xlsx_extension(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let has_extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(XLSX_EXTENSION));
    if has_extension {
        return path.to_path_buf();
    }
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(XLSX_EXTENSION);
    PathBuf::from(name)
}
