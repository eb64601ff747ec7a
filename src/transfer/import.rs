//! Workbook → records import pass.

use super::cancellation::CancelCheck;
use super::summary::{ImportSummary, TransferError, TransferStatus, WarningLog};
use super::TransferOptions;
use crate::capture::CaptureBuffer;
use crate::models::Transaction;
use crate::workbook::{ReadError, WorkbookReader};
use log::{info, warn};
use std::error::Error;
use std::path::Path;
use std::time::Instant;

/// Error a sink returns to refuse a record.
pub type SinkError = Box<dyn Error + Send + Sync>;

/// Destination of imported records.
pub trait ImportSink {
    /// Takes one record. An error stops the import.
    fn accept(&mut self, record: Transaction) -> Result<(), SinkError>;
}

/// Restores records into a buffer; they are re-sequenced on the way in.
impl ImportSink for &CaptureBuffer {
    fn accept(&mut self, record: Transaction) -> Result<(), SinkError> {
        self.restore(record)?;
        Ok(())
    }
}

impl ImportSink for CaptureBuffer {
    fn accept(&mut self, record: Transaction) -> Result<(), SinkError> {
        self.restore(record)?;
        Ok(())
    }
}

/// Collects records unchanged, sequence numbers included, for a replay
/// collaborator.
impl ImportSink for Vec<Transaction> {
    fn accept(&mut self, record: Transaction) -> Result<(), SinkError> {
        self.push(record);
        Ok(())
    }
}

/// Running counts of an import pass.
struct ImportProgress {
    warnings: WarningLog,
    rows_imported: u64,
    rows_skipped: u64,
}

impl ImportProgress {
    fn into_summary(
        self,
        path: &Path,
        status: TransferStatus,
        schema_version: u32,
        started: Instant,
    ) -> ImportSummary {
        let (warnings, warnings_dropped) = self.warnings.into_parts();
        ImportSummary {
            path: path.to_path_buf(),
            status,
            schema_version,
            rows_imported: self.rows_imported,
            rows_skipped: self.rows_skipped,
            warnings,
            warnings_dropped,
            elapsed: started.elapsed(),
        }
    }
}

/// Reads every data row of the document at `path` into `sink`.
///
/// Rows that cannot be read or decoded are skipped and counted; the first
/// `options.max_warnings` reasons are kept in the summary. `cancel` is
/// consulted before each row.
///
/// # Errors
///
/// - `TransferError::Open` if the document cannot be opened or its header
///   does not match a supported schema version
/// - `TransferError::Read` if the container fails mid-read; records already
///   handed to `sink` stay there and the error's partial summary counts them
pub fn import_workbook(
    path: impl AsRef<Path>,
    options: &TransferOptions,
    sink: &mut dyn ImportSink,
    cancel: &dyn CancelCheck,
) -> Result<ImportSummary, TransferError> {
    let started = Instant::now();
    let path = path.as_ref();
    let reader = WorkbookReader::open(path).map_err(|source| TransferError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let schema_version = reader.schema_version();
    let codec = options.codec();

    let mut progress = ImportProgress {
        warnings: WarningLog::new(options.max_warnings),
        rows_imported: 0,
        rows_skipped: 0,
    };
    let mut status = TransferStatus::Completed;

    let mut rows = reader.rows();
    loop {
        if cancel.should_stop(progress.rows_imported) {
            status = TransferStatus::Cancelled {
                after_rows: progress.rows_imported,
            };
            break;
        }

        let Some(item) = rows.next() else {
            break;
        };

        match item {
            Ok(sheet_row) => match codec.from_row(&sheet_row.row, schema_version) {
                Ok(record) => {
                    if let Err(e) = sink.accept(record) {
                        warn!(
                            "Import from {} stopped after {} rows: {}",
                            path.display(),
                            progress.rows_imported,
                            e
                        );
                        status = TransferStatus::Stopped {
                            reason: e.to_string(),
                        };
                        break;
                    }
                    progress.rows_imported += 1;
                }
                Err(e) => {
                    progress.rows_skipped += 1;
                    progress.warnings.push(format!(
                        "sheet '{}' row {}: {}",
                        sheet_row.sheet, sheet_row.row_number, e
                    ));
                }
            },
            Err(ReadError::Row(fault)) => {
                progress.rows_skipped += 1;
                progress.warnings.push(fault.to_string());
            }
            Err(ReadError::Document(source)) => {
                warn!(
                    "Import from {} failed after {} rows: {}",
                    path.display(),
                    progress.rows_imported,
                    source
                );
                let failed = TransferStatus::Failed {
                    reason: source.to_string(),
                };
                let partial = progress.into_summary(path, failed, schema_version, started);
                return Err(TransferError::Read {
                    path: path.to_path_buf(),
                    partial: Box::new(partial),
                    source,
                });
            }
        }
    }

    info!(
        "Imported {} rows from {} ({} skipped, {})",
        progress.rows_imported,
        path.display(),
        progress.rows_skipped,
        status
    );
    Ok(progress.into_summary(path, status, schema_version, started))
}
