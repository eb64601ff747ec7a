//! Snapshot → workbook export pass.

use super::cancellation::CancelCheck;
use super::summary::{ExportSummary, TransferError, TransferStatus, WarningLog};
use super::TransferOptions;
use crate::capture::Snapshot;
use crate::workbook::WorkbookWriter;
use log::{info, warn};
use std::path::Path;
use std::time::Instant;

/// Running counts of an export pass.
struct ExportProgress {
    warnings: WarningLog,
    rows_written: u64,
    rows_truncated: u64,
    rows_filtered: u64,
}

impl ExportProgress {
    fn into_summary(
        self,
        path: &Path,
        status: TransferStatus,
        sheets: Option<Vec<String>>,
        started: Instant,
    ) -> ExportSummary {
        let (warnings, warnings_dropped) = self.warnings.into_parts();
        ExportSummary {
            path: path.to_path_buf(),
            status,
            document_written: sheets.is_some(),
            rows_written: self.rows_written,
            rows_truncated: self.rows_truncated,
            rows_filtered: self.rows_filtered,
            sheets: sheets.unwrap_or_default(),
            warnings,
            warnings_dropped,
            elapsed: started.elapsed(),
        }
    }
}

/// Writes every record of `snapshot` that passes the export filter to `path`.
///
/// `cancel` is consulted before each row. A cancelled export is finalized
/// with the rows written so far, or discarded when
/// `options.keep_partial_on_cancel` is off.
///
/// # Errors
///
/// - `TransferError::Open` if the document cannot be created
/// - `TransferError::Write` on the first failed row write; nothing is left
///   at `path`
/// - `TransferError::Finalize` if the document cannot be completed
///
/// Both of the latter carry the partial summary of the pass.
pub fn export_snapshot(
    snapshot: &Snapshot,
    path: impl AsRef<Path>,
    options: &TransferOptions,
    cancel: &dyn CancelCheck,
) -> Result<ExportSummary, TransferError> {
    let started = Instant::now();
    let path = path.as_ref();
    let codec = options.codec();

    let mut writer =
        WorkbookWriter::create(path, options.writer_options()).map_err(|source| {
            TransferError::Open {
                path: path.to_path_buf(),
                source,
            }
        })?;
    info!(
        "Exporting {} records to {}",
        snapshot.len(),
        path.display()
    );

    let mut progress = ExportProgress {
        warnings: WarningLog::new(options.max_warnings),
        rows_written: 0,
        rows_truncated: 0,
        rows_filtered: 0,
    };
    let mut status = TransferStatus::Completed;

    for record in snapshot.iter() {
        if cancel.should_stop(progress.rows_written) {
            status = TransferStatus::Cancelled {
                after_rows: progress.rows_written,
            };
            break;
        }

        if let Some(filter) = &options.filter {
            if !filter.matches(record) {
                progress.rows_filtered += 1;
                continue;
            }
        }

        let encoded = codec.to_row(record);
        if encoded.is_truncated() {
            progress.rows_truncated += 1;
            progress.warnings.push(format!(
                "record #{} truncated to fit: {}",
                record.sequence(),
                encoded.truncation.to_label()
            ));
        }

        if let Err(source) = writer.write_row(&encoded.row) {
            let sheet = writer.current_sheet().to_string();
            writer.discard();
            warn!(
                "Export to {} failed after {} rows: {}",
                path.display(),
                progress.rows_written,
                source
            );
            let row = progress.rows_written + 1;
            let failed = TransferStatus::Failed {
                reason: source.to_string(),
            };
            return Err(TransferError::Write {
                path: path.to_path_buf(),
                sheet,
                row,
                partial: Box::new(progress.into_summary(path, failed, None, started)),
                source,
            });
        }
        progress.rows_written += 1;
    }

    let cancelled = !status.is_completed();
    let sheets = if cancelled && !options.keep_partial_on_cancel {
        writer.discard();
        warn!(
            "Export to {} cancelled after {} rows; partial document discarded",
            path.display(),
            progress.rows_written
        );
        None
    } else {
        let stats = match writer.finalize() {
            Ok(stats) => stats,
            Err(source) => {
                let failed = TransferStatus::Failed {
                    reason: source.to_string(),
                };
                return Err(TransferError::Finalize {
                    path: path.to_path_buf(),
                    partial: Box::new(progress.into_summary(path, failed, None, started)),
                    source,
                });
            }
        };
        if cancelled {
            warn!(
                "Export to {} cancelled after {} rows; partial document kept",
                path.display(),
                progress.rows_written
            );
        }
        Some(stats.sheets)
    };

    Ok(progress.into_summary(path, status, sheets, started))
}
