//! Traffic Workbook
//!
//! Captures HTTP exchanges observed by an intercepting proxy and exchanges
//! them with `.xlsx` spreadsheet workbooks, so a captured session can be
//! archived, shared, reviewed in a spreadsheet tool, and loaded back.
//!
//! # Architecture
//!
//! - **models**: the immutable [`models::Transaction`] record and its
//!   normalization
//! - **capture**: the thread-safe, bounded [`capture::CaptureBuffer`] and
//!   capture scope rules
//! - **codec**: versioned mapping between records and flat rows
//! - **workbook**: streaming `.xlsx` writer and lazy reader
//! - **transfer**: export and import passes, filters, and cancellation
//! - **config**: host settings, loaded once and kept globally
//! - **logging**: `env_logger` setup for the `log` facade
//!
//! # Host integration
//!
//! The host creates one [`TrafficWorkbook`] at activation, feeds it every
//! completed exchange through [`TrafficWorkbook::on_exchange`] (from any
//! thread), and wires its menu actions to [`TrafficWorkbook::export_to_path`],
//! [`TrafficWorkbook::import_from_path`] and [`TrafficWorkbook::clear_buffer`].
//!
//! ```no_run
//! use traffic_workbook::models::CapturedExchange;
//! use traffic_workbook::TrafficWorkbook;
//!
//! let session = TrafficWorkbook::new();
//! session
//!     .on_exchange(
//!         CapturedExchange::new("GET", "https://example.com/")
//!             .with_response(200)
//!             .with_source("Proxy"),
//!     )
//!     .unwrap();
//!
//! let summary = session.export_to_path("/tmp/capture").unwrap();
//! println!("{} rows written to {}", summary.rows_written, summary.path.display());
//! ```

use std::path::Path;
use std::sync::Arc;

pub mod capture;
pub mod codec;
pub mod config;
pub mod logging;
pub mod models;
pub mod transfer;
pub mod workbook;

use capture::{AppendOutcome, BufferStats, CaptureBuffer, CaptureError, ScopeFilter};
use config::WorkbookConfig;
use log::info;
use models::CapturedExchange;
use transfer::cancellation::EitherCheck;
use transfer::{
    CancelCheck, CancelError, ExportFilter, ExportSummary, ImportSink, ImportSummary, NeverCancel,
    OperationKind, SharedOperationTracker, TransferError, TransferOptions,
};

/// What happened to an exchange handed to [`TrafficWorkbook::on_exchange`].
#[derive(Debug, Clone)]
pub enum CaptureOutcome {
    /// Stored in the buffer.
    Captured(AppendOutcome),
    /// Skipped because its host is excluded from capture.
    OutOfScope,
}

/// Result of [`TrafficWorkbook::clear_buffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearSummary {
    /// Records removed from the buffer.
    pub cleared: usize,
}

/// Errors of the host-facing export and import actions.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// The operation could not be registered for cancellation.
    #[error(transparent)]
    Tracker(#[from] CancelError),
}

/// One capture session: the buffer, its scope rules, and the registry of
/// running exports and imports.
///
/// Cheap to share between threads behind an `Arc`; every method takes `&self`.
#[derive(Debug)]
pub struct TrafficWorkbook {
    config: WorkbookConfig,
    buffer: Arc<CaptureBuffer>,
    scope: ScopeFilter,
    tracker: SharedOperationTracker,
}

impl TrafficWorkbook {
    /// Creates a session from the global configuration.
    pub fn new() -> Self {
        Self::with_config(config::get_config())
    }

    pub fn with_config(config: WorkbookConfig) -> Self {
        info!(
            "Capture session started (capacity {}, policy {})",
            config.max_buffer_entries, config.overflow_policy
        );
        Self {
            buffer: Arc::new(CaptureBuffer::from_config(&config)),
            scope: ScopeFilter::new(config.excluded_domains.clone()),
            tracker: SharedOperationTracker::new(),
            config,
        }
    }

    pub fn config(&self) -> &WorkbookConfig {
        &self.config
    }

    /// The session's buffer, for collaborators that read it directly.
    pub fn buffer(&self) -> &Arc<CaptureBuffer> {
        &self.buffer
    }

    pub fn stats(&self) -> BufferStats {
        self.buffer.stats()
    }

    pub fn tracker(&self) -> &SharedOperationTracker {
        &self.tracker
    }

    /// Host callback for every completed exchange.
    ///
    /// # Errors
    ///
    /// `CaptureError::CapacityExceeded` when the buffer is full under the
    /// `haltCapture` policy.
    pub fn on_exchange(&self, exchange: CapturedExchange) -> Result<CaptureOutcome, CaptureError> {
        if self.scope.excludes_url(&exchange.url) {
            self.buffer.note_out_of_scope();
            return Ok(CaptureOutcome::OutOfScope);
        }
        self.buffer.append(exchange).map(CaptureOutcome::Captured)
    }

    /// Options derived from the session configuration.
    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions::from_config(&self.config)
    }

    /// Exports everything currently buffered.
    ///
    /// `.xlsx` is appended to `path` when missing. The export can be
    /// cancelled through [`TrafficWorkbook::cancel_operation`] or
    /// [`TrafficWorkbook::cancel_most_recent`].
    pub fn export_to_path(&self, path: impl AsRef<Path>) -> Result<ExportSummary, SessionError> {
        self.export_with(path, &self.transfer_options(), &NeverCancel)
    }

    /// Exports only the buffered records `filter` matches.
    pub fn export_filtered(
        &self,
        path: impl AsRef<Path>,
        filter: ExportFilter,
    ) -> Result<ExportSummary, SessionError> {
        let options = self.transfer_options().with_filter(filter);
        self.export_with(path, &options, &NeverCancel)
    }

    /// Exports with explicit options and an extra cancellation check.
    pub fn export_with(
        &self,
        path: impl AsRef<Path>,
        options: &TransferOptions,
        cancel: &dyn CancelCheck,
    ) -> Result<ExportSummary, SessionError> {
        let path = transfer::ensure_xlsx_extension(path);
        let guard = self.tracker.start(OperationKind::Export)?;
        let snapshot = self.buffer.snapshot();
        let check = EitherCheck {
            first: cancel,
            second: guard.token(),
        };
        Ok(transfer::export_snapshot(&snapshot, &path, options, &check)?)
    }

    /// Imports a document into the session buffer.
    ///
    /// Imported records get fresh sequence numbers after the ones already
    /// buffered.
    pub fn import_from_path(&self, path: impl AsRef<Path>) -> Result<ImportSummary, SessionError> {
        let mut sink: &CaptureBuffer = &self.buffer;
        self.import_into(path, &mut sink)
    }

    /// Reads a document into `sink` instead of the buffer, keeping the
    /// records' original sequence numbers.
    pub fn replay_from_path(
        &self,
        path: impl AsRef<Path>,
        sink: &mut dyn ImportSink,
    ) -> Result<ImportSummary, SessionError> {
        self.import_into(path, sink)
    }

    fn import_into(
        &self,
        path: impl AsRef<Path>,
        sink: &mut dyn ImportSink,
    ) -> Result<ImportSummary, SessionError> {
        let guard = self.tracker.start(OperationKind::Import)?;
        let summary =
            transfer::import_workbook(path, &self.transfer_options(), sink, guard.token())?;
        Ok(summary)
    }

    /// Empties the buffer. Snapshots already taken are unaffected.
    pub fn clear_buffer(&self) -> ClearSummary {
        ClearSummary {
            cleared: self.buffer.clear(),
        }
    }

    /// Requests cancellation of a running export or import.
    pub fn cancel_operation(&self, operation_id: &str) -> Result<(), CancelError> {
        self.tracker.cancel(operation_id)
    }

    /// Requests cancellation of the most recently started operation.
    ///
    /// # Returns
    ///
    /// The cancelled operation's ID.
    pub fn cancel_most_recent(&self) -> Result<String, CancelError> {
        self.tracker.cancel_most_recent()
    }

    /// Suggested file name for an export made today.
    pub fn default_export_file_name(&self) -> String {
        transfer::default_export_file_name(
            &self.config.file_name_prefix,
            chrono::Local::now().date_naive(),
        )
    }
}

impl Default for TrafficWorkbook {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DomainRule;
    use crate::models::Transaction;
    use crate::transfer::{FilterColumn, TransferStatus};
    use tempfile::TempDir;

    fn session() -> TrafficWorkbook {
        TrafficWorkbook::with_config(WorkbookConfig {
            excluded_domains: vec![DomainRule::new("tracker.test", true)],
            ..Default::default()
        })
    }

    fn exchange(url: &str) -> CapturedExchange {
        CapturedExchange::new("GET", url)
            .with_response(200)
            .with_source("Proxy")
    }

    #[test]
    fn test_on_exchange_honours_scope() {
        let session = session();
        let outcome = session.on_exchange(exchange("https://cdn.tracker.test/pixel")).unwrap();
        assert!(matches!(outcome, CaptureOutcome::OutOfScope));

        let outcome = session.on_exchange(exchange("https://example.com/")).unwrap();
        match outcome {
            CaptureOutcome::Captured(appended) => assert_eq!(appended.record.sequence(), 1),
            CaptureOutcome::OutOfScope => panic!("exchange should be captured"),
        }

        let stats = session.stats();
        assert_eq!(stats.held, 1);
        assert_eq!(stats.out_of_scope, 1);
    }

    #[test]
    fn test_export_appends_extension_and_import_restores() {
        let dir = TempDir::new().unwrap();
        let session = session();
        for n in 0..3 {
            session
                .on_exchange(exchange(&format!("https://example.com/{}", n)))
                .unwrap();
        }

        let exported = session.export_to_path(dir.path().join("capture")).unwrap();
        assert_eq!(exported.path, dir.path().join("capture.xlsx"));
        assert_eq!(exported.rows_written, 3);
        assert_eq!(session.tracker().active_count().unwrap(), 0);

        assert_eq!(session.clear_buffer(), ClearSummary { cleared: 3 });
        let imported = session.import_from_path(&exported.path).unwrap();
        assert_eq!(imported.rows_imported, 3);
        assert_eq!(session.buffer().len(), 3);
    }

    #[test]
    fn test_replay_keeps_original_sequences() {
        let dir = TempDir::new().unwrap();
        let session = session();
        for n in 0..2 {
            session
                .on_exchange(exchange(&format!("https://example.com/{}", n)))
                .unwrap();
        }
        let exported = session.export_to_path(dir.path().join("replay.xlsx")).unwrap();

        let mut replayed: Vec<Transaction> = Vec::new();
        session.replay_from_path(&exported.path, &mut replayed).unwrap();
        assert_eq!(replayed.len(), 2);
        assert_eq!(replayed[1].sequence(), 2);
        assert_eq!(session.buffer().len(), 2);
    }

    #[test]
    fn test_export_filtered() {
        let dir = TempDir::new().unwrap();
        let session = session();
        session.on_exchange(exchange("https://a.example.com/")).unwrap();
        session.on_exchange(exchange("https://b.example.org/")).unwrap();

        let filter = ExportFilter::keyword(FilterColumn::Host, "example.org").unwrap();
        let summary = session
            .export_filtered(dir.path().join("filtered.xlsx"), filter)
            .unwrap();
        assert_eq!(summary.rows_written, 1);
        assert_eq!(summary.rows_filtered, 1);
    }

    #[test]
    fn test_export_with_extra_check() {
        let dir = TempDir::new().unwrap();
        let session = session();
        for n in 0..5 {
            session
                .on_exchange(exchange(&format!("https://example.com/{}", n)))
                .unwrap();
        }

        let summary = session
            .export_with(
                dir.path().join("partial.xlsx"),
                &session.transfer_options(),
                &|rows: u64| rows >= 2,
            )
            .unwrap();
        assert_eq!(summary.status, TransferStatus::Cancelled { after_rows: 2 });
    }

    #[test]
    fn test_cancel_without_running_operation() {
        let session = session();
        assert!(matches!(
            session.cancel_most_recent(),
            Err(CancelError::NotFound(_))
        ));
        assert!(session.cancel_operation("nope").is_err());
    }

    #[test]
    fn test_import_error_carries_path() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.xlsx");
        let err = session().import_from_path(&missing).unwrap_err();
        match err {
            SessionError::Transfer(e) => assert_eq!(e.path(), &missing),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_default_export_file_name_uses_prefix() {
        let name = session().default_export_file_name();
        assert!(name.starts_with("CaptureLog_"));
        assert!(name.ends_with(".xlsx"));
        assert_eq!(name.len(), "CaptureLog_YYYYMMDD.xlsx".len());
    }
}
